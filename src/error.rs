/// Turns a `Result` into an `Option`, logging the error instead of returning it.
///
/// Used where a failure only degrades a sample, e.g. missing network counters.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error at `warn` level together with `context`.
    fn ok_log(self, context: &dyn std::fmt::Display) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self, context: &dyn std::fmt::Display) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
