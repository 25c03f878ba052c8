use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// The maximum allowed length for a [`WorkloadID`].
const WORKLOAD_ID_MAX_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid workload id `{0}`")]
    InvalidWorkloadID(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A stable, opaque identifier of a monitored workload.
///
/// Two `WorkloadID`s built from the same string always compare equal, so they
/// resolve to the same publisher no matter where the caller got them from.
///
/// # Examples
///
/// ```
/// # use creo_stats::workload::WorkloadID;
/// let a = WorkloadID::new("web-1").unwrap();
/// let b = WorkloadID::new(String::from("web-1")).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_ref(), "web-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadID(Arc<str>);

impl WorkloadID {
    /// Creates a new `WorkloadID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWorkloadID`] if the id is empty or longer than
    /// [`WORKLOAD_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > WORKLOAD_ID_MAX_LEN {
            return Err(Error::InvalidWorkloadID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }
}

impl AsRef<str> for WorkloadID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for WorkloadID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for WorkloadID {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// Identifier of the network sandbox a workload is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxID(Arc<str>);

impl SandboxID {
    pub fn new(src: impl AsRef<str>) -> Self {
        Self(src.as_ref().into())
    }
}

impl AsRef<str> for SandboxID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
