use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a procfs or cgroupfs file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FileOpenError {
    /// Returns `true` if the file (or one of its parents) does not exist.
    ///
    /// For cgroup and `/proc/<pid>` paths this means the workload is gone.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] carrying the path if the file cannot be opened.
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Like [`open_file_reader`], but a missing file is `Ok(None)`.
///
/// Used for optional stat files, e.g. `memory.max` does not exist on the root cgroup.
pub fn open_optional_file_reader(
    path: impl AsRef<Path>,
) -> Result<Option<BufReader<File>>, FileOpenError> {
    match open_file_reader(path) {
        Ok(reader) => Ok(Some(reader)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
