//! Structured errors for parsing cgroup stat files.
//!
//! - [`StatParseError::InvalidKeyValue`]: a known key carried a value that is not a `u64`.
//! - [`StatParseError::InvalidValue`]: a single-value file (e.g. `memory.current`) did not parse.
//! - [`StatParseError::DuplicateField`]: a key appeared twice where that is not allowed.
//! - [`StatParseError::Io`]: the underlying read failed.

use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("duplicate field '{field}' at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value '{value}': {source}")]
    InvalidValue {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("error during I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatParseError>;
