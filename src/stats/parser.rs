//! Generic parsing traits for cgroup stat files.
//!
//! - [`KeyValueStat`]: multi-line `key value` files such as `cpu.stat`.
//! - [`SingleLineStat`]: files holding one value such as `memory.current`.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use creo_stats::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct MyStat {
//!     foo: u64,
//! }
//!
//! fn set_foo(stat: &mut MyStat, foo: u64) {
//!     stat.foo = foo;
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut MyStat, u64)>> =
//!     LazyLock::new(|| HashMap::from([("foo", set_foo as fn(&mut MyStat, u64))]));
//!
//! impl KeyValueStat for MyStat {
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let stat = MyStat::from_reader(&mut "foo 7\nbar 9\n".as_bytes()).unwrap();
//! assert_eq!(stat.foo, 7);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::error::{Result, StatParseError};

/// A trait for parsing `key value` formatted stat files.
///
/// Implementors name the keys they understand and how to store each value.
/// Unknown keys are ignored, so newer kernels adding fields do not break parsing.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// If `false`, a key seen twice is a [`StatParseError::DuplicateField`].
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Returns the known field names and the setter for each of them.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses a key-value formatted buffer into `Self`.
    ///
    /// # Errors
    ///
    /// Returns a [`StatParseError`] if reading fails, a known key carries a
    /// non-numeric value, or a duplicate key is found and not allowed.
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let mut seen_keys = HashSet::with_capacity(handlers.len());

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                if let Some((k, handler)) = handlers.get_key_value(key) {
                    let parsed =
                        val.parse::<u64>()
                            .map_err(|source| StatParseError::InvalidKeyValue {
                                key: key.to_string(),
                                value: val.to_string(),
                                line: lineno,
                                source,
                            })?;
                    if !Self::ALLOW_DUPLICATE_KEYS && !seen_keys.insert(*k) {
                        return Err(StatParseError::DuplicateField {
                            field: key.to_string(),
                            line: lineno,
                        });
                    }
                    handler(&mut stat, parsed);
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}

/// A trait for parsing single-line, single-value stat files such as
/// `memory.current` or `memory.max`.
pub trait SingleLineStat: Sized {
    /// Parses `Self` from the trimmed first line of the file.
    fn from_value(value: &str) -> Result<Self>;

    /// Reads the first line of `buf` and parses it with [`SingleLineStat::from_value`].
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        Self::from_value(line.trim())
    }
}
