//! Shared helpers for lenses that work through the `regex` crate, whose
//! match positions are byte offsets while the splice engine addresses
//! characters.

use regex::Regex;

use crate::error::{Error, Result};

/// Converts a byte offset into `s` to a character offset.
pub fn char_offset(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

pub fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::syntax(format!("bad regexp {pattern:?}: {e}")))
}
