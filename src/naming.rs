//! Collision-free, filesystem-safe names for feature images.
//!
//! A name is `<seq>_<cleaned label>` where `<seq>` is the 1-based sequence number, zero-padded
//! to a run-wide width. The prefix alone makes names unique within a run; the label part only
//! has to be path-safe.

use std::fmt;

/// Substituted when a label cleans down to nothing.
pub const UNNAMED: &str = "unnamed";

/// Minimum digits in the sequence prefix.
pub const MIN_PREFIX_WIDTH: usize = 3;

const MAX_LABEL_BYTES: usize = 120;

const ILLEGAL: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', ',', '\''];

/// A sanitized, run-unique file stem (no extension).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SanitizedName(String);

impl SanitizedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name with the given extension, e.g. `001_Kent.png`.
    pub fn file_name(&self, ext: &str) -> String {
        format!("{}.{ext}", self.0)
    }
}

impl fmt::Display for SanitizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sanitizer with a fixed prefix width for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameSanitizer {
    width: usize,
}

impl NameSanitizer {
    /// Width wide enough for `record_count` sequence numbers, never below three digits.
    pub fn for_count(record_count: usize) -> Self {
        Self {
            width: digits(record_count).max(MIN_PREFIX_WIDTH),
        }
    }

    pub fn width(self) -> usize {
        self.width
    }

    pub fn sanitize(self, label: &str, sequence_index: usize) -> SanitizedName {
        let seq = sequence_index.saturating_add(1);
        SanitizedName(format!(
            "{seq:0width$}_{}",
            clean_label(label),
            width = self.width
        ))
    }

    /// Name under the all-zero prefix, which no record ever gets.
    pub fn reserved(self, name: &str) -> SanitizedName {
        SanitizedName(format!("{}_{}", "0".repeat(self.width), clean_label(name)))
    }
}

/// Sanitize one label at its position, with the narrowest prefix that fits the index.
///
/// Runs should prefer [`NameSanitizer::for_count`] so every name in a run shares one width.
pub fn sanitize(label: &str, sequence_index: usize) -> SanitizedName {
    NameSanitizer::for_count(sequence_index.saturating_add(1)).sanitize(label, sequence_index)
}

/// Path-safe form of a label, without the sequence prefix.
pub fn clean_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.trim().chars() {
        let piece_len = if c == '&' { 3 } else { c.len_utf8() };
        if out.len() + piece_len > MAX_LABEL_BYTES {
            break;
        }
        match c {
            '&' => out.push_str("and"),
            c if ILLEGAL.contains(&c) || c.is_whitespace() || c.is_control() => out.push('_'),
            c => out.push(c),
        }
    }
    if out.is_empty() {
        out.push_str(UNNAMED);
    }
    out
}

fn digits(mut n: usize) -> usize {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}
