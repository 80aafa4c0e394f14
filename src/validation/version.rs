//! Version parsing and ordering.
//!
//! A version splits on `.` and `-` into segments. The leading run of purely
//! numeric segments is the numeric prefix; everything after it is the suffix.
//!
//! Ordering compares numeric prefixes left to right, a missing segment sorting
//! below a present one (`3.25 < 3.25.1`). Equal prefixes fall back to the
//! suffix, where a present suffix sorts above an absent one
//! (`3.25 < 3.25-rc1`), numeric segments sort below text segments, numbers
//! compare by value and text compares lexically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Number(u64),
    Text(String),
}

impl Segment {
    fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(n) if s.bytes().all(|b| b.is_ascii_digit()) => Self::Number(n),
            _ => Self::Text(s.to_string()),
        }
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed, comparable version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    numeric: Vec<u64>,
    suffix: Vec<Segment>,
}

impl Version {
    /// Parse `raw`.
    ///
    /// # Errors
    /// Returns `ValidationError::Unparseable` when the first segment is not a number.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let mut segments = raw.split(['.', '-']).map(Segment::parse).peekable();

        let mut numeric = Vec::new();
        while let Some(Segment::Number(n)) = segments.peek() {
            numeric.push(*n);
            segments.next();
        }
        if numeric.is_empty() {
            return Err(ValidationError::Unparseable(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            numeric,
            suffix: segments.collect(),
        })
    }

    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this version is at least `minimum`.
    pub fn satisfies(&self, minimum: &Version) -> bool {
        self >= minimum
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Slice ordering already ranks a strict prefix below the longer slice.
        self.numeric
            .cmp(&other.numeric)
            .then_with(|| self.suffix.cmp(&other.suffix))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
