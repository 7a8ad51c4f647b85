//! Code grammar and domain vocabulary
//!
//! A ULD code is exactly ten characters shaped `LLLDDDDDLL`: a three-letter
//! type prefix, a five-digit serial and a two-letter owner suffix. Prefix and
//! suffix are drawn from closed vocabularies loaded once at startup.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Total length of a code
pub const CODE_LEN: usize = 10;
/// Length of the type prefix
pub const PREFIX_LEN: usize = 3;
/// Length of the serial number
pub const SERIAL_LEN: usize = 5;
/// Length of the owner suffix
pub const SUFFIX_LEN: usize = 2;

/// Whether `bytes` has the exact `LLLDDDDDLL` shape (uppercase letters, ASCII digits)
pub fn has_code_shape(bytes: &[u8]) -> bool {
    bytes.len() == CODE_LEN
        && bytes.iter().enumerate().all(|(i, b)| {
            if slot_is_digit(i) {
                b.is_ascii_digit()
            } else {
                b.is_ascii_uppercase()
            }
        })
}

/// Whether position `i` of a code holds a digit
pub(crate) fn slot_is_digit(i: usize) -> bool {
    (PREFIX_LEN..PREFIX_LEN + SERIAL_LEN).contains(&i)
}

/// A validated ULD code.
///
/// Only [`GrammarValidator::validate`] constructs this type, so holding a
/// `Code` means the shape and both vocabulary checks passed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        &self.0[..PREFIX_LEN]
    }

    pub fn serial(&self) -> &str {
        &self.0[PREFIX_LEN..PREFIX_LEN + SERIAL_LEN]
    }

    pub fn suffix(&self) -> &str {
        &self.0[CODE_LEN - SUFFIX_LEN..]
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Closed sets of valid prefixes and suffixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    prefixes: BTreeSet<String>,
    suffixes: BTreeSet<String>,
}

impl Vocabulary {
    pub fn new<P, S>(prefixes: P, suffixes: S) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            prefixes: prefixes.into_iter().map(|p| p.as_ref().to_ascii_uppercase()).collect(),
            suffixes: suffixes.into_iter().map(|s| s.as_ref().to_ascii_uppercase()).collect(),
        }
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefixes.contains(prefix)
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.suffixes.contains(suffix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    pub fn suffixes(&self) -> impl Iterator<Item = &str> {
        self.suffixes.iter().map(String::as_str)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_PREFIXES,
            crate::config::DEFAULT_SUFFIXES,
        )
    }
}

/// Why a string was not accepted as a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Wrong length or character classes
    Shape,
    /// Shape is fine but the prefix is not in the vocabulary
    UnknownPrefix,
    /// Shape and prefix are fine but the suffix is not in the vocabulary
    UnknownSuffix,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Shape => f.write_str("not shaped LLLDDDDDLL"),
            Rejection::UnknownPrefix => f.write_str("unknown prefix"),
            Rejection::UnknownSuffix => f.write_str("unknown suffix"),
        }
    }
}

/// Accepts or rejects strings against the code shape and vocabularies
#[derive(Debug, Clone, Default)]
pub struct GrammarValidator {
    vocabulary: Vocabulary,
}

impl GrammarValidator {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// Check shape, then prefix, then suffix.
    pub fn check(&self, candidate: &str) -> Result<(), Rejection> {
        if !has_code_shape(candidate.as_bytes()) {
            return Err(Rejection::Shape);
        }
        // Shape guarantees ASCII, so byte slicing is on char boundaries.
        if !self.vocabulary.has_prefix(&candidate[..PREFIX_LEN]) {
            return Err(Rejection::UnknownPrefix);
        }
        if !self.vocabulary.has_suffix(&candidate[CODE_LEN - SUFFIX_LEN..]) {
            return Err(Rejection::UnknownSuffix);
        }
        Ok(())
    }

    pub fn is_valid(&self, candidate: &str) -> bool {
        self.check(candidate).is_ok()
    }

    /// Promote a string to a [`Code`] if it passes every check
    pub fn validate(&self, candidate: &str) -> Option<Code> {
        self.is_valid(candidate).then(|| Code(candidate.to_string()))
    }

    /// Closest vocabulary prefix by Levenshtein distance, for diagnostics
    pub fn nearest_prefix(&self, prefix: &str) -> Option<(&str, usize)> {
        nearest(self.vocabulary.prefixes(), prefix)
    }

    /// Closest vocabulary suffix by Levenshtein distance, for diagnostics
    pub fn nearest_suffix(&self, suffix: &str) -> Option<(&str, usize)> {
        nearest(self.vocabulary.suffixes(), suffix)
    }
}

fn nearest<'a>(entries: impl Iterator<Item = &'a str>, target: &str) -> Option<(&'a str, usize)> {
    entries
        .map(|entry| (entry, strsim::levenshtein(entry, target)))
        .min_by_key(|(_, distance)| *distance)
}
