//! Block selectors and field-pair addressing.
//!
//! A [`BlockSelector`] is compiled once and reused across every retry of an
//! update, so an invalid pattern fails at startup rather than mid-loop.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

/// Errors from building selectors or field indices.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid block pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("block selector cannot be empty")]
    Empty,
    #[error("invalid field index '{0}' (expected a non-negative pair index, -1 or \"all\")")]
    InvalidFieldIndex(String),
}

/// Selects blocks by exact id or by regular expression over the id.
#[derive(Clone, Debug)]
pub enum BlockSelector {
    /// Matches the block whose id equals the string.
    Exact(String),
    /// Matches every block whose id the pattern matches (unanchored).
    Pattern(Regex),
}

impl BlockSelector {
    pub fn exact(block_id: impl Into<String>) -> Result<Self, SelectorError> {
        let block_id = block_id.into();
        if block_id.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self::Exact(block_id))
    }

    pub fn pattern(pattern: &str) -> Result<Self, SelectorError> {
        if pattern.is_empty() {
            return Err(SelectorError::Empty);
        }
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| SelectorError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, block_id: &str) -> bool {
        match self {
            Self::Exact(id) => id == block_id,
            Self::Pattern(re) => re.is_match(block_id),
        }
    }
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(id) => write!(f, "'{}'", id),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Which value slots of a block an update addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FieldIndex {
    /// Every value slot (1, 3, 5, ...).
    #[default]
    All,
    /// The value slot of one label/value pair: slot `2 * pair + 1`.
    Pair(usize),
}

impl FieldIndex {
    /// The sentinel accepted on the command line for [`FieldIndex::All`].
    pub const ALL_SENTINEL: i64 = -1;

    /// Field slot holding the value of `pair`, or `None` if it overflows.
    pub fn value_slot(pair: usize) -> Option<usize> {
        pair.checked_mul(2).and_then(|s| s.checked_add(1))
    }
}

impl TryFrom<i64> for FieldIndex {
    type Error = SelectorError;

    fn try_from(index: i64) -> Result<Self, Self::Error> {
        match index {
            Self::ALL_SENTINEL => Ok(Self::All),
            i if i >= 0 => usize::try_from(i)
                .map(Self::Pair)
                .map_err(|_| SelectorError::InvalidFieldIndex(i.to_string())),
            i => Err(SelectorError::InvalidFieldIndex(i.to_string())),
        }
    }
}

impl FromStr for FieldIndex {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let index: i64 = s
            .parse()
            .map_err(|_| SelectorError::InvalidFieldIndex(s.to_string()))?;
        Self::try_from(index)
    }
}

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Pair(i) => write!(f, "{}", i),
        }
    }
}
