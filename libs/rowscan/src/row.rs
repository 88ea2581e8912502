use std::ops::Index;
use std::sync::Arc;

use serde::Deserialize;

/// One row: uninterpreted column buffers, positionally aligned with the
/// [`ColumnSet`] of the call.
///
/// An empty buffer stands for both SQL NULL and an empty value.
pub type RawRow = Vec<Vec<u8>>;

/// Ordered column names of one decode call.
///
/// Fixed for the life of the call and cheap to clone into worker threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(Arc<[String]>);

impl ColumnSet {
    pub fn new(names: Vec<String>) -> Self {
        Self(names.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|c| c == name)
    }
}

impl Index<usize> for ColumnSet {
    type Output = String;

    fn index(&self, index: usize) -> &String {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// How many rows a decode call may take from the cursor.
///
/// Built from the integer convention of database APIs with `Limit::from(n)`:
/// `0` takes nothing, a negative value is unbounded, `n > 0` takes at most `n`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum Limit {
    #[default]
    Unbounded,
    Rows(usize),
}

impl Limit {
    pub fn is_zero(self) -> bool {
        self == Limit::Rows(0)
    }

    /// Whether another row may be taken after `taken` rows.
    pub fn allows(self, taken: usize) -> bool {
        match self {
            Limit::Unbounded => true,
            Limit::Rows(n) => taken < n,
        }
    }

    /// The tighter of two limits.
    pub fn min(self, other: Limit) -> Limit {
        match (self, other) {
            (Limit::Unbounded, other) => other,
            (this, Limit::Unbounded) => this,
            (Limit::Rows(a), Limit::Rows(b)) => Limit::Rows(a.min(b)),
        }
    }

    /// Upper bound on rows, if any.
    pub fn rows(self) -> Option<usize> {
        match self {
            Limit::Unbounded => None,
            Limit::Rows(n) => Some(n),
        }
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        if n < 0 {
            Limit::Unbounded
        } else {
            Limit::Rows(usize::try_from(n).unwrap_or(usize::MAX))
        }
    }
}

impl From<usize> for Limit {
    fn from(n: usize) -> Self {
        Limit::Rows(n)
    }
}
