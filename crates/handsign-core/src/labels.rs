//! Deterministic label encoding.
//!
//! Codes are assigned by sorting the distinct label strings lexicographically,
//! so the same set of labels always yields the same encoding regardless of row
//! order, table size, or which directory was walked first.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::record::FeatureTable;

/// Bijection between class labels and dense codes `0..len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelEncoding {
    classes: Vec<String>,
}

impl LabelEncoding {
    /// Build an encoding from the distinct values of `labels`.
    pub fn fit<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    /// Build an encoding from the label column of `table`.
    pub fn from_table(table: &FeatureTable) -> Self {
        Self::fit(table.labels())
    }

    /// Code of `label`, if it was seen when fitting.
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    /// Label for `code`, if it is in range.
    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    /// Encode every row of `table`, in row order.
    pub fn encode_table(&self, table: &FeatureTable) -> Result<Vec<usize>, CoreError> {
        table
            .labels()
            .map(|l| {
                self.encode(l)
                    .ok_or_else(|| CoreError::UnknownLabel(l.to_string()))
            })
            .collect()
    }

    /// Class labels in code order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn codes(&self) -> Range<usize> {
        0..self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TryFrom<Vec<String>> for LabelEncoding {
    type Error = CoreError;

    /// Accepts a class list only if it is already strictly sorted, which is
    /// the shape [`LabelEncoding::fit`] produces.
    fn try_from(classes: Vec<String>) -> Result<Self, Self::Error> {
        if let Some(pair) = classes.windows(2).find(|w| w[0] >= w[1]) {
            return Err(CoreError::UnsortedClasses(pair[1].clone()));
        }
        Ok(Self { classes })
    }
}

impl From<LabelEncoding> for Vec<String> {
    fn from(encoding: LabelEncoding) -> Self {
        encoding.classes
    }
}
