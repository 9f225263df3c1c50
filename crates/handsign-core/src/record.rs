//! Landmark feature vectors and the labeled table assembled from them.
//!
//! A [`FeatureVector`] always holds exactly [`FEATURE_LEN`] values: 21 hand
//! landmarks, each contributing `x`, `y` (normalized to the image bounds) and
//! `z` (relative depth, unbounded). Samples where no hand was detected never
//! become records; they are dropped before reaching a [`FeatureTable`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::CoreError;

/// Number of landmarks on a detected hand.
pub const NUM_LANDMARKS: usize = 21;
/// Coordinates per landmark (`x`, `y`, `z`).
pub const COORDS_PER_LANDMARK: usize = 3;
/// Width of a flattened feature vector.
pub const FEATURE_LEN: usize = NUM_LANDMARKS * COORDS_PER_LANDMARK;

/// An image file in the input corpus, labeled by the directory it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    pub path: PathBuf,
    pub label: String,
}

/// Flattened landmark coordinates of one detected hand.
///
/// Layout is `[x_0, y_0, z_0, x_1, y_1, z_1, …, x_20, y_20, z_20]`, matching the
/// column order of the persisted table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn new(values: [f32; FEATURE_LEN]) -> Self {
        Self(values)
    }

    /// Build a vector from per-landmark `[x, y, z]` triples.
    pub fn from_landmarks(landmarks: &[[f32; COORDS_PER_LANDMARK]; NUM_LANDMARKS]) -> Self {
        let mut values = [0.0f32; FEATURE_LEN];
        for (chunk, lm) in values
            .chunks_exact_mut(COORDS_PER_LANDMARK)
            .zip(landmarks)
        {
            chunk.copy_from_slice(lm);
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// The `[x, y, z]` triple of landmark `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= NUM_LANDMARKS`.
    pub fn landmark(&self, index: usize) -> [f32; COORDS_PER_LANDMARK] {
        let offset = index * COORDS_PER_LANDMARK;
        [self.0[offset], self.0[offset + 1], self.0[offset + 2]]
    }

    pub fn landmarks(&self) -> impl Iterator<Item = [f32; COORDS_PER_LANDMARK]> + '_ {
        (0..NUM_LANDMARKS).map(|i| self.landmark(i))
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

impl TryFrom<&[f32]> for FeatureVector {
    type Error = CoreError;

    fn try_from(values: &[f32]) -> Result<Self, Self::Error> {
        let array: [f32; FEATURE_LEN] =
            values.try_into().map_err(|_| CoreError::WrongWidth {
                expected: FEATURE_LEN,
                actual: values.len(),
            })?;
        Ok(Self(array))
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = CoreError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::try_from(values.as_slice())
    }
}

/// A present feature vector paired with its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    features: FeatureVector,
    label: String,
}

impl LabeledRecord {
    pub fn new(features: FeatureVector, label: impl Into<String>) -> Self {
        Self {
            features,
            label: label.into(),
        }
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Ordered rows of labeled landmark vectors.
///
/// Row order is the order in which records were pushed; the aggregator pushes
/// them in class-then-file enumeration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    records: Vec<LabeledRecord>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: LabeledRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LabeledRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledRecord> {
        self.records.iter()
    }

    /// The label column, in row order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.label())
    }

    /// Row count per label, keyed in lexicographic label order.
    pub fn class_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for label in self.labels() {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<LabeledRecord> for FeatureTable {
    fn from_iter<I: IntoIterator<Item = LabeledRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl Extend<LabeledRecord> for FeatureTable {
    fn extend<I: IntoIterator<Item = LabeledRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}
