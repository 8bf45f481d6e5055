//! Feature schemas, samples and datasets

use crate::types::{CarbonError, CarbonResult, GeoPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered, deduplicated band names a model consumes.
///
/// Training and inference must use identical schemas: same names, same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Later duplicates are dropped, first occurrence keeps its position.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|n: &String| seen.insert(n.clone()))
            .collect();
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Error unless `other` has the same names in the same order
    pub fn ensure_matches(&self, other: &FeatureSchema) -> CarbonResult<()> {
        if self == other {
            Ok(())
        } else {
            Err(CarbonError::SchemaMismatch {
                expected: self.names.join(", "),
                found: other.names.join(", "),
            })
        }
    }
}

impl std::fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

/// One sampled pixel: location, feature vector and reference label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub row: usize,
    pub col: usize,
    /// Map coordinates of the pixel centre
    pub location: GeoPoint,
    pub features: Vec<f64>,
    pub label: f64,
}

/// Samples drawn against one feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    schema: FeatureSchema,
    label_name: String,
    samples: Vec<Sample>,
}

impl Dataset {
    /// Rejects feature vectors of the wrong length and repeated pixel locations.
    pub fn new(
        schema: FeatureSchema,
        label_name: impl Into<String>,
        samples: Vec<Sample>,
    ) -> CarbonResult<Self> {
        let mut seen = HashSet::with_capacity(samples.len());
        for s in &samples {
            if s.features.len() != schema.len() {
                return Err(CarbonError::SchemaMismatch {
                    expected: schema.names().join(", "),
                    found: format!("{} values", s.features.len()),
                });
            }
            if !seen.insert((s.row, s.col)) {
                return Err(CarbonError::Processing(format!(
                    "duplicate sample location ({}, {})",
                    s.row, s.col
                )));
            }
        }
        Ok(Self {
            schema,
            label_name: label_name.into(),
            samples,
        })
    }

    pub fn empty(schema: FeatureSchema, label_name: impl Into<String>) -> Self {
        Self {
            schema,
            label_name: label_name.into(),
            samples: Vec::new(),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn labels(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Subset sharing schema and label name; samples must come from this dataset
    pub(crate) fn subset(&self, samples: Vec<Sample>) -> Dataset {
        Dataset {
            schema: self.schema.clone(),
            label_name: self.label_name.clone(),
            samples,
        }
    }
}

/// Disjoint train/test partition of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    train: Dataset,
    test: Dataset,
}

impl Split {
    pub(crate) fn new(train: Dataset, test: Dataset) -> Self {
        Self { train, test }
    }

    pub fn train(&self) -> &Dataset {
        &self.train
    }

    pub fn test(&self) -> &Dataset {
        &self.test
    }

    pub fn into_parts(self) -> (Dataset, Dataset) {
        (self.train, self.test)
    }
}
