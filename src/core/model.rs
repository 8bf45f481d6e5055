//! Trained regression models
//!
//! Both variants sit behind one [`Model`] value that remembers the feature
//! schema and label it was trained on; callers never pick a code path by
//! variant.

use super::ensemble::TreeEnsemble;
use super::linear::RobustLinearModel;
use crate::config::ModelConfig;
use crate::dataset::{Dataset, FeatureSchema};
use crate::types::{CarbonError, CarbonResult};
use serde::{Deserialize, Serialize};

/// Regression over a schema-conformant feature vector
pub trait Regressor {
    fn predict_row(&self, features: &[f64]) -> f64;
}

impl Regressor for TreeEnsemble {
    fn predict_row(&self, features: &[f64]) -> f64 {
        self.predict(features)
    }
}

impl Regressor for RobustLinearModel {
    fn predict_row(&self, features: &[f64]) -> f64 {
        self.predict(features)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ModelKind {
    Ensemble(TreeEnsemble),
    Linear(RobustLinearModel),
}

/// Immutable trained model bound to its training schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    schema: FeatureSchema,
    label_name: String,
    training_size: usize,
    kind: ModelKind,
}

impl Model {
    /// Fit the configured variant on a training dataset
    pub fn train(train: &Dataset, config: &ModelConfig) -> CarbonResult<Self> {
        if train.schema().is_empty() {
            return Err(CarbonError::InvalidConfig("feature schema is empty".to_string()));
        }
        let features: Vec<Vec<f64>> = train.iter().map(|s| s.features.clone()).collect();
        let targets = train.labels();
        log::info!(
            "Training {} model on {} sample(s) with schema {}",
            variant_name(config),
            train.len(),
            train.schema()
        );

        let kind = match config {
            ModelConfig::Ensemble(params) => {
                ModelKind::Ensemble(TreeEnsemble::fit(&features, &targets, params)?)
            }
            ModelConfig::Linear(params) => {
                ModelKind::Linear(RobustLinearModel::fit(&features, &targets, params)?)
            }
        };
        Ok(Self {
            schema: train.schema().clone(),
            label_name: train.label_name().to_string(),
            training_size: train.len(),
            kind,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    pub fn training_size(&self) -> usize {
        self.training_size
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    /// Feature vector must follow [`Model::schema`]
    pub fn predict(&self, features: &[f64]) -> CarbonResult<f64> {
        if features.len() != self.schema.len() {
            return Err(CarbonError::SchemaMismatch {
                expected: self.schema.names().join(", "),
                found: format!("{} values", features.len()),
            });
        }
        Ok(self.predict_row(features))
    }
}

impl Regressor for Model {
    fn predict_row(&self, features: &[f64]) -> f64 {
        match &self.kind {
            ModelKind::Ensemble(m) => m.predict_row(features),
            ModelKind::Linear(m) => m.predict_row(features),
        }
    }
}

fn variant_name(config: &ModelConfig) -> &'static str {
    match config {
        ModelConfig::Ensemble(_) => "ensemble",
        ModelConfig::Linear(_) => "robust linear",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnsembleParams, LinearParams};
    use crate::dataset::Sample;
    use crate::types::GeoPoint;

    fn dataset(n: usize) -> Dataset {
        let samples = (0..n)
            .map(|i| Sample {
                row: i,
                col: 0,
                location: GeoPoint::new(0.0, i as f64),
                features: vec![i as f64],
                label: 2.0 * i as f64 + 1.0,
            })
            .collect();
        Dataset::new(FeatureSchema::new(["x"]), "carbon", samples).unwrap()
    }

    #[test]
    fn model_remembers_schema_and_label() {
        let model = Model::train(&dataset(10), &ModelConfig::Linear(LinearParams::default())).unwrap();
        assert_eq!(model.schema().names(), &["x".to_string()]);
        assert_eq!(model.label_name(), "carbon");
        assert_eq!(model.training_size(), 10);
        assert!((model.predict(&[4.0]).unwrap() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_vector_length_is_schema_mismatch() {
        let config = ModelConfig::Ensemble(EnsembleParams {
            tree_count: 3,
            ..EnsembleParams::default()
        });
        let model = Model::train(&dataset(10), &config).unwrap();
        assert!(matches!(
            model.predict(&[1.0, 2.0]),
            Err(CarbonError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn empty_training_set_is_insufficient() {
        let empty = Dataset::empty(FeatureSchema::new(["x"]), "carbon");
        for config in [
            ModelConfig::default(),
            ModelConfig::Linear(LinearParams::default()),
        ] {
            assert!(matches!(
                Model::train(&empty, &config),
                Err(CarbonError::InsufficientData { available: 0, .. })
            ));
        }
    }

    #[test]
    fn serialises_with_variant_tag() {
        let model = Model::train(&dataset(6), &ModelConfig::Linear(LinearParams::default())).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"variant\":\"linear\""));
        let back: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schema(), model.schema());
        assert!((back.predict(&[3.0]).unwrap() - model.predict(&[3.0]).unwrap()).abs() < 1e-9);
    }
}
