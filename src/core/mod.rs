//! Core estimation stages

pub mod region;
pub mod indices;
pub mod texture;
pub mod terrain;
pub mod stats;
pub mod composite;
pub mod cover_mask;
pub mod sampler;
pub mod split;
pub mod tree;
pub mod ensemble;
pub mod linear;
pub mod model;
pub mod predict;
pub mod validate;

// Re-export main types
pub use region::RegionResolver;
pub use composite::FeatureCompositor;
pub use cover_mask::{CoverMaskBuilder, COVER_MASK_BAND};
pub use sampler::Sampler;
pub use split::DatasetSplitter;
pub use tree::{RegressionTree, TreeParams};
pub use ensemble::TreeEnsemble;
pub use linear::RobustLinearModel;
pub use model::{Model, ModelKind, Regressor};
pub use predict::{Predictor, PREDICTION_BAND};
pub use validate::{compare_rasters, validate_model, validate_raster, ValidationResult};
