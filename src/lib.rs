//! carbonmap: Per-Pixel Carbon Stock Estimation
//!
//! This library builds a fixed-schema feature stack from optical composites,
//! vegetation indices, texture and terrain, samples it against a reference
//! biomass raster, trains a bagged tree ensemble or a robust linear model and
//! maps the estimate over every valid pixel of the region.

pub mod types;
pub mod geometry;
pub mod parallel;
pub mod raster;
pub mod dataset;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CarbonError, CarbonResult, DateRange, GeoPoint, GeoTransform, Grid, PixelValue,
};
pub use geometry::{Polygon, Region};
pub use raster::{Band, Raster};
pub use dataset::{Dataset, FeatureSchema, Sample, Split};
pub use config::{ModelConfig, PipelineConfig};
pub use crate::core::{Model, ValidationResult};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome, Stage};
