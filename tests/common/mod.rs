//! Synthetic 4x4 scenario shared by the integration tests
#![allow(dead_code)]

use carbonmap::config::{
    EnsembleParams, ExportConfig, ExportFormat, FeatureOptions, ModelConfig, PipelineConfig,
    SamplingConfig, SplitConfig,
};
use carbonmap::core::DatasetSplitter;
use carbonmap::dataset::{Dataset, FeatureSchema, Sample};
use carbonmap::io::{MemoryCatalog, Scene};
use carbonmap::{Band, GeoPoint, GeoTransform, Grid, Polygon, Raster, Region};
use chrono::NaiveDate;
use ndarray::Array2;

pub const LABEL: &str = "carbon_tonnes_per_ha";
pub const SIZE: usize = 4;

/// 4x4 one-degree pixels, top-left at (0, 4)
pub fn grid() -> Grid {
    Grid::new(SIZE, SIZE, GeoTransform::north_up(0.0, SIZE as f64, 1.0), "EPSG:4326")
}

pub fn region() -> Region {
    Region::new("synthetic", Polygon::rectangle(-1.0, -1.0, 5.0, 5.0))
}

pub fn acquired() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 6, 1).unwrap()
}

/// Feature value 1..16 in row-major order
pub fn feature_value(row: usize, col: usize) -> f32 {
    (row * SIZE + col + 1) as f32
}

pub fn band(name: &str, f: impl Fn(usize, usize) -> f32) -> Band {
    Band::from_data(name, Array2::from_shape_fn((SIZE, SIZE), |(r, c)| f(r, c)))
}

pub fn scene(id: &str, bands: Vec<Band>) -> Scene {
    Scene {
        id: id.to_string(),
        acquired: acquired(),
        cloud_fraction: 5.0,
        raster: Raster::new(grid(), bands).unwrap(),
    }
}

/// Single-band feature scene "F" = 1..16
pub fn feature_scene() -> Scene {
    scene("s2-synthetic", vec![band("F", feature_value)])
}

/// Reference raster with label = 2 * feature + 1
pub fn reference() -> Raster {
    Raster::single(grid(), band(LABEL, |r, c| 2.0 * feature_value(r, c) + 1.0)).unwrap()
}

pub fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_boundary(region())
        .with_scene(feature_scene())
        .with_reference(reference())
}

/// First seed whose split of `n` samples trains on at least two and tests on at least one
pub fn split_seed(n: usize, fraction: f64) -> u64 {
    let samples = (0..n)
        .map(|i| Sample {
            row: i,
            col: 0,
            location: GeoPoint::new(0.0, i as f64),
            features: vec![0.0],
            label: 0.0,
        })
        .collect();
    let dataset = Dataset::new(FeatureSchema::new(["x"]), "y", samples).unwrap();
    (0..1000)
        .find(|&seed| {
            let split = DatasetSplitter::new(fraction, seed).split(&dataset);
            split.train().len() >= 2 && !split.test().is_empty()
        })
        .unwrap()
}

/// Config for the single-band scenario: every pixel sampled, 80% split
pub fn single_band_config(model: ModelConfig) -> PipelineConfig {
    PipelineConfig {
        point: GeoPoint::new(2.0, 2.0),
        bands: vec!["F".to_string()],
        features: FeatureOptions {
            scale_factor: 1.0,
            ndvi: false,
            evi: false,
            ..FeatureOptions::default()
        },
        cover: None,
        sampling: SamplingConfig {
            num_samples: SIZE * SIZE,
            scale: 1.0,
            seed: 7,
        },
        split: SplitConfig {
            train_fraction: 0.8,
            seed: split_seed(SIZE * SIZE, 0.8),
        },
        model,
        export: Some(ExportConfig {
            format: ExportFormat::Json,
            ..ExportConfig::default()
        }),
        ..PipelineConfig::default()
    }
}

pub fn ensemble(tree_count: usize) -> ModelConfig {
    ModelConfig::Ensemble(EnsembleParams {
        tree_count,
        ..EnsembleParams::default()
    })
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
