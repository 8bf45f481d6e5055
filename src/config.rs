//! Pipeline configuration
//!
//! Defaults reproduce the reference study: Sentinel-2 bands over the
//! 2022 season, tree-cover mask, 100-tree bagged ensemble.

use crate::types::{CarbonError, CarbonResult, DateRange, GeoPoint};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Feature engineering switches and constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOptions {
    /// Digital number to reflectance factor
    pub scale_factor: f32,
    pub nir_band: String,
    pub red_band: String,
    pub blue_band: String,
    pub ndvi: bool,
    pub evi: bool,
    /// Radius of the NDVI standard-deviation window (`Some(1)` = 3x3)
    pub texture_radius: Option<usize>,
    /// Include raw elevation as a feature band
    pub elevation: bool,
    /// Include slope (degrees) derived from elevation
    pub slope: bool,
    /// Source band name to feature name, e.g. "B8" -> "NIR"
    pub band_aliases: BTreeMap<String, String>,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1e-4,
            nir_band: "B8".to_string(),
            red_band: "B4".to_string(),
            blue_band: "B2".to_string(),
            ndvi: true,
            evi: true,
            texture_radius: None,
            elevation: false,
            slope: false,
            band_aliases: BTreeMap::new(),
        }
    }
}

impl FeatureOptions {
    /// Texture and terrain features on, bands renamed to spectral names
    pub fn extended() -> Self {
        let aliases = [
            ("B2", "Blue"),
            ("B3", "Green"),
            ("B4", "Red"),
            ("B5", "RE1"),
            ("B6", "RE2"),
            ("B7", "RE3"),
            ("B8", "NIR"),
            ("B11", "SWIR1"),
            ("B12", "SWIR2"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            texture_radius: Some(1),
            elevation: true,
            slope: true,
            band_aliases: aliases,
            ..Self::default()
        }
    }

    pub fn alias<'a>(&'a self, band: &'a str) -> &'a str {
        self.band_aliases.get(band).map(String::as_str).unwrap_or(band)
    }
}

/// Land-cover restriction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverConfig {
    /// Class kept by the mask (1 = trees)
    pub target_class: u16,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self { target_class: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub num_samples: usize,
    /// Sampling resolution in metres (map units on projected grids)
    pub scale: f64,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            num_samples: 5000,
            scale: 250.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            seed: 42,
        }
    }
}

/// Bagged regression tree ensemble parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleParams {
    pub tree_count: usize,
    /// Bootstrap size as a fraction of the training set
    pub bag_fraction: f64,
    pub seed: u64,
    pub max_depth: Option<usize>,
    pub min_leaf_population: usize,
    /// Features considered per split; `None` = all
    pub features_per_split: Option<usize>,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            tree_count: 100,
            bag_fraction: 0.7,
            seed: 42,
            max_depth: None,
            min_leaf_population: 1,
            features_per_split: None,
        }
    }
}

/// Robust (Talwar-weighted) least squares parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParams {
    pub max_iterations: usize,
    /// Residuals beyond this many robust standard deviations get zero weight
    pub tuning_constant: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tuning_constant: 2.795,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ModelConfig {
    Ensemble(EnsembleParams),
    Linear(LinearParams),
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::Ensemble(EnsembleParams::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    GeoTiff,
    Json,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::GeoTiff => write!(f, "GeoTIFF"),
            ExportFormat::Json => write!(f, "JSON"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Destination prefix handed to the export sink
    pub destination: String,
    pub scale: f64,
    pub crs: String,
    pub format: ExportFormat,
    /// Also export the clipped reference raster
    pub include_reference: bool,
}

impl ExportFormat {
    /// GeoTIFF when GDAL is compiled in, JSON otherwise
    pub fn default_for_build() -> Self {
        if cfg!(feature = "gdal") {
            ExportFormat::GeoTiff
        } else {
            ExportFormat::Json
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::default_for_build()
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            destination: "carbon_stock_estimation".to_string(),
            scale: 100.0,
            crs: "EPSG:4326".to_string(),
            format: ExportFormat::default(),
            include_reference: true,
        }
    }
}

/// Complete configuration of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub point: GeoPoint,
    pub date_range: DateRange,
    /// Maximum scene cloud cover in percent (0-100)
    pub cloud_threshold: f32,
    pub bands: Vec<String>,
    pub features: FeatureOptions,
    pub cover: Option<CoverConfig>,
    /// Band of the reference raster holding carbon density
    pub label_band: String,
    pub sampling: SamplingConfig,
    pub split: SplitConfig,
    pub model: ModelConfig,
    /// Clamp negative estimates to zero
    pub clamp_negative: bool,
    pub retrieval_timeout_secs: u64,
    pub export: Option<ExportConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            point: GeoPoint::new(81.4823, 7.8489),
            date_range: DateRange::new(
                NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            ),
            cloud_threshold: 10.0,
            bands: ["B2", "B3", "B4", "B5", "B6", "B7", "B8", "B11", "B12"]
                .iter()
                .map(|b| b.to_string())
                .collect(),
            features: FeatureOptions::default(),
            cover: Some(CoverConfig::default()),
            label_band: "carbon_tonnes_per_ha".to_string(),
            sampling: SamplingConfig::default(),
            split: SplitConfig::default(),
            model: ModelConfig::default(),
            clamp_negative: true,
            retrieval_timeout_secs: 120,
            export: Some(ExportConfig::default()),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> CarbonResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CarbonResult<Self> {
        log::info!("Loading pipeline configuration from {}", path.as_ref().display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> CarbonResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn validate(&self) -> CarbonResult<()> {
        let invalid = |msg: String| Err(CarbonError::InvalidConfig(msg));

        if !(0.0..=100.0).contains(&self.cloud_threshold) {
            return invalid(format!(
                "cloud threshold {} outside 0-100",
                self.cloud_threshold
            ));
        }
        if self.date_range.end <= self.date_range.start {
            return invalid(format!("empty date range {}", self.date_range));
        }
        if self.bands.is_empty() {
            return invalid("band list is empty".to_string());
        }
        if self.features.scale_factor <= 0.0 || !self.features.scale_factor.is_finite() {
            return invalid(format!("scale factor {}", self.features.scale_factor));
        }
        if self.features.texture_radius.is_some() && !self.features.ndvi {
            return invalid("texture requires NDVI".to_string());
        }
        if self.features.texture_radius == Some(0) {
            return invalid("texture radius must be at least 1".to_string());
        }
        if self.sampling.num_samples == 0 {
            return invalid("sample count must be positive".to_string());
        }
        if !(self.sampling.scale > 0.0) {
            return invalid(format!("sampling scale {}", self.sampling.scale));
        }
        let f = self.split.train_fraction;
        if !(f > 0.0 && f < 1.0) {
            return invalid(format!("train fraction {} outside (0, 1)", f));
        }
        match &self.model {
            ModelConfig::Ensemble(p) => {
                if p.tree_count == 0 {
                    return invalid("tree count must be positive".to_string());
                }
                if !(p.bag_fraction > 0.0 && p.bag_fraction <= 1.0) {
                    return invalid(format!("bag fraction {} outside (0, 1]", p.bag_fraction));
                }
                if p.min_leaf_population == 0 {
                    return invalid("min leaf population must be positive".to_string());
                }
                if p.features_per_split == Some(0) {
                    return invalid("features per split must be positive".to_string());
                }
            }
            ModelConfig::Linear(p) => {
                if p.max_iterations == 0 || !(p.tuning_constant > 0.0) {
                    return invalid("linear parameters must be positive".to_string());
                }
            }
        }
        if self.retrieval_timeout_secs == 0 {
            return invalid("retrieval timeout must be positive".to_string());
        }
        if let Some(export) = &self.export {
            if !(export.scale > 0.0) {
                return invalid(format!("export scale {}", export.scale));
            }
            parse_epsg(&export.crs)?;
        }
        Ok(())
    }
}

/// EPSG code of a CRS string of the form `EPSG:<code>`
pub fn parse_epsg(crs: &str) -> CarbonResult<u32> {
    let re = Regex::new(r"^(?i)EPSG:(\d{4,6})$")
        .map_err(|e| CarbonError::Processing(format!("CRS pattern: {}", e)))?;
    re.captures(crs.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| CarbonError::InvalidConfig(format!("unsupported CRS '{}'", crs)))
}
