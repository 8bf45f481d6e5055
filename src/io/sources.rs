//! Collaborator interfaces the pipeline consumes.
//!
//! Concrete backends live in [`super::memory`], [`super::catalog`] and,
//! with the `gdal` feature, `super::gdal_export`.

use crate::config::ExportFormat;
use crate::geometry::Region;
use crate::raster::Raster;
use crate::types::{CarbonResult, DateRange, GeoPoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One optical acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub acquired: NaiveDate,
    /// Scene-level cloud cover in percent (0-100)
    pub cloud_fraction: f32,
    /// Raw digital numbers, one band per spectral channel
    pub raster: Raster,
}

impl Scene {
    /// Date, cloud and footprint filter shared by every scene source
    pub fn matches(&self, region: &Region, range: &DateRange, cloud_threshold: f32) -> bool {
        if !range.contains(self.acquired) || self.cloud_fraction >= cloud_threshold {
            return false;
        }
        match region.bounding_box() {
            Some(bbox) => bbox.intersects(&self.raster.grid().bounding_box()),
            None => false,
        }
    }
}

/// One categorical land-cover observation period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandCoverPeriod {
    pub acquired: NaiveDate,
    /// Single band of integer class ids
    pub raster: Raster,
}

impl LandCoverPeriod {
    pub fn matches(&self, region: &Region, range: &DateRange) -> bool {
        range.contains(self.acquired)
            && region
                .bounding_box()
                .map(|bbox| bbox.intersects(&self.raster.grid().bounding_box()))
                .unwrap_or(false)
    }
}

/// Where and how to persist a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub destination: String,
    pub scale: f64,
    pub crs: String,
    pub format: ExportFormat,
}

/// Administrative boundaries
pub trait BoundarySource: Send + Sync {
    /// Boundaries whose extent may contain `point`; exact containment is
    /// checked by the region resolver.
    fn candidates(&self, point: GeoPoint) -> CarbonResult<Vec<Region>>;
}

/// Optical scenes
pub trait SceneSource: Send + Sync {
    /// Scenes intersecting `region` within `range` with cloud cover below
    /// `cloud_threshold`. An empty result is not an error here.
    fn fetch(
        &self,
        region: &Region,
        range: &DateRange,
        cloud_threshold: f32,
    ) -> CarbonResult<Vec<Scene>>;
}

/// Categorical land cover time series
pub trait CategoricalSource: Send + Sync {
    /// One categorical raster per observation period; empty when the
    /// source has no coverage.
    fn fetch(&self, region: &Region, range: &DateRange) -> CarbonResult<Vec<Raster>>;
}

/// Terrain elevation
pub trait TerrainSource: Send + Sync {
    fn elevation(&self, region: &Region) -> CarbonResult<Raster>;
}

/// Reference carbon density
pub trait LabelSource: Send + Sync {
    fn reference(&self, region: &Region) -> CarbonResult<Raster>;
}

/// Persistence of result rasters
pub trait ExportSink: Send + Sync {
    /// Reject a request this sink cannot honour, before anything is written
    fn check(&self, _raster: &Raster, _request: &ExportRequest) -> CarbonResult<()> {
        Ok(())
    }

    fn write(&self, raster: &Raster, request: &ExportRequest) -> CarbonResult<()>;

    /// Remove a destination written earlier in the same run
    fn discard(&self, _destination: &str) -> CarbonResult<()> {
        Ok(())
    }
}
