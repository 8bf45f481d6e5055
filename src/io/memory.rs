//! In-memory collaborators for tests and embedding

use super::sources::{
    BoundarySource, CategoricalSource, ExportRequest, ExportSink, LabelSource, LandCoverPeriod,
    Scene, SceneSource, TerrainSource,
};
use crate::geometry::Region;
use crate::raster::Raster;
use crate::types::{CarbonError, CarbonResult, DateRange, GeoPoint};
use std::sync::Mutex;

/// Every source backed by plain vectors
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    pub boundaries: Vec<Region>,
    pub scenes: Vec<Scene>,
    pub land_cover: Vec<LandCoverPeriod>,
    pub elevation: Option<Raster>,
    pub reference: Option<Raster>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boundary(mut self, region: Region) -> Self {
        self.boundaries.push(region);
        self
    }

    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn with_land_cover(mut self, period: LandCoverPeriod) -> Self {
        self.land_cover.push(period);
        self
    }

    pub fn with_elevation(mut self, elevation: Raster) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_reference(mut self, reference: Raster) -> Self {
        self.reference = Some(reference);
        self
    }
}

impl BoundarySource for MemoryCatalog {
    fn candidates(&self, point: GeoPoint) -> CarbonResult<Vec<Region>> {
        Ok(self
            .boundaries
            .iter()
            .filter(|r| r.bounding_box().map(|b| b.contains(point)).unwrap_or(false))
            .cloned()
            .collect())
    }
}

impl SceneSource for MemoryCatalog {
    fn fetch(
        &self,
        region: &Region,
        range: &DateRange,
        cloud_threshold: f32,
    ) -> CarbonResult<Vec<Scene>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| s.matches(region, range, cloud_threshold))
            .cloned()
            .collect())
    }
}

impl CategoricalSource for MemoryCatalog {
    fn fetch(&self, region: &Region, range: &DateRange) -> CarbonResult<Vec<Raster>> {
        Ok(self
            .land_cover
            .iter()
            .filter(|p| p.matches(region, range))
            .map(|p| p.raster.clone())
            .collect())
    }
}

impl TerrainSource for MemoryCatalog {
    fn elevation(&self, _region: &Region) -> CarbonResult<Raster> {
        self.elevation
            .clone()
            .ok_or_else(|| CarbonError::MissingBand("elevation".to_string()))
    }
}

impl LabelSource for MemoryCatalog {
    fn reference(&self, _region: &Region) -> CarbonResult<Raster> {
        self.reference
            .clone()
            .ok_or_else(|| CarbonError::MissingBand("reference".to_string()))
    }
}

/// Export sink that keeps written rasters in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<Vec<(ExportRequest, Raster)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<(ExportRequest, Raster)> {
        self.written
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

impl ExportSink for MemorySink {
    fn write(&self, raster: &Raster, request: &ExportRequest) -> CarbonResult<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|e| CarbonError::Export(format!("sink poisoned: {}", e)))?;
        written.push((request.clone(), raster.clone()));
        Ok(())
    }

    fn discard(&self, destination: &str) -> CarbonResult<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|e| CarbonError::Export(format!("sink poisoned: {}", e)))?;
        written.retain(|(request, _)| request.destination != destination);
        Ok(())
    }
}
