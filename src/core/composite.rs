//! Feature stack construction
//!
//! Scenes → temporal median → reflectance scaling → indices → texture →
//! terrain → fixed-order stack clipped to the region.

use super::indices::{self, EVI_BAND, NDVI_BAND};
use super::stats;
use super::terrain::{self, ELEVATION_BAND, SLOPE_BAND};
use super::texture::{self, TEXTURE_BAND};
use crate::config::FeatureOptions;
use crate::dataset::FeatureSchema;
use crate::geometry::Region;
use crate::io::{Scene, SceneSource, TerrainSource};
use crate::raster::{Band, Raster};
use crate::types::{CarbonError, CarbonResult, DateRange, PixelValue};

/// Builds feature rasters with a fixed band order
#[derive(Debug, Clone)]
pub struct FeatureCompositor {
    bands: Vec<String>,
    options: FeatureOptions,
}

impl FeatureCompositor {
    pub fn new(bands: Vec<String>, options: FeatureOptions) -> Self {
        Self { bands, options }
    }

    pub fn options(&self) -> &FeatureOptions {
        &self.options
    }

    pub fn needs_terrain(&self) -> bool {
        self.options.elevation || self.options.slope
    }

    /// Band names of the stack in output order
    pub fn schema(&self) -> FeatureSchema {
        let mut names: Vec<String> = self
            .bands
            .iter()
            .map(|b| self.options.alias(b).to_string())
            .collect();
        if self.options.ndvi {
            names.push(NDVI_BAND.to_string());
        }
        if self.options.evi {
            names.push(EVI_BAND.to_string());
        }
        if self.options.texture_radius.is_some() {
            names.push(TEXTURE_BAND.to_string());
        }
        if self.options.elevation {
            names.push(ELEVATION_BAND.to_string());
        }
        if self.options.slope {
            names.push(SLOPE_BAND.to_string());
        }
        FeatureSchema::new(names)
    }

    /// Retrieve inputs directly from the sources (no timeout) and compose
    pub fn build(
        &self,
        scenes: &dyn SceneSource,
        terrain: Option<&dyn TerrainSource>,
        region: &Region,
        range: &DateRange,
        cloud_threshold: f32,
    ) -> CarbonResult<Raster> {
        let scenes = scenes.fetch(region, range, cloud_threshold)?;
        let elevation = match (self.needs_terrain(), terrain) {
            (true, Some(source)) => Some(source.elevation(region)?),
            (true, None) => return Err(CarbonError::MissingBand(ELEVATION_BAND.to_string())),
            (false, _) => None,
        };
        self.compose(region, range, cloud_threshold, scenes, elevation)
    }

    /// Compose a feature raster from already retrieved scenes and elevation
    pub fn compose(
        &self,
        region: &Region,
        range: &DateRange,
        cloud_threshold: f32,
        scenes: Vec<Scene>,
        elevation: Option<Raster>,
    ) -> CarbonResult<Raster> {
        let retrieved = scenes.len();
        let scenes: Vec<Scene> = scenes
            .into_iter()
            .filter(|s| range.contains(s.acquired) && s.cloud_fraction < cloud_threshold)
            .collect();
        if scenes.is_empty() {
            return Err(CarbonError::NoScenesAvailable {
                range: *range,
                cloud_threshold,
            });
        }
        log::info!(
            "Compositing {} scene(s) ({} retrieved) for region '{}'",
            scenes.len(),
            retrieved,
            region.name
        );

        let composite = median_composite(&scenes, &self.composite_bands())?;
        let reflectance = scale_bands(&composite, self.options.scale_factor)?;

        let mut stack: Vec<Band> = self
            .bands
            .iter()
            .map(|b| {
                reflectance
                    .band(b)
                    .map(|band| band.clone().renamed(self.options.alias(b)))
            })
            .collect::<CarbonResult<_>>()?;

        let ndvi = if self.options.ndvi || self.options.texture_radius.is_some() {
            Some(indices::ndvi(
                reflectance.band(&self.options.nir_band)?,
                reflectance.band(&self.options.red_band)?,
            )?)
        } else {
            None
        };
        if let (true, Some(ndvi)) = (self.options.ndvi, &ndvi) {
            stack.push(ndvi.clone());
        }
        if self.options.evi {
            stack.push(indices::evi(
                reflectance.band(&self.options.nir_band)?,
                reflectance.band(&self.options.red_band)?,
                reflectance.band(&self.options.blue_band)?,
            )?);
        }
        if let (Some(radius), Some(ndvi)) = (self.options.texture_radius, &ndvi) {
            stack.push(texture::focal_std_dev(ndvi, radius, TEXTURE_BAND)?);
        }

        if self.needs_terrain() {
            let elevation =
                elevation.ok_or_else(|| CarbonError::MissingBand(ELEVATION_BAND.to_string()))?;
            composite.grid().ensure_same(elevation.grid())?;
            let dem = elevation.first_band()?.clone().renamed(ELEVATION_BAND);
            let slope = terrain::slope_degrees(&dem, elevation.grid());
            if self.options.elevation {
                stack.push(dem);
            }
            if self.options.slope {
                stack.push(slope);
            }
        }

        let features = Raster::new(composite.grid().clone(), stack)?.clip(&region.polygon);
        self.schema().ensure_matches(&features.schema())?;
        log::info!(
            "Feature stack {} with {} valid pixel(s)",
            features.schema(),
            features.valid_count()
        );
        Ok(features)
    }

    /// Requested bands plus those the indices need, without duplicates
    fn composite_bands(&self) -> Vec<String> {
        let mut bands = self.bands.clone();
        let mut need = |name: &String| {
            if !bands.contains(name) {
                bands.push(name.clone());
            }
        };
        if self.options.ndvi || self.options.evi || self.options.texture_radius.is_some() {
            need(&self.options.nir_band);
            need(&self.options.red_band);
        }
        if self.options.evi {
            need(&self.options.blue_band);
        }
        bands
    }
}

/// Per-pixel median over the valid observations of each band.
///
/// Even counts average the two middle values; a pixel with no valid
/// observation is invalid.
pub fn median_composite(scenes: &[Scene], bands: &[String]) -> CarbonResult<Raster> {
    let first = scenes
        .first()
        .ok_or_else(|| CarbonError::Processing("median of zero scenes".to_string()))?;
    let grid = first.raster.grid().clone();
    for scene in &scenes[1..] {
        grid.ensure_same(scene.raster.grid())?;
    }

    let mut out = Vec::with_capacity(bands.len());
    for name in bands {
        let layers: Vec<&Band> = scenes
            .iter()
            .map(|s| s.raster.band(name))
            .collect::<CarbonResult<_>>()?;
        out.push(Band::from_fn(name.clone(), grid.shape(), |row, col| {
            let mut values: Vec<PixelValue> =
                layers.iter().filter_map(|b| b.value(row, col)).collect();
            stats::median(&mut values)
        }));
    }
    Raster::new(grid, out)
}

/// Multiply every valid value by `factor`
pub fn scale_bands(raster: &Raster, factor: PixelValue) -> CarbonResult<Raster> {
    let bands = raster
        .bands()
        .iter()
        .map(|b| Band::new(b.name.clone(), b.data.mapv(|v| v * factor), b.valid.clone()))
        .collect::<CarbonResult<Vec<_>>>()?;
    Raster::new(raster.grid().clone(), bands)
}
