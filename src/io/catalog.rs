//! Directory-backed JSON catalog.
//!
//! Layout under the catalog root:
//!
//! ```text
//! boundaries.json        [Region]
//! scenes/*.json          Scene
//! landcover/*.json       LandCoverPeriod
//! elevation.json         Raster
//! reference.json         Raster
//! ```
//!
//! Directory entries are read in file-name order so results are stable.

use super::sources::{
    BoundarySource, CategoricalSource, ExportRequest, ExportSink, LabelSource, LandCoverPeriod,
    Scene, SceneSource, TerrainSource,
};
use crate::config::ExportFormat;
use crate::geometry::Region;
use crate::raster::Raster;
use crate::types::{CarbonError, CarbonResult, DateRange, GeoPoint};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn open<P: AsRef<Path>>(root: P) -> CarbonResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CarbonError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("catalog directory {} not found", root.display()),
            )));
        }
        log::info!("Opened catalog at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_file<T: DeserializeOwned>(&self, relative: &str) -> CarbonResult<T> {
        read_json(self.root.join(relative))
    }

    /// All `*.json` files of a sub-directory; a missing directory is empty
    fn read_dir<T: DeserializeOwned>(&self, relative: &str) -> CarbonResult<Vec<T>> {
        let dir = self.root.join(relative);
        if !dir.is_dir() {
            log::debug!("Catalog directory {} absent", dir.display());
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();
        paths.into_iter().map(read_json).collect()
    }

    /// Write a value where the catalog expects it (used to build catalogs)
    pub fn store<T: Serialize>(&self, relative: &str, value: &T) -> CarbonResult<()> {
        write_json(self.root.join(relative), value)
    }
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> CarbonResult<T> {
    log::debug!("Reading {}", path.as_ref().display());
    let text = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> CarbonResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string(value)?;
    fs::write(path, text)?;
    Ok(())
}

impl BoundarySource for DirectoryCatalog {
    fn candidates(&self, point: GeoPoint) -> CarbonResult<Vec<Region>> {
        let regions: Vec<Region> = self.read_file("boundaries.json")?;
        Ok(regions
            .into_iter()
            .filter(|r| r.bounding_box().map(|b| b.contains(point)).unwrap_or(false))
            .collect())
    }
}

impl SceneSource for DirectoryCatalog {
    fn fetch(
        &self,
        region: &Region,
        range: &DateRange,
        cloud_threshold: f32,
    ) -> CarbonResult<Vec<Scene>> {
        let scenes: Vec<Scene> = self.read_dir("scenes")?;
        let total = scenes.len();
        let selected: Vec<Scene> = scenes
            .into_iter()
            .filter(|s| s.matches(region, range, cloud_threshold))
            .collect();
        log::debug!("Selected {} of {} catalog scenes", selected.len(), total);
        Ok(selected)
    }
}

impl CategoricalSource for DirectoryCatalog {
    fn fetch(&self, region: &Region, range: &DateRange) -> CarbonResult<Vec<Raster>> {
        let periods: Vec<LandCoverPeriod> = self.read_dir("landcover")?;
        Ok(periods
            .into_iter()
            .filter(|p| p.matches(region, range))
            .map(|p| p.raster)
            .collect())
    }
}

impl TerrainSource for DirectoryCatalog {
    fn elevation(&self, _region: &Region) -> CarbonResult<Raster> {
        self.read_file("elevation.json")
    }
}

impl LabelSource for DirectoryCatalog {
    fn reference(&self, _region: &Region) -> CarbonResult<Raster> {
        self.read_file("reference.json")
    }
}

/// Exported raster plus the export parameters it was written with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRaster {
    pub scale: f64,
    pub crs: String,
    pub raster: Raster,
}

/// Writes `<root>/<destination>.json`
pub struct JsonExportSink {
    root: PathBuf,
}

impl JsonExportSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.root.join(format!("{}.json", destination))
    }

    pub fn read(&self, destination: &str) -> CarbonResult<ExportedRaster> {
        read_json(self.path_for(destination))
    }
}

impl ExportSink for JsonExportSink {
    fn check(&self, raster: &Raster, request: &ExportRequest) -> CarbonResult<()> {
        if request.format != ExportFormat::Json {
            return Err(CarbonError::Export(format!(
                "JSON sink cannot write {} output",
                request.format
            )));
        }
        if !request.crs.eq_ignore_ascii_case(&raster.grid().crs) {
            return Err(CarbonError::Export(format!(
                "reprojection from {} to {} is not supported",
                raster.grid().crs,
                request.crs
            )));
        }
        Ok(())
    }

    fn write(&self, raster: &Raster, request: &ExportRequest) -> CarbonResult<()> {
        self.check(raster, request)?;
        let path = self.path_for(&request.destination);
        log::info!("Exporting {} band(s) to {}", raster.band_count(), path.display());
        let exported = ExportedRaster {
            scale: request.scale,
            crs: request.crs.clone(),
            raster: raster.clone(),
        };
        write_json(&path, &exported).map_err(|e| match e {
            CarbonError::Io(io) => CarbonError::Io(io),
            other => CarbonError::Export(other.to_string()),
        })
    }

    fn discard(&self, destination: &str) -> CarbonResult<()> {
        let path = self.path_for(destination);
        if path.exists() {
            log::info!("Removing {}", path.display());
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::raster::Band;
    use crate::types::{GeoTransform, Grid};
    use chrono::NaiveDate;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn raster() -> Raster {
        let grid = Grid::new(2, 2, GeoTransform::north_up(0.0, 2.0, 1.0), "EPSG:4326");
        Raster::single(grid, Band::from_data("B8", Array2::from_elem((2, 2), 1200.0))).unwrap()
    }

    #[test]
    fn reads_scenes_in_name_order_and_filters() {
        let dir = TempDir::new().unwrap();
        let catalog = DirectoryCatalog::open(dir.path()).unwrap();
        let date = |d| NaiveDate::from_ymd_opt(2022, 3, d).unwrap();
        for (name, day, cloud) in [("b", 2, 5.0), ("a", 1, 5.0), ("c", 3, 50.0)] {
            let scene = Scene {
                id: name.to_string(),
                acquired: date(day),
                cloud_fraction: cloud,
                raster: raster(),
            };
            catalog.store(&format!("scenes/{}.json", name), &scene).unwrap();
        }
        let region = Region::new("r", Polygon::rectangle(0.0, 0.0, 2.0, 2.0));
        let range = DateRange::new(date(1), date(30));
        let scenes = SceneSource::fetch(&catalog, &region, &range, 10.0).unwrap();
        let ids: Vec<_> = scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_landcover_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = DirectoryCatalog::open(dir.path()).unwrap();
        let region = Region::new("r", Polygon::rectangle(0.0, 0.0, 2.0, 2.0));
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        );
        let periods = CategoricalSource::fetch(&catalog, &region, &range).unwrap();
        assert!(periods.is_empty());
    }

    #[test]
    fn json_sink_writes_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let sink = JsonExportSink::new(dir.path());
        let request = ExportRequest {
            destination: "estimate".to_string(),
            scale: 100.0,
            crs: "EPSG:4326".to_string(),
            format: ExportFormat::Json,
        };
        sink.write(&raster(), &request).unwrap();
        let back = sink.read("estimate").unwrap();
        assert_eq!(back.raster, raster());
        assert_eq!(back.scale, 100.0);
    }

    #[test]
    fn json_sink_refuses_reprojection() {
        let dir = TempDir::new().unwrap();
        let sink = JsonExportSink::new(dir.path());
        let request = ExportRequest {
            destination: "estimate".to_string(),
            scale: 100.0,
            crs: "EPSG:32644".to_string(),
            format: ExportFormat::Json,
        };
        assert!(matches!(
            sink.write(&raster(), &request),
            Err(CarbonError::Export(_))
        ));
    }

    #[test]
    fn json_sink_discard_removes_written_file() {
        let dir = TempDir::new().unwrap();
        let sink = JsonExportSink::new(dir.path());
        let request = ExportRequest {
            destination: "estimate".to_string(),
            scale: 100.0,
            crs: "EPSG:4326".to_string(),
            format: ExportFormat::Json,
        };
        sink.check(&raster(), &request).unwrap();
        sink.write(&raster(), &request).unwrap();
        assert!(sink.path_for("estimate").is_file());
        sink.discard("estimate").unwrap();
        assert!(!sink.path_for("estimate").exists());
        // discarding twice is harmless
        sink.discard("estimate").unwrap();
    }
}
