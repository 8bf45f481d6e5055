//! GeoTIFF export through GDAL (`gdal` feature)

use super::sources::{ExportRequest, ExportSink};
use crate::config::{parse_epsg, ExportFormat};
use crate::raster::Raster;
use crate::types::{CarbonError, CarbonResult};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use std::path::{Path, PathBuf};

/// Written to invalid pixels
pub const NODATA: f32 = -9999.0;

/// Writes `<root>/<destination>.tif`, one GDAL band per raster band
pub struct GdalExportSink {
    root: PathBuf,
}

impl GdalExportSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl GdalExportSink {
    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.root.join(format!("{}.tif", destination))
    }
}

impl ExportSink for GdalExportSink {
    fn check(&self, raster: &Raster, request: &ExportRequest) -> CarbonResult<()> {
        if request.format != ExportFormat::GeoTiff {
            return Err(CarbonError::Export(format!(
                "GDAL sink cannot write {} output",
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
        parse_epsg(&request.crs)?;
        Ok(())
    }

    fn write(&self, raster: &Raster, request: &ExportRequest) -> CarbonResult<()> {
        self.check(raster, request)?;
        let epsg = parse_epsg(&request.crs)?;

        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(&request.destination);
        log::info!("Writing GeoTIFF {}", path.display());

        let (rows, cols) = raster.shape();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(
            &path,
            cols as isize,
            rows as isize,
            raster.band_count() as isize,
        )?;
        dataset.set_geo_transform(&raster.grid().transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;

        for (index, band) in raster.bands().iter().enumerate() {
            let data: Vec<f32> = band
                .data
                .iter()
                .zip(band.valid.iter())
                .map(|(&v, &ok)| if ok { v } else { NODATA })
                .collect();
            let mut out = dataset.rasterband(index as isize + 1)?;
            out.set_no_data_value(Some(NODATA as f64))?;
            let buffer = Buffer::new((cols, rows), data);
            out.write((0, 0), (cols, rows), &buffer)?;
            log::debug!("Wrote band {} ({})", index + 1, band.name);
        }
        Ok(())
    }

    fn discard(&self, destination: &str) -> CarbonResult<()> {
        let path = self.path_for(destination);
        if path.exists() {
            log::info!("Removing {}", path.display());
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
