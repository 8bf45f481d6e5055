//! Vegetation indices by band algebra
//!
//! A zero denominator or an invalid input yields an invalid output pixel;
//! NaN and infinity never reach the output band.

use crate::raster::Band;
use crate::types::{CarbonError, CarbonResult, PixelValue};

/// EVI gain
const EVI_G: f64 = 2.5;
/// EVI aerosol resistance, red
const EVI_C1: f64 = 6.0;
/// EVI aerosol resistance, blue
const EVI_C2: f64 = 7.5;
/// EVI canopy background adjustment
const EVI_L: f64 = 1.0;

pub const NDVI_BAND: &str = "NDVI";
pub const EVI_BAND: &str = "EVI";

/// `(NIR - RED) / (NIR + RED)`
pub fn ndvi(nir: &Band, red: &Band) -> CarbonResult<Band> {
    normalized_difference(nir, red, NDVI_BAND)
}

/// `(a - b) / (a + b)` for any band pair
pub fn normalized_difference(a: &Band, b: &Band, name: &str) -> CarbonResult<Band> {
    check_dimensions(&[a, b])?;
    log::debug!("Computing {} from {} and {}", name, a.name, b.name);

    Ok(Band::from_fn(name, a.dim(), |row, col| {
        let va = f64::from(a.value(row, col)?);
        let vb = f64::from(b.value(row, col)?);
        let sum = va + vb;
        if sum == 0.0 {
            return None;
        }
        Some(((va - vb) / sum) as PixelValue)
    }))
}

/// `2.5 * (NIR - RED) / (NIR + 6 RED - 7.5 BLUE + 1)` on reflectance
pub fn evi(nir: &Band, red: &Band, blue: &Band) -> CarbonResult<Band> {
    check_dimensions(&[nir, red, blue])?;
    log::debug!("Computing {} from {}, {}, {}", EVI_BAND, nir.name, red.name, blue.name);

    Ok(Band::from_fn(EVI_BAND, nir.dim(), |row, col| {
        let n = f64::from(nir.value(row, col)?);
        let r = f64::from(red.value(row, col)?);
        let b = f64::from(blue.value(row, col)?);
        let denominator = n + EVI_C1 * r - EVI_C2 * b + EVI_L;
        if denominator == 0.0 {
            return None;
        }
        Some((EVI_G * (n - r) / denominator) as PixelValue)
    }))
}

fn check_dimensions(bands: &[&Band]) -> CarbonResult<()> {
    let first = bands[0].dim();
    match bands.iter().find(|b| b.dim() != first) {
        Some(other) => Err(CarbonError::GridMismatch(format!(
            "band '{}' is {:?}, expected {:?}",
            other.name,
            other.dim(),
            first
        ))),
        None => Ok(()),
    }
}
