use crate::raster::Band;
use crate::types::{CarbonError, CarbonResult, PixelValue};

pub const TEXTURE_BAND: &str = "NDVI_std";

/// Population standard deviation inside a (2r+1)x(2r+1) square window.
///
/// Only valid neighbours contribute; the window is truncated at the raster
/// edge. An invalid centre pixel stays invalid.
pub fn focal_std_dev(band: &Band, radius: usize, name: &str) -> CarbonResult<Band> {
    if radius == 0 {
        return Err(CarbonError::InvalidConfig(
            "texture window radius must be > 0".to_string(),
        ));
    }
    let (rows, cols) = band.dim();
    let r = radius as isize;
    log::debug!(
        "Focal std dev of {} with {}x{} window",
        band.name,
        2 * radius + 1,
        2 * radius + 1
    );

    Ok(Band::from_fn(name, (rows, cols), |row, col| {
        band.value(row, col)?;

        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for dr in -r..=r {
            let rr = row as isize + dr;
            if rr < 0 || rr >= rows as isize {
                continue;
            }
            for dc in -r..=r {
                let cc = col as isize + dc;
                if cc < 0 || cc >= cols as isize {
                    continue;
                }
                if let Some(v) = band.value(rr as usize, cc as usize) {
                    let v = f64::from(v);
                    count += 1;
                    sum += v;
                    sum_sq += v * v;
                }
            }
        }

        let n = count as f64;
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        Some(variance.sqrt() as PixelValue)
    }))
}
