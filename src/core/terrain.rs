//! Terrain derivatives from elevation

use crate::raster::Band;
use crate::types::{Grid, PixelValue, METERS_PER_DEGREE};

pub const ELEVATION_BAND: &str = "elevation";
pub const SLOPE_BAND: &str = "slope";

/// Pixel spacing in metres at a given row: (x, y)
///
/// Geographic grids convert degrees with the cosine of the row latitude;
/// projected grids are assumed to be in metres already.
fn cell_size_m(grid: &Grid, row: usize) -> (f64, f64) {
    let gt = &grid.transform;
    let (dx, dy) = (gt.pixel_width.abs(), gt.pixel_height.abs());
    if grid.is_geographic() {
        let lat = gt.pixel_center(row, 0).lat;
        (
            dx * METERS_PER_DEGREE * lat.to_radians().cos().abs(),
            dy * METERS_PER_DEGREE,
        )
    } else {
        (dx, dy)
    }
}

/// Slope in degrees using Horn's 3x3 weighted gradient.
///
/// Edges replicate the nearest row/column; an invalid neighbour takes the
/// centre value. Invalid elevation pixels stay invalid.
pub fn slope_degrees(elevation: &Band, grid: &Grid) -> Band {
    let (rows, cols) = elevation.dim();
    log::debug!("Computing slope over {}x{} elevation grid", rows, cols);

    Band::from_fn(SLOPE_BAND, (rows, cols), |row, col| {
        let centre = f64::from(elevation.value(row, col)?);
        let z = |dr: isize, dc: isize| -> f64 {
            let r = (row as isize + dr).clamp(0, rows as isize - 1) as usize;
            let c = (col as isize + dc).clamp(0, cols as isize - 1) as usize;
            elevation.value(r, c).map(f64::from).unwrap_or(centre)
        };

        let (cx, cy) = cell_size_m(grid, row);
        if cx <= 0.0 || cy <= 0.0 {
            return None;
        }

        let (nw, n, ne) = (z(-1, -1), z(-1, 0), z(-1, 1));
        let (w, e) = (z(0, -1), z(0, 1));
        let (sw, s, se) = (z(1, -1), z(1, 0), z(1, 1));

        let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cx);
        let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cy);
        let slope = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
        Some(slope as PixelValue)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn projected_grid(n: usize, cell: f64) -> Grid {
        Grid::new(n, n, GeoTransform::north_up(0.0, n as f64 * cell, cell), "EPSG:32644")
    }

    #[test]
    fn flat_surface_has_zero_slope() {
        let grid = projected_grid(5, 30.0);
        let dem = Band::from_data(ELEVATION_BAND, Array2::from_elem((5, 5), 120.0));
        let slope = slope_degrees(&dem, &grid);
        assert_eq!(slope.valid_count(), 25);
        assert!(slope.data.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn ramp_interior_matches_angle() {
        let cell = 30.0;
        let target = 20.0f64;
        let rise = cell * target.to_radians().tan();
        let grid = projected_grid(6, cell);
        let dem = Band::from_data(
            ELEVATION_BAND,
            Array2::from_shape_fn((6, 6), |(_, c)| (c as f64 * rise) as f32),
        );
        let slope = slope_degrees(&dem, &grid);
        assert_relative_eq!(f64::from(slope.value(2, 2).unwrap()), target, epsilon = 1e-3);
        // replicated edge halves the gradient
        assert!(slope.value(2, 0).unwrap() < slope.value(2, 2).unwrap());
    }

    #[test]
    fn geographic_grid_uses_metres() {
        // ~30 m pixels at the equator
        let deg = 30.0 / METERS_PER_DEGREE;
        let grid = Grid::new(5, 5, GeoTransform::north_up(0.0, 5.0 * deg, deg), "EPSG:4326");
        let dem = Band::from_data(
            ELEVATION_BAND,
            Array2::from_shape_fn((5, 5), |(r, _)| (r as f32) * 30.0),
        );
        let slope = slope_degrees(&dem, &grid);
        assert_relative_eq!(slope.value(2, 2).unwrap(), 45.0, epsilon = 1e-2);
    }

    #[test]
    fn invalid_elevation_stays_invalid() {
        let grid = projected_grid(3, 30.0);
        let mut data = Array2::from_elem((3, 3), 10.0);
        data[[1, 1]] = f32::NAN;
        let dem = Band::from_data(ELEVATION_BAND, data);
        let slope = slope_degrees(&dem, &grid);
        assert!(!slope.is_valid(1, 1));
        assert!(slope.is_valid(0, 0));
    }
}
