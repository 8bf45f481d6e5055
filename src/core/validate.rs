//! Accuracy of estimates against reference values
//!
//! Only locations valid on both sides count; an empty comparison set is
//! [`CarbonError::NoOverlap`].

use super::model::{Model, Regressor};
use crate::dataset::Dataset;
use crate::raster::Raster;
use crate::types::{CarbonError, CarbonResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rmse: f64,
    pub mae: f64,
    /// Mean of estimate minus reference
    pub bias: f64,
    pub count: usize,
}

impl ValidationResult {
    /// Aggregate `(estimate, reference)` pairs
    pub fn from_pairs<I>(pairs: I) -> CarbonResult<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut count = 0usize;
        let mut sum_sq = 0.0;
        let mut sum_abs = 0.0;
        let mut sum = 0.0;
        for (estimate, reference) in pairs {
            let err = estimate - reference;
            sum_sq += err * err;
            sum_abs += err.abs();
            sum += err;
            count += 1;
        }
        if count == 0 {
            return Err(CarbonError::NoOverlap);
        }
        let n = count as f64;
        Ok(Self {
            rmse: (sum_sq / n).sqrt(),
            mae: sum_abs / n,
            bias: sum / n,
            count,
        })
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RMSE {:.4}, MAE {:.4}, bias {:+.4} over {} location(s)",
            self.rmse, self.mae, self.bias, self.count
        )
    }
}

/// Model evaluated on every sample of a held-out dataset
pub fn validate_model(model: &Model, test: &Dataset) -> CarbonResult<ValidationResult> {
    model.schema().ensure_matches(test.schema())?;
    let result = ValidationResult::from_pairs(
        test.iter().map(|s| (model.predict_row(&s.features), s.label)),
    )?;
    log::info!("Model validation: {}", result);
    Ok(result)
}

/// First band of a prediction raster looked up at each sample pixel
pub fn validate_raster(prediction: &Raster, test: &Dataset) -> CarbonResult<ValidationResult> {
    let band = prediction.first_band()?;
    let (rows, cols) = band.dim();
    let result = ValidationResult::from_pairs(test.iter().filter_map(|s| {
        if s.row >= rows || s.col >= cols {
            return None;
        }
        band.value(s.row, s.col).map(|v| (f64::from(v), s.label))
    }))?;
    log::info!("Raster validation: {}", result);
    Ok(result)
}

/// Pixelwise comparison of two single-band rasters on the same grid
pub fn compare_rasters(prediction: &Raster, reference: &Raster) -> CarbonResult<ValidationResult> {
    prediction.grid().ensure_same(reference.grid())?;
    let estimate = prediction.first_band()?;
    let truth = reference.first_band()?;
    let (rows, cols) = prediction.shape();
    let pairs = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter_map(|(r, c)| {
            let e = estimate.value(r, c)?;
            let t = truth.value(r, c)?;
            Some((f64::from(e), f64::from(t)))
        });
    let result = ValidationResult::from_pairs(pairs)?;
    log::info!("Raster comparison: {}", result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Band;
    use crate::types::{GeoTransform, Grid};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn grid() -> Grid {
        Grid::new(1, 3, GeoTransform::north_up(0.0, 1.0, 1.0), "EPSG:4326")
    }

    fn single(values: [f32; 3]) -> Raster {
        let data = Array2::from_shape_vec((1, 3), values.to_vec()).unwrap();
        Raster::single(grid(), Band::from_data("v", data)).unwrap()
    }

    #[test]
    fn metrics_from_pairs() {
        let result = ValidationResult::from_pairs(vec![(3.0, 1.0), (1.0, 1.0), (0.0, 2.0)]).unwrap();
        assert_relative_eq!(result.rmse, (8.0f64 / 3.0).sqrt());
        assert_relative_eq!(result.mae, 4.0 / 3.0);
        assert_relative_eq!(result.bias, 0.0);
        assert_eq!(result.count, 3);
    }

    #[test]
    fn identical_values_give_zero_rmse() {
        let result = compare_rasters(&single([1.0, 2.0, 3.0]), &single([1.0, 2.0, 3.0])).unwrap();
        assert_eq!(result.rmse, 0.0);
    }

    #[test]
    fn comparison_uses_common_valid_pixels() {
        let result =
            compare_rasters(&single([1.0, f32::NAN, 5.0]), &single([2.0, 2.0, f32::NAN])).unwrap();
        assert_eq!(result.count, 1);
        assert_relative_eq!(result.rmse, 1.0);
    }

    #[test]
    fn no_common_pixels_is_no_overlap() {
        let err = compare_rasters(
            &single([1.0, f32::NAN, f32::NAN]),
            &single([f32::NAN, 2.0, 2.0]),
        )
        .unwrap_err();
        assert!(matches!(err, CarbonError::NoOverlap));
        assert!(matches!(
            ValidationResult::from_pairs(Vec::new()),
            Err(CarbonError::NoOverlap)
        ));
    }
}
