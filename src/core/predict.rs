use super::model::{Model, Regressor};
use crate::raster::{Band, Raster};
use crate::types::{CarbonResult, PixelValue};

pub const PREDICTION_BAND: &str = "estimated_carbon";

/// Applies a trained model to every valid pixel of a feature raster
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'a> {
    model: &'a Model,
    clamp_negative: bool,
}

impl<'a> Predictor<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            clamp_negative: true,
        }
    }

    /// Negative estimates become zero when set (non-negative quantities)
    pub fn clamp_negative(mut self, clamp: bool) -> Self {
        self.clamp_negative = clamp;
        self
    }

    /// Single-band prediction raster on the feature grid.
    ///
    /// The feature raster must carry exactly the model's schema; pixels
    /// invalid in any feature band stay invalid.
    pub fn predict(&self, features: &Raster) -> CarbonResult<Raster> {
        self.model.schema().ensure_matches(&features.schema())?;
        log::info!(
            "Predicting {} over {}x{} grid ({} valid pixel(s))",
            PREDICTION_BAND,
            features.grid().rows,
            features.grid().cols,
            features.valid_count()
        );

        let model = self.model;
        let clamp = self.clamp_negative;
        let band = Band::from_fn(PREDICTION_BAND, features.shape(), |row, col| {
            let x = features.pixel_vector(row, col)?;
            let estimate = model.predict_row(&x);
            let estimate = if clamp { estimate.max(0.0) } else { estimate };
            Some(estimate as PixelValue)
        });
        Raster::single(features.grid().clone(), band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinearParams, ModelConfig};
    use crate::dataset::{Dataset, FeatureSchema, Sample};
    use crate::types::{CarbonError, GeoPoint, GeoTransform, Grid};
    use ndarray::Array2;

    /// label = x - 5
    fn model() -> Model {
        let samples = (0..10)
            .map(|i| Sample {
                row: 0,
                col: i,
                location: GeoPoint::new(i as f64, 0.0),
                features: vec![i as f64],
                label: i as f64 - 5.0,
            })
            .collect();
        let train = Dataset::new(FeatureSchema::new(["x"]), "y", samples).unwrap();
        Model::train(&train, &ModelConfig::Linear(LinearParams::default())).unwrap()
    }

    fn features(name: &str) -> Raster {
        let grid = Grid::new(1, 4, GeoTransform::north_up(0.0, 1.0, 1.0), "EPSG:4326");
        let data = Array2::from_shape_vec((1, 4), vec![1.0, 7.0, f32::NAN, 9.0]).unwrap();
        Raster::single(grid, Band::from_data(name, data)).unwrap()
    }

    #[test]
    fn clamps_and_keeps_invalid_pixels() {
        let model = model();
        let out = Predictor::new(&model).predict(&features("x")).unwrap();
        let band = out.band(PREDICTION_BAND).unwrap();
        assert_eq!(band.value(0, 0), Some(0.0));
        assert!((band.value(0, 1).unwrap() - 2.0).abs() < 1e-5);
        assert_eq!(band.value(0, 2), None);
        assert!(band.data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn unclamped_keeps_sign() {
        let model = model();
        let out = Predictor::new(&model)
            .clamp_negative(false)
            .predict(&features("x"))
            .unwrap();
        assert!((out.band(PREDICTION_BAND).unwrap().value(0, 0).unwrap() + 4.0).abs() < 1e-5);
    }

    #[test]
    fn schema_mismatch_is_an_error() {
        let model = model();
        let err = Predictor::new(&model).predict(&features("NDVI")).unwrap_err();
        assert!(matches!(err, CarbonError::SchemaMismatch { .. }));
    }
}
