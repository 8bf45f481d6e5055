//! Reproducible point sampling of a masked feature stack

use crate::config::SamplingConfig;
use crate::dataset::{Dataset, Sample};
use crate::raster::Raster;
use crate::types::{CarbonResult, Grid};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Stream salt so the sampler and splitter never share a sequence
const SAMPLER_SALT: u64 = 0x5A3C_9F12_6B7E_4D01;

/// Draws up to N pixels valid in every feature band and in the label
#[derive(Debug, Clone)]
pub struct Sampler {
    num_samples: usize,
    scale: f64,
    seed: u64,
}

impl Sampler {
    pub fn new(num_samples: usize, scale: f64, seed: u64) -> Self {
        Self {
            num_samples,
            scale,
            seed,
        }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.num_samples, config.scale, config.seed)
    }

    /// Lattice step in pixels for the sampling scale
    pub fn stride(&self, grid: &Grid) -> usize {
        let pixel = grid.ground_pixel_size();
        if !(pixel > 0.0) {
            return 1;
        }
        ((self.scale / pixel).round() as usize).max(1)
    }

    /// Sample `features` against band `label_band` of `labels`.
    ///
    /// Fewer valid candidates than requested is not an error: all of them
    /// are returned. Samples come back ordered by (row, col).
    pub fn sample(&self, features: &Raster, labels: &Raster, label_band: &str) -> CarbonResult<Dataset> {
        features.grid().ensure_same(labels.grid())?;
        let label = labels.band(label_band)?;
        let schema = features.schema();
        let grid = features.grid();
        let stride = self.stride(grid);
        let (rows, cols) = grid.shape();

        let mut candidates: Vec<(usize, usize)> = (0..rows)
            .step_by(stride)
            .flat_map(|r| (0..cols).step_by(stride).map(move |c| (r, c)))
            .filter(|&(r, c)| features.is_valid(r, c) && label.is_valid(r, c))
            .collect();
        let available = candidates.len();

        let mut rng = StdRng::seed_from_u64(self.seed ^ SAMPLER_SALT);
        candidates.shuffle(&mut rng);
        candidates.truncate(self.num_samples);
        candidates.sort_unstable();

        if available < self.num_samples {
            log::warn!(
                "Only {} valid pixel(s) for {} requested sample(s)",
                available,
                self.num_samples
            );
        }
        log::info!(
            "Sampled {} pixel(s) at stride {} (seed {})",
            candidates.len(),
            stride,
            self.seed
        );

        let samples = candidates
            .into_iter()
            .filter_map(|(row, col)| {
                let features = features.pixel_vector(row, col)?;
                let value = label.value(row, col)?;
                Some(Sample {
                    row,
                    col,
                    location: grid.transform.pixel_center(row, col),
                    features,
                    label: f64::from(value),
                })
            })
            .collect();
        Dataset::new(schema, label_band, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Band;
    use crate::types::GeoTransform;
    use ndarray::Array2;

    fn grid(n: usize) -> Grid {
        Grid::new(n, n, GeoTransform::north_up(0.0, n as f64 * 10.0, 10.0), "EPSG:32644")
    }

    fn rasters(n: usize) -> (Raster, Raster) {
        let f = Band::from_data("x", Array2::from_shape_fn((n, n), |(r, c)| (r * n + c) as f32));
        let l = Band::from_data("y", Array2::from_shape_fn((n, n), |(r, c)| (r + c) as f32));
        (
            Raster::single(grid(n), f).unwrap(),
            Raster::single(grid(n), l).unwrap(),
        )
    }

    #[test]
    fn same_seed_same_dataset() {
        let (features, labels) = rasters(10);
        let a = Sampler::new(20, 10.0, 7).sample(&features, &labels, "y").unwrap();
        let b = Sampler::new(20, 10.0, 7).sample(&features, &labels, "y").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn returns_all_valid_pixels_when_short() {
        let (features, labels) = rasters(3);
        let dataset = Sampler::new(100, 10.0, 1).sample(&features, &labels, "y").unwrap();
        assert_eq!(dataset.len(), 9);
        let first = &dataset.samples()[0];
        assert_eq!((first.row, first.col), (0, 0));
        assert_eq!(first.features, vec![0.0]);
    }

    #[test]
    fn scale_sets_lattice_stride() {
        let (features, labels) = rasters(10);
        let sampler = Sampler::new(1000, 20.0, 1);
        assert_eq!(sampler.stride(features.grid()), 2);
        let dataset = sampler.sample(&features, &labels, "y").unwrap();
        assert_eq!(dataset.len(), 25);
        assert!(dataset.iter().all(|s| s.row % 2 == 0 && s.col % 2 == 0));
    }

    #[test]
    fn invalid_labels_are_skipped() {
        let (features, _) = rasters(2);
        let mut y = Array2::from_elem((2, 2), 1.0);
        y[[0, 1]] = f32::NAN;
        let labels = Raster::single(grid(2), Band::from_data("y", y)).unwrap();
        let dataset = Sampler::new(10, 10.0, 1).sample(&features, &labels, "y").unwrap();
        assert_eq!(dataset.len(), 3);
        assert!(dataset.iter().all(|s| (s.row, s.col) != (0, 1)));
    }

    #[test]
    fn fully_masked_stack_gives_empty_dataset() {
        let f = Band::invalid("x", (4, 4));
        let features = Raster::single(grid(4), f).unwrap();
        let (_, labels) = rasters(4);
        let dataset = Sampler::new(10, 10.0, 1).sample(&features, &labels, "y").unwrap();
        assert!(dataset.is_empty());
    }
}
