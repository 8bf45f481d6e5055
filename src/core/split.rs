use crate::config::SplitConfig;
use crate::dataset::{Dataset, Split};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SPLIT_SALT: u64 = 0x1234_5678_9ABC_DEF0;

/// Seeded random train/test partition.
///
/// Each sample, in dataset order, draws a value in [0, 1) and goes to the
/// training subset when it is below the train fraction. The expected share
/// is the fraction; the exact count varies with the seed.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSplitter {
    train_fraction: f64,
    seed: u64,
}

impl DatasetSplitter {
    pub fn new(train_fraction: f64, seed: u64) -> Self {
        Self {
            train_fraction,
            seed,
        }
    }

    pub fn from_config(config: &SplitConfig) -> Self {
        Self::new(config.train_fraction, config.seed)
    }

    pub fn split(&self, dataset: &Dataset) -> Split {
        let mut rng = StdRng::seed_from_u64(self.seed ^ SPLIT_SALT);
        let (train, test): (Vec<_>, Vec<_>) = dataset
            .iter()
            .cloned()
            .partition(|_| rng.gen::<f64>() < self.train_fraction);

        log::info!(
            "Split {} sample(s) into {} train / {} test (fraction {})",
            dataset.len(),
            train.len(),
            test.len(),
            self.train_fraction
        );
        Split::new(dataset.subset(train), dataset.subset(test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureSchema, Sample};
    use crate::types::GeoPoint;

    fn dataset(n: usize) -> Dataset {
        let samples = (0..n)
            .map(|i| Sample {
                row: i,
                col: 0,
                location: GeoPoint::new(0.0, i as f64),
                features: vec![i as f64],
                label: i as f64,
            })
            .collect();
        Dataset::new(FeatureSchema::new(["x"]), "y", samples).unwrap()
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let data = dataset(200);
        let split = DatasetSplitter::new(0.7, 3).split(&data);
        assert_eq!(split.train().len() + split.test().len(), data.len());
        let mut rows: Vec<usize> = split
            .train()
            .iter()
            .chain(split.test().iter())
            .map(|s| s.row)
            .collect();
        rows.sort_unstable();
        assert_eq!(rows, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn fraction_holds_in_expectation() {
        let data = dataset(2000);
        let split = DatasetSplitter::new(0.7, 11).split(&data);
        let share = split.train().len() as f64 / data.len() as f64;
        assert!((share - 0.7).abs() < 0.05, "train share {}", share);
    }

    #[test]
    fn deterministic_per_seed() {
        let data = dataset(50);
        let a = DatasetSplitter::new(0.5, 9).split(&data);
        let b = DatasetSplitter::new(0.5, 9).split(&data);
        assert_eq!(a, b);
    }
}
