//! Bagged regression tree ensemble
//!
//! Every tree draws its bootstrap sample and feature subsets from its own
//! RNG stream, derived from the ensemble seed and the tree index, so the
//! result does not depend on how trees are scheduled across threads.

use super::tree::{RegressionTree, TreeParams};
use crate::config::EnsembleParams;
use crate::parallel::*;
use crate::types::{CarbonError, CarbonResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Smallest training set an ensemble accepts
pub const MIN_ENSEMBLE_SAMPLES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    pub fn fit(features: &[Vec<f64>], targets: &[f64], params: &EnsembleParams) -> CarbonResult<Self> {
        let n = targets.len();
        if n < MIN_ENSEMBLE_SAMPLES {
            return Err(CarbonError::InsufficientData {
                required: MIN_ENSEMBLE_SAMPLES,
                available: n,
            });
        }
        if params.tree_count == 0 {
            return Err(CarbonError::InvalidConfig("tree count must be positive".to_string()));
        }
        if !(params.bag_fraction > 0.0 && params.bag_fraction <= 1.0) {
            return Err(CarbonError::InvalidConfig(format!(
                "bag fraction {} outside (0, 1]",
                params.bag_fraction
            )));
        }

        let bag_size = bag_size(n, params.bag_fraction);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_leaf_population: params.min_leaf_population,
            features_per_split: params.features_per_split,
        };
        log::info!(
            "Training {} tree(s) on {} sample(s), bootstrap size {}",
            params.tree_count,
            n,
            bag_size
        );

        let trees: Vec<RegressionTree> = (0..params.tree_count)
            .into_par_iter()
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, index));
                let bootstrap: Vec<usize> = (0..bag_size).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(features, targets, bootstrap, &tree_params, &mut rng)
            })
            .collect();

        log::debug!(
            "Ensemble leaves per tree: {:?}",
            trees.iter().map(RegressionTree::leaf_count).collect::<Vec<_>>()
        );
        Ok(Self { trees })
    }

    /// Unweighted mean of the tree outputs
    pub fn predict(&self, x: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// `ceil(fraction * n)`, never zero
fn bag_size(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).ceil() as usize).clamp(1, n)
}

/// SplitMix64 finaliser over the seed and tree index
fn tree_seed(seed: u64, index: usize) -> u64 {
    let mut z = seed ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
