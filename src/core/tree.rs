//! CART regression tree stored as a node arena

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    /// Minimum samples in each child of a split
    pub min_leaf_population: usize,
    /// Features drawn per split; `None` uses all of them
    pub features_per_split: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_leaf_population: 1,
            features_per_split: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// `value <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
        population: usize,
    },
}

/// Regression tree minimising within-leaf label variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

struct Grower<'a> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a TreeParams,
    n_features: usize,
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Grow a tree over the rows listed in `indices` (repeats allowed).
    ///
    /// `rng` is only consumed when `features_per_split` subsamples features.
    pub fn fit(
        features: &[Vec<f64>],
        targets: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = features.first().map_or(0, Vec::len);
        let mut grower = Grower {
            features,
            targets,
            params,
            n_features,
            nodes: Vec::new(),
        };
        grower.grow(indices, 0, rng);
        Self {
            nodes: grower.nodes,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl<'a> Grower<'a> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let population = indices.len();
        let mean = if population == 0 {
            0.0
        } else {
            indices.iter().map(|&i| self.targets[i]).sum::<f64>() / population as f64
        };

        let depth_reached = self.params.max_depth.map_or(false, |d| depth >= d);
        let min_leaf = self.params.min_leaf_population.max(1);
        let pure = indices
            .iter()
            .all(|&i| self.targets[i] == self.targets[indices[0]]);
        if depth_reached || population < 2 * min_leaf || pure {
            return self.leaf(mean, population);
        }

        let candidates = self.candidate_features(rng);
        let best = match self.best_split(&indices, &candidates, min_leaf) {
            Some(best) => best,
            None => return self.leaf(mean, population),
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.features[i][best.feature] <= best.threshold);

        let idx = self.nodes.len();
        // placeholder until the children exist
        self.nodes.push(TreeNode::Leaf {
            value: mean,
            population,
        });
        let left = self.grow(left, depth + 1, rng);
        let right = self.grow(right, depth + 1, rng);
        self.nodes[idx] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn leaf(&mut self, value: f64, population: usize) -> usize {
        self.nodes.push(TreeNode::Leaf { value, population });
        self.nodes.len() - 1
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        match self.params.features_per_split {
            Some(k) if k < self.n_features => {
                let mut picked = rand::seq::index::sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Split maximising `sum_l^2 / n_l + sum_r^2 / n_r`, equivalent to the
    /// largest reduction of the squared error around the child means.
    fn best_split(&self, indices: &[usize], features: &[usize], min_leaf: usize) -> Option<Candidate> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let parent_score = total * total / n as f64;
        let mut best: Option<Candidate> = None;

        let mut order: Vec<usize> = indices.to_vec();
        for &feature in features {
            order.sort_by(|&a, &b| self.features[a][feature].total_cmp(&self.features[b][feature]));

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += self.targets[order[pos]];
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let lo = self.features[order[pos]][feature];
                let hi = self.features[order[pos + 1]][feature];
                if lo == hi {
                    continue;
                }
                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                if score <= parent_score {
                    continue;
                }
                if best.as_ref().map_or(true, |b| score > b.score) {
                    let mid = lo + (hi - lo) / 2.0;
                    // adjacent floats can round the midpoint up to `hi`
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(Candidate {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn column(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|&v| vec![v]).collect()
    }

    fn fit(features: &[Vec<f64>], targets: &[f64], params: &TreeParams) -> RegressionTree {
        let mut rng = StdRng::seed_from_u64(0);
        RegressionTree::fit(features, targets, (0..targets.len()).collect(), params, &mut rng)
    }

    #[test]
    fn step_function_is_learned_exactly() {
        let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0];
        let tree = fit(&x, &y, &TreeParams::default());
        assert_eq!(tree.depth(), 1);
        match &tree.nodes()[0] {
            TreeNode::Split { threshold, .. } => assert_eq!(*threshold, 3.5),
            other => panic!("expected split, got {:?}", other),
        }
        assert_eq!(tree.predict(&[3.5]), 0.0);
        assert_eq!(tree.predict(&[3.6]), 10.0);
    }

    #[test]
    fn unlimited_tree_interpolates_training_points() {
        let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = [3.0, 5.0, 7.0, 9.0, 11.0];
        let tree = fit(&x, &y, &TreeParams::default());
        for (xi, yi) in x.iter().zip(y) {
            assert_eq!(tree.predict(xi), yi);
        }
        assert_eq!(tree.leaf_count(), 5);
    }

    #[test]
    fn depth_and_leaf_population_limits() {
        let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let y: Vec<f64> = (1..=8).map(|v| v as f64).collect();
        let shallow = fit(
            &x,
            &y,
            &TreeParams {
                max_depth: Some(1),
                ..TreeParams::default()
            },
        );
        assert_eq!(shallow.depth(), 1);

        let coarse = fit(
            &x,
            &y,
            &TreeParams {
                min_leaf_population: 4,
                ..TreeParams::default()
            },
        );
        assert_eq!(coarse.leaf_count(), 2);
        assert_eq!(coarse.predict(&[1.0]), 2.5);
    }

    #[test]
    fn constant_feature_gives_mean_leaf() {
        let x = column(&[2.0, 2.0, 2.0]);
        let y = [1.0, 2.0, 6.0];
        let tree = fit(&x, &y, &TreeParams::default());
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.predict(&[0.0]), 3.0);
    }

    #[test]
    fn picks_informative_feature() {
        // feature 0 is noise, feature 1 separates the labels
        let x = vec![
            vec![5.0, 0.0],
            vec![1.0, 0.0],
            vec![4.0, 1.0],
            vec![2.0, 1.0],
        ];
        let y = [0.0, 0.0, 8.0, 8.0];
        let tree = fit(&x, &y, &TreeParams::default());
        match &tree.nodes()[0] {
            TreeNode::Split { feature, .. } => assert_eq!(*feature, 1),
            other => panic!("expected split, got {:?}", other),
        }
    }
}
