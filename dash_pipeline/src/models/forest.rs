//! Bagged regression trees
//!
//! Each tree is grown on a bootstrap resample of the training rows, choosing
//! at every node the split with the largest reduction in squared error.
//! Predictions average the trees.

use super::{check_training_data, normalize, FittedRegressor, Regressor};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Random forest regressor
#[derive(Debug, Clone)]
pub struct ForestRegressor {
    name: String,
    n_trees: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    seed: u64,
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf(value) => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

/// Trained forest
#[derive(Debug, Clone)]
pub struct FittedForest {
    name: String,
    trees: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl FittedForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl ForestRegressor {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            name: format!("Random Forest ({n_trees} trees)"),
            n_trees,
            max_depth: None,
            min_samples_split: 2,
            seed,
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split.max(2);
        self
    }
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    target: &'a [f64],
    max_depth: Option<usize>,
    min_samples_split: usize,
    /// Squared-error reduction credited to each feature
    gains: Vec<f64>,
}

fn mean_of(target: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| target[i]).sum::<f64>() / indices.len() as f64
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let leaf_value = mean_of(self.target, &indices);
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || indices.len() < self.min_samples_split {
            return TreeNode::Leaf(leaf_value);
        }

        let Some((feature, threshold, gain)) = self.best_split(&indices) else {
            return TreeNode::Leaf(leaf_value);
        };
        self.gains[feature] += gain;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][feature] <= threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    /// Split with the largest squared-error reduction, if any reduces it
    fn best_split(&self, indices: &[usize]) -> Option<(usize, f64, f64)> {
        let n = indices.len() as f64;
        let total: f64 = indices.iter().map(|&i| self.target[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.target[i].powi(2)).sum();
        let parent_sse = total_sq - total * total / n;
        if parent_sse <= 1e-12 {
            return None;
        }

        let mut best: Option<(usize, f64, f64)> = None;
        let width = self.rows[indices[0]].len();
        let mut order = indices.to_vec();

        for feature in 0..width {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..order.len() - 1 {
                let y = self.target[order[pos]];
                left_sum += y;
                left_sq += y * y;

                let here = self.rows[order[pos]][feature];
                let next = self.rows[order[pos + 1]][feature];
                if (next - here).abs() <= 1e-12 {
                    continue;
                }

                let n_left = (pos + 1) as f64;
                let n_right = n - n_left;
                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left)
                    + (right_sq - right_sum * right_sum / n_right);
                let gain = parent_sse - sse;

                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }
        best
    }
}

impl Regressor for ForestRegressor {
    type Fitted = FittedForest;

    fn fit(&self, rows: &[Vec<f64>], target: &[f64]) -> Result<Self::Fitted> {
        let width = check_training_data(rows, target)?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut builder = TreeBuilder {
            rows,
            target,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            gains: vec![0.0; width],
        };

        let trees: Vec<TreeNode> = (0..self.n_trees)
            .map(|_| {
                let sample: Vec<usize> = (0..rows.len()).map(|_| rng.gen_range(0..rows.len())).collect();
                builder.build(sample, 0)
            })
            .collect();

        debug!(trees = self.n_trees, rows = rows.len(), "fitted forest");
        Ok(FittedForest {
            name: self.name.clone(),
            trees,
            importances: normalize(builder.gains),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl FittedRegressor for FittedForest {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, ((i * 7) % 5) as f64]).collect();
        let target = rows.iter().map(|r| if r[0] < 20.0 { 10.0 } else { 50.0 }).collect();
        (rows, target)
    }

    #[test]
    fn test_learns_a_step() {
        let (rows, target) = step_data();
        let model = ForestRegressor::new(20, 7).fit(&rows, &target).unwrap();
        assert_eq!(model.n_trees(), 20);
        assert_relative_eq!(model.predict_row(&[2.0, 0.0]), 10.0, epsilon = 1e-9);
        assert_relative_eq!(model.predict_row(&[38.0, 0.0]), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_importance_favours_the_informative_feature() {
        let (rows, target) = step_data();
        let model = ForestRegressor::new(10, 1).fit(&rows, &target).unwrap();
        let imp = model.feature_importances();
        assert!(imp[0] > 0.9);
        assert_relative_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let target: Vec<f64> = (0..30).map(|i| ((i * 13) % 11) as f64).collect();
        let a = ForestRegressor::new(5, 3).fit(&rows, &target).unwrap();
        let b = ForestRegressor::new(5, 3).fit(&rows, &target).unwrap();
        assert_eq!(a.predict(&rows), b.predict(&rows));
    }

    #[test]
    fn test_depth_zero_predicts_a_bootstrap_mean() {
        let (rows, target) = step_data();
        let model = ForestRegressor::new(1, 0)
            .with_max_depth(Some(0))
            .fit(&rows, &target)
            .unwrap();
        let p = model.predict_row(&[0.0, 0.0]);
        assert!((10.0..=50.0).contains(&p));
        assert!(model.feature_importances().iter().all(|w| *w == 0.0));
    }
}
