//! Random forest regression: bootstrapped CART trees with variance-reduction splits.

use crate::models::error::ModelError;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows trees until the other stopping rules apply.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(20),
            min_samples_split: 5,
            min_samples_leaf: 3,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree stored as a flat node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Number of rows (in sorted order) going left.
    left_len: usize,
    sse: f64,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], mut rows: Vec<usize>, params: &ForestParams) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(x, y, &mut rows, 0, params);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        rows: &mut [usize],
        depth: usize,
        params: &ForestParams,
    ) -> usize {
        let id = self.nodes.len();
        let value = mean(rows.iter().map(|&r| y[r]));
        self.nodes.push(Node::Leaf { value });

        let too_deep = params.max_depth.is_some_and(|max| depth >= max);
        if too_deep
            || rows.len() < params.min_samples_split.max(2)
            || rows.len() < 2 * params.min_samples_leaf.max(1)
        {
            return id;
        }
        let Some(best) = best_split(x, y, rows, params.min_samples_leaf.max(1)) else {
            return id;
        };

        rows.sort_by(|&a, &b| x[a][best.feature].total_cmp(&x[b][best.feature]));
        let (left_rows, right_rows) = rows.split_at_mut(best.left_len);
        let left = self.grow(x, y, left_rows, depth + 1, params);
        let right = self.grow(x, y, right_rows, depth + 1, params);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return f64::NAN,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Exhaustive search over every feature and threshold, scoring by summed squared error.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    rows: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| y[r] * y[r]).sum();
    let parent_sse = total_sq - total * total / n as f64;
    if parent_sse <= 1e-12 {
        return None;
    }

    let n_features = x.get(rows[0]).map_or(0, Vec::len);
    let mut best: Option<SplitCandidate> = None;
    let mut order = rows.to_vec();
    for feature in 0..n_features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..n {
            let yk = y[order[k - 1]];
            left_sum += yk;
            left_sq += yk * yk;
            if k < min_leaf || n - k < min_leaf {
                continue;
            }
            let lo = x[order[k - 1]][feature];
            let hi = x[order[k]][feature];
            if lo >= hi {
                continue;
            }
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / k as f64)
                + (right_sq - right_sum * right_sum / (n - k) as f64);
            if best.as_ref().map_or(true, |b| sse < b.sse) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: lo + (hi - lo) / 2.0,
                    left_len: k,
                    sse,
                });
            }
        }
    }
    best.filter(|b| b.sse < parent_sse)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// An ensemble of [`RegressionTree`]s whose prediction is the mean tree prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    feature_names: Vec<String>,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Trains `params.n_estimators` trees in parallel.
    ///
    /// Tree `i` draws its bootstrap sample from a generator seeded with `seed + i`, so a
    /// fit is reproducible regardless of thread scheduling.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        feature_names: Vec<String>,
        params: ForestParams,
    ) -> Result<Self, ModelError> {
        if x.is_empty() || y.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        if let Some(bad) = x.iter().find(|row| row.len() != feature_names.len()) {
            return Err(ModelError::DimensionMismatch {
                expected: feature_names.len(),
                found: bad.len(),
            });
        }

        let n = x.len();
        let trees: Vec<RegressionTree> = (0..params.n_estimators.max(1))
            .into_par_iter()
            .map(|i| {
                let rows: Vec<usize> = if params.bootstrap {
                    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, rows, &params)
            })
            .collect();
        debug!(
            "Fitted forest of {} trees on {} rows x {} features",
            trees.len(),
            n,
            feature_names.len()
        );
        Ok(RandomForest {
            params,
            feature_names,
            trees,
        })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn predict_row(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.feature_names.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.feature_names.len(),
                found: row.len(),
            });
        }
        Ok(mean(self.trees.iter().map(|t| t.predict_row(row))))
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = (0..60).map(|i| if i < 30 { 10.0 } else { 50.0 }).collect();
        (x, y)
    }

    fn names() -> Vec<String> {
        vec!["t".to_string(), "noise".to_string()]
    }

    #[test]
    fn test_learns_step_function() -> Result<(), ModelError> {
        let (x, y) = step_data();
        let forest = RandomForest::fit(&x, &y, names(), ForestParams::default())?;
        assert_eq!(forest.trees().len(), 100);
        assert!((forest.predict_row(&[5.0, 5.0])? - 10.0).abs() < 2.0);
        assert!((forest.predict_row(&[55.0, 6.0])? - 50.0).abs() < 2.0);
        Ok(())
    }

    #[test]
    fn test_same_seed_same_forest() -> Result<(), ModelError> {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 8,
            ..Default::default()
        };
        let a = RandomForest::fit(&x, &y, names(), params)?;
        let b = RandomForest::fit(&x, &y, names(), params)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_depth_zero_predicts_mean() -> Result<(), ModelError> {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 1,
            max_depth: Some(0),
            bootstrap: false,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, names(), params)?;
        assert_eq!(forest.trees()[0].node_count(), 1);
        assert!((forest.predict_row(&[0.0, 0.0])? - 30.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_leaves_respect_min_samples_leaf() -> Result<(), ModelError> {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let y = vec![0.0, 0.0, 0.0, 0.0, 0.0, 100.0];
        let params = ForestParams {
            n_estimators: 1,
            bootstrap: false,
            min_samples_split: 2,
            min_samples_leaf: 3,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, vec!["x".to_string()], params)?;
        // The outlier cannot be isolated, so it is averaged with two neighbours.
        assert!((forest.predict_row(&[5.0])? - 100.0 / 3.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_input_validation() {
        assert!(matches!(
            RandomForest::fit(&[], &[], vec![], ForestParams::default()),
            Err(ModelError::EmptyTrainingSet)
        ));
        let (x, y) = step_data();
        assert!(matches!(
            RandomForest::fit(&x, &y[..10], names(), ForestParams::default()),
            Err(ModelError::DimensionMismatch { .. })
        ));
        let forest = RandomForest::fit(
            &x,
            &y,
            names(),
            ForestParams {
                n_estimators: 2,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(forest.predict_row(&[1.0]).is_err());
    }
}
