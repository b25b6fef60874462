//! Multivariate Isolation Forest anomaly scoring (§4.5).
//!
//! An ensemble of random binary trees, each built over a random subsample,
//! used to score a feature vector's "isolation" relative to a fitted
//! population. Fitting is offline (invoked on demand, e.g. periodically per
//! station); scoring is online and cheap (tree count × height × features).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_MASCHERONI: f64 = 0.5772156649;

/// `c(n)`: average path length of an unsuccessful search in a BST of `n`
/// nodes, used to normalize raw path lengths into `[0, 1]` scores.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// One randomized binary tree built over a subsample of feature vectors.
#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build(sample: &[Vec<f64>], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
        if sample.len() <= 1 || depth >= height_limit {
            return Node::Leaf { size: sample.len() };
        }

        let num_features = sample[0].len();
        if num_features == 0 {
            return Node::Leaf { size: sample.len() };
        }

        let feature = rng.gen_range(0..num_features);
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for row in sample {
            let v = row[feature];
            min = min.min(v);
            max = max.max(v);
        }

        if (max - min).abs() < f64::EPSILON {
            // min == max: this feature cannot split the sample further (§4.5 edge case).
            return Node::Leaf { size: sample.len() };
        }

        let split = rng.gen_range(min..max);
        let (left, right): (Vec<_>, Vec<_>) =
            sample.iter().cloned().partition(|row| row[feature] < split);

        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size: sample.len() };
        }

        Node::Internal {
            feature,
            split,
            left: Box::new(Self::build(&left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build(&right, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        fn walk(node: &Node, point: &[f64], depth: usize) -> f64 {
            match node {
                Node::Leaf { size } => depth as f64 + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    if point[*feature] < *split {
                        walk(left, point, depth + 1)
                    } else {
                        walk(right, point, depth + 1)
                    }
                }
            }
        }
        walk(&self.root, point, 0)
    }
}

/// Configuration for fitting a forest (mirrors `AnalyticsConfig::isolation_forest`).
#[derive(Debug, Clone, Copy)]
pub struct IsolationForestConfig {
    pub sample_size: usize,
    pub contamination: f64,
    pub num_trees: usize,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            sample_size: 256,
            contamination: 0.05,
            num_trees: 100,
        }
    }
}

/// A fitted ensemble: the trees plus the score threshold derived from the
/// fit set's `(1 - contamination)` percentile.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Fit an ensemble over `data` (each inner `Vec<f64>` a feature vector
    /// of equal length across rows). Deterministic given `seed`.
    pub fn fit(data: &[Vec<f64>], config: IsolationForestConfig, seed: u64) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        let sample_size = config.sample_size.min(data.len()).max(1);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees: Vec<IsolationTree> = (0..config.num_trees)
            .map(|_| {
                let subsample: Vec<Vec<f64>> = if sample_size >= data.len() {
                    data.to_vec()
                } else {
                    (0..sample_size)
                        .map(|_| data[rng.gen_range(0..data.len())].clone())
                        .collect()
                };
                IsolationTree {
                    root: IsolationTree::build(&subsample, 0, height_limit.max(1), &mut rng),
                }
            })
            .collect();

        let forest = Self {
            trees,
            sample_size,
            threshold: 0.0,
        };

        let mut scores: Vec<f64> = data.iter().map(|row| forest.raw_score(row)).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((1.0 - config.contamination) * scores.len() as f64) as usize;
        let threshold = scores[idx.min(scores.len() - 1)];

        Some(Self { threshold, ..forest })
    }

    fn raw_score(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_path: f64 =
            self.trees.iter().map(|t| t.path_length(point)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.0;
        }
        2f64.powf(-mean_path / c)
    }

    /// Normalized anomaly score in `[0, 1]`; higher is more anomalous.
    pub fn score(&self, point: &[f64]) -> f64 {
        self.raw_score(point)
    }

    /// Whether `point`'s score exceeds the fit-set threshold.
    pub fn is_anomaly(&self, point: &[f64]) -> bool {
        self.raw_score(point) >= self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal_cluster(n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| vec![rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
            .collect()
    }

    #[test]
    fn outlier_scores_higher_than_inlier() {
        let mut data = normal_cluster(300, 7);
        let forest = {
            // fit on the cluster alone so the threshold reflects normal spread
            let cfg = IsolationForestConfig {
                sample_size: 128,
                contamination: 0.05,
                num_trees: 50,
            };
            IsolationForest::fit(&data, cfg, 42).unwrap()
        };
        let inlier_score = forest.score(&[0.0, 0.0]);
        let outlier_score = forest.score(&[50.0, 50.0]);
        assert!(outlier_score > inlier_score);
        data.push(vec![50.0, 50.0]);
    }

    #[test]
    fn single_sample_has_depth_only_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert!(average_path_length(256) > 0.0);
    }

    #[test]
    fn fit_is_deterministic_given_seed() {
        let data = normal_cluster(100, 3);
        let cfg = IsolationForestConfig {
            sample_size: 64,
            contamination: 0.1,
            num_trees: 20,
        };
        let f1 = IsolationForest::fit(&data, cfg, 99).unwrap();
        let f2 = IsolationForest::fit(&data, cfg, 99).unwrap();
        assert_eq!(f1.score(&[0.5, 0.5]), f2.score(&[0.5, 0.5]));
    }
}
