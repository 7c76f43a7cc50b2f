use crate::error::{AppError, Result};
use crate::ml::models::BoostingParams;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lower bound for per-sample hessians
const MIN_HESSIAN: f64 = 1e-16;

/// Smallest loss reduction accepted as a split
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Trait for multi-class classifiers over encoded feature matrices
pub trait Classifier: Send + Sync {
    /// Fit on `features` (n_samples × n_features) and dense class ids
    fn fit(&mut self, features: &Array2<f64>, labels: &[usize]) -> Result<()>;

    /// Most probable class id per row
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Class probabilities per row, one column per class id
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Normalised importance per input column, if the model has them
    fn feature_importances(&self) -> Option<Vec<f64>>;

    fn n_classes(&self) -> usize;

    fn n_features(&self) -> usize;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Node of a regression tree, stored in a flat arena rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Rows with `x[feature] < threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
        /// Loss reduction achieved by this split
        gain: f64,
        /// Hessian sum of the rows reaching this node
        cover: f64,
    },
    Leaf {
        /// Margin contribution, learning rate already applied
        weight: f64,
        cover: f64,
    },
}

/// A regression tree fitted to one class's gradients in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Margin contribution for one encoded row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { weight, .. } => return *weight,
            }
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Split { left, right, .. } => {
                    1 + depth_of(nodes, *left).max(depth_of(nodes, *right))
                }
                TreeNode::Leaf { .. } => 0,
            }
        }
        depth_of(&self.nodes, 0)
    }

    /// Check child links stay inside the arena
    fn is_well_formed(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                TreeNode::Split { left, right, .. } => {
                    *left > i && *right > i && *left < self.nodes.len() && *right < self.nodes.len()
                }
                TreeNode::Leaf { .. } => true,
            })
    }
}

/// Exact greedy tree grower over second-order gradient statistics
struct TreeGrower<'a> {
    features: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<TreeNode>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<'a> TreeGrower<'a> {
    fn grow(mut self, rows: &[usize]) -> RegressionTree {
        self.build(rows, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn build(&mut self, rows: &[usize], depth: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            weight: 0.0,
            cover: 0.0,
        });

        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();

        let split = if depth < self.params.max_depth && rows.len() > 1 {
            self.best_split(rows, g, h)
        } else {
            None
        };

        let node = match split {
            Some(candidate) => {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .iter()
                    .partition(|&&r| self.features[[r, candidate.feature]] < candidate.threshold);
                let left = self.build(&left_rows, depth + 1);
                let right = self.build(&right_rows, depth + 1);
                TreeNode::Split {
                    feature: candidate.feature,
                    threshold: candidate.threshold,
                    left,
                    right,
                    gain: candidate.gain,
                    cover: h,
                }
            }
            None => TreeNode::Leaf {
                weight: -g / (h + self.params.reg_lambda) * self.params.learning_rate,
                cover: h,
            },
        };
        self.nodes[index] = node;

        index
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent_score = self.score(g, h);
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..self.features.ncols() {
            let mut sorted: Vec<usize> = rows.to_vec();
            sorted.sort_by(|&a, &b| {
                self.features[[a, feature]].total_cmp(&self.features[[b, feature]])
            });

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for window in sorted.windows(2) {
                let (current, next) = (window[0], window[1]);
                g_left += self.grad[current];
                h_left += self.hess[current];

                let value = self.features[[current, feature]];
                let next_value = self.features[[next, feature]];
                if value >= next_value {
                    continue;
                }

                let g_right = g - g_left;
                let h_right = h - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight
                {
                    continue;
                }

                let gain = 0.5
                    * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent_score)
                    - self.params.gamma;
                if gain > MIN_SPLIT_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (value + next_value) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Multi-class gradient-boosted trees with a softmax log-loss objective.
///
/// Every boosting round fits one regression tree per class on the gradient
/// and hessian of the softmax cross-entropy, XGBoost style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: BoostingParams,
    n_classes: usize,
    n_features: usize,
    /// `rounds[r][k]` is the tree for class `k` in round `r`
    rounds: Vec<Vec<RegressionTree>>,
    trained: bool,
}

impl GradientBoostingClassifier {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            n_classes: 0,
            n_features: 0,
            rounds: Vec::new(),
            trained: false,
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn rounds(&self) -> &[Vec<RegressionTree>] {
        &self.rounds
    }

    /// Structural sanity check used when loading a persisted model
    pub fn validate(&self) -> Result<()> {
        if !self.trained {
            return Err(AppError::Incompatible("classifier is not trained".to_string()));
        }
        if self.n_classes < 2 {
            return Err(AppError::Incompatible(format!(
                "classifier has {} classes",
                self.n_classes
            )));
        }
        for trees in &self.rounds {
            if trees.len() != self.n_classes {
                return Err(AppError::Incompatible(format!(
                    "boosting round holds {} trees for {} classes",
                    trees.len(),
                    self.n_classes
                )));
            }
            for tree in trees {
                if !tree.is_well_formed() {
                    return Err(AppError::Incompatible("malformed regression tree".to_string()));
                }
                let out_of_range = tree.nodes.iter().any(|node| {
                    matches!(node, TreeNode::Split { feature, .. } if *feature >= self.n_features)
                });
                if out_of_range {
                    return Err(AppError::Incompatible(
                        "tree splits on a feature outside the model width".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Raw additive scores, one column per class
    fn margins(&self, features: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut margins = Array2::zeros((features.nrows(), self.n_classes));
        for (i, row) in features.axis_iter(Axis(0)).enumerate() {
            for trees in &self.rounds {
                for (k, tree) in trees.iter().enumerate() {
                    margins[[i, k]] += tree.predict_row(row);
                }
            }
        }
        margins
    }

    fn check_width(&self, features: &Array2<f64>) -> Result<()> {
        if !self.trained {
            return Err(AppError::Internal("Model not trained".to_string()));
        }
        if features.ncols() != self.n_features {
            return Err(AppError::Incompatible(format!(
                "expected {} features, got {}",
                self.n_features,
                features.ncols()
            )));
        }
        Ok(())
    }
}

/// Row-wise softmax, shifted by the row max for stability
fn softmax_rows(margins: &mut Array2<f64>) {
    for mut row in margins.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|m| (m - max).exp());
        let sum: f64 = row.sum();
        row.mapv_inplace(|e| e / sum);
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, features: &Array2<f64>, labels: &[usize]) -> Result<()> {
        let n_samples = features.nrows();
        if n_samples == 0 {
            return Err(AppError::Training(
                "cannot train on an empty feature matrix".to_string(),
            ));
        }
        if labels.len() != n_samples {
            return Err(AppError::Training(format!(
                "{} labels for {} samples",
                labels.len(),
                n_samples
            )));
        }

        let distinct: BTreeSet<usize> = labels.iter().copied().collect();
        if distinct.len() < 2 {
            return Err(AppError::Training(format!(
                "need at least 2 distinct case types, found {}",
                distinct.len()
            )));
        }

        self.n_classes = distinct.iter().max().map_or(0, |&m| m + 1);
        self.n_features = features.ncols();
        self.rounds = Vec::with_capacity(self.params.n_estimators);

        let rows: Vec<usize> = (0..n_samples).collect();
        let mut margins = Array2::<f64>::zeros((n_samples, self.n_classes));
        let mut grad = vec![0.0; n_samples];
        let mut hess = vec![0.0; n_samples];

        for _ in 0..self.params.n_estimators {
            let mut probabilities = margins.clone();
            softmax_rows(&mut probabilities);

            let mut trees = Vec::with_capacity(self.n_classes);
            for k in 0..self.n_classes {
                for i in 0..n_samples {
                    let p = probabilities[[i, k]];
                    let target = if labels[i] == k { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (2.0 * p * (1.0 - p)).max(MIN_HESSIAN);
                }

                let tree = TreeGrower {
                    features: features.view(),
                    grad: &grad,
                    hess: &hess,
                    params: &self.params,
                    nodes: Vec::new(),
                }
                .grow(&rows);

                for (i, row) in features.axis_iter(Axis(0)).enumerate() {
                    margins[[i, k]] += tree.predict_row(row);
                }
                trees.push(tree);
            }
            self.rounds.push(trees);
        }

        self.trained = true;

        tracing::debug!(
            rounds = self.rounds.len(),
            classes = self.n_classes,
            features = self.n_features,
            "Gradient boosting fit complete"
        );

        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &p)| {
                        if p > best.1 {
                            (k, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(features)?;
        let mut proba = self.margins(features.view());
        softmax_rows(&mut proba);
        Ok(proba)
    }

    /// Average split gain per feature, normalised to sum to 1
    fn feature_importances(&self) -> Option<Vec<f64>> {
        if !self.trained {
            return None;
        }

        let mut total_gain = vec![0.0; self.n_features];
        let mut splits = vec![0usize; self.n_features];
        for tree in self.rounds.iter().flatten() {
            for node in &tree.nodes {
                if let TreeNode::Split { feature, gain, .. } = node {
                    total_gain[*feature] += gain;
                    splits[*feature] += 1;
                }
            }
        }

        let average: Vec<f64> = total_gain
            .iter()
            .zip(&splits)
            .map(|(&g, &n)| if n > 0 { g / n as f64 } else { 0.0 })
            .collect();
        let sum: f64 = average.iter().sum();
        if sum <= 0.0 {
            return Some(average);
        }
        Some(average.into_iter().map(|a| a / sum).collect())
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}
