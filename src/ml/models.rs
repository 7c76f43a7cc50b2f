use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened classifier input derived from one case record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Victim age, passed through unscaled
    pub age: f64,

    /// Victim ethnicity (categorical)
    pub ethnicity: String,

    /// Case location (categorical)
    pub location: String,
}

impl FeatureRow {
    pub fn new(age: f64, ethnicity: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            age,
            ethnicity: ethnicity.into(),
            location: location.into(),
        }
    }

    /// Look up a categorical column by its wire name
    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            crate::ml::features::ETHNICITY => Some(&self.ethnicity),
            crate::ml::features::LOCATION => Some(&self.location),
            _ => None,
        }
    }

    /// Look up a numeric column by its wire name
    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            crate::ml::features::AGE => Some(self.age),
            _ => None,
        }
    }
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Number of boosting rounds (one tree per class per round)
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Shrinkage applied to every leaf weight
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Maximum tree depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Minimum hessian sum required in each child of a split
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,

    /// L2 regularization on leaf weights
    #[serde(default = "default_reg_lambda")]
    pub reg_lambda: f64,

    /// Minimum loss reduction required to split
    #[serde(default)]
    pub gamma: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_child_weight: default_min_child_weight(),
            reg_lambda: default_reg_lambda(),
            gamma: 0.0,
        }
    }
}

impl BoostingParams {
    /// Hyperparameters as strings, for artifact metadata
    pub fn to_map(&self) -> BTreeMap<String, String> {
        [
            ("n_estimators", self.n_estimators.to_string()),
            ("learning_rate", self.learning_rate.to_string()),
            ("max_depth", self.max_depth.to_string()),
            ("min_child_weight", self.min_child_weight.to_string()),
            ("reg_lambda", self.reg_lambda.to_string()),
            ("gamma", self.gamma.to_string()),
            ("objective", "multi:softprob".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

fn default_n_estimators() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.3
}

fn default_max_depth() -> usize {
    6
}

fn default_min_child_weight() -> f64 {
    1.0
}

fn default_reg_lambda() -> f64 {
    1.0
}

/// Model evaluation metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Per-class metrics keyed by class label
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    /// Compute accuracy and macro-averaged precision/recall/F1.
    ///
    /// `class_names[i]` names class id `i`.
    pub fn compute(y_true: &[usize], y_pred: &[usize], class_names: &[String]) -> Self {
        let n_samples = y_true.len();
        let n_classes = class_names.len();
        if n_samples == 0 || n_classes == 0 {
            return Self::default();
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();
        let accuracy = correct as f64 / n_samples as f64;

        let mut per_class = BTreeMap::new();
        for (class_idx, name) in class_names.iter().enumerate() {
            let tp = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **t == class_idx && **p == class_idx)
                .count();
            let fp = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **p == class_idx && **t != class_idx)
                .count();
            let fn_count = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **t == class_idx && **p != class_idx)
                .count();

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };
            let recall = if tp + fn_count > 0 {
                tp as f64 / (tp + fn_count) as f64
            } else {
                0.0
            };
            let f1_score = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            let support = y_true.iter().filter(|&&t| t == class_idx).count();

            per_class.insert(
                name.clone(),
                ClassMetrics {
                    precision,
                    recall,
                    f1_score,
                    support,
                },
            );
        }

        let n = n_classes as f64;
        Self {
            accuracy,
            precision: per_class.values().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.values().map(|m| m.recall).sum::<f64>() / n,
            f1_score: per_class.values().map(|m| m.f1_score).sum::<f64>() / n,
            per_class_metrics: per_class,
        }
    }
}

/// Provenance of a trained artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Records that made it into the training matrix
    pub n_training_samples: usize,

    /// Records dropped by the feature extractor
    pub n_skipped_records: usize,

    /// Width of the encoded feature vector
    pub n_features: usize,

    /// Class labels in id order
    pub classes: Vec<String>,

    /// Metrics measured on the training set itself
    pub training_metrics: ModelMetrics,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
}

/// Result of a single prediction, in wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasePrediction {
    /// Most probable case type
    #[serde(rename = "classe_predita")]
    pub predicted_class: String,

    /// Probability per known case type, rounded to 4 decimals
    #[serde(rename = "probabilidades")]
    pub probabilities: BTreeMap<String, f64>,
}
