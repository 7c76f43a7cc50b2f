use crate::error::{AppError, Result};
use crate::metrics::{MODEL_CLASSES, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS};
use crate::ml::artifact::ModelArtifact;
use crate::ml::classifier::Classifier;
use crate::ml::encoding::{Transformer, CATEGORICAL_STAGE, NUMERIC_STAGE};
use crate::ml::models::{CasePrediction, FeatureRow, ModelMetadata};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use validator::Validate;

/// Body of a prediction request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PredictRequest {
    #[validate(required)]
    pub idade: Option<f64>,

    #[validate(required)]
    pub etnia: Option<String>,

    #[validate(required)]
    pub localizacao: Option<String>,
}

impl PredictRequest {
    /// Parse a JSON body; wrong types and missing fields are both client errors
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("invalid prediction request: {}", e)))
    }

    /// Check required fields and build the feature row
    pub fn into_feature_row(self) -> Result<FeatureRow> {
        self.validate()?;
        match (self.idade, self.etnia, self.localizacao) {
            (Some(age), Some(ethnicity), Some(location)) => {
                Ok(FeatureRow::new(age, ethnicity, location))
            }
            _ => Err(AppError::Validation(
                "idade, etnia and localizacao are required".to_string(),
            )),
        }
    }
}

/// Read-only inference over a loaded model artifact
#[derive(Debug, Clone)]
pub struct InferenceService {
    artifact: Arc<ModelArtifact>,
}

impl InferenceService {
    /// Wrap an already-decoded artifact
    pub fn new(artifact: ModelArtifact) -> Self {
        MODEL_CLASSES.set(artifact.label_encoder.n_classes() as f64);
        Self {
            artifact: Arc::new(artifact),
        }
    }

    /// Load the artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ModelArtifact::load(path)?))
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.artifact.metadata
    }

    pub fn classes(&self) -> &[String] {
        self.artifact.label_encoder.classes()
    }

    /// Validate and score a raw request body
    pub fn predict_request(&self, request: PredictRequest) -> Result<CasePrediction> {
        let row = match request.into_feature_row() {
            Ok(row) => row,
            Err(e) => {
                PREDICTIONS_TOTAL.with_label_values(&["invalid_input"]).inc();
                return Err(e);
            }
        };
        self.predict(&row)
    }

    /// Predict the case type of a single victim/location row.
    ///
    /// Every known class appears in `probabilities`, rounded to 4 decimals.
    pub fn predict(&self, row: &FeatureRow) -> Result<CasePrediction> {
        let start = Instant::now();
        let result = self.score(row);
        PREDICTION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        let outcome = if result.is_ok() { "success" } else { "error" };
        PREDICTIONS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    fn score(&self, row: &FeatureRow) -> Result<CasePrediction> {
        let artifact = &self.artifact;
        let features = artifact.encoder.transform(std::slice::from_ref(row))?;

        let proba = artifact.classifier.predict_proba(&features)?;
        let predicted = artifact.classifier.predict(&features)?;

        let classes = artifact.label_encoder.classes();
        if proba.ncols() != classes.len() {
            return Err(AppError::Incompatible(format!(
                "classifier emits {} probabilities but {} classes are known",
                proba.ncols(),
                classes.len()
            )));
        }

        let class_id = predicted
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("classifier returned no prediction".to_string()))?;
        let predicted_class = artifact.label_encoder.decode(class_id)?.to_string();

        let probabilities = classes
            .iter()
            .zip(proba.row(0).iter())
            .map(|(class, &p)| (class.clone(), round4(p)))
            .collect();

        debug!(predicted_class = %predicted_class, "Prediction made");

        Ok(CasePrediction {
            predicted_class,
            probabilities,
        })
    }

    /// Gain importance per encoded feature.
    ///
    /// Names are the one-hot names of the `cat` stage followed by the `num`
    /// columns; any other pipeline shape is rejected.
    pub fn feature_importance(&self) -> Result<BTreeMap<String, f64>> {
        let artifact = &self.artifact;
        let encoder = &artifact.encoder;

        let (cat_index, cat_stage) = encoder
            .stage_index(CATEGORICAL_STAGE)
            .zip(encoder.stage(CATEGORICAL_STAGE))
            .ok_or_else(|| {
                AppError::Incompatible(format!("encoder has no '{}' stage", CATEGORICAL_STAGE))
            })?;
        let (num_index, num_stage) = encoder
            .stage_index(NUMERIC_STAGE)
            .zip(encoder.stage(NUMERIC_STAGE))
            .ok_or_else(|| {
                AppError::Incompatible(format!("encoder has no '{}' stage", NUMERIC_STAGE))
            })?;

        if cat_index > num_index {
            return Err(AppError::Incompatible(format!(
                "'{}' stage must precede '{}' stage",
                CATEGORICAL_STAGE, NUMERIC_STAGE
            )));
        }

        let mut names = match &cat_stage.transformer {
            Transformer::OneHot(one_hot) => one_hot.feature_names_out(),
            _ => {
                return Err(AppError::Incompatible(format!(
                    "'{}' stage is not a one-hot encoder",
                    CATEGORICAL_STAGE
                )))
            }
        };
        match &num_stage.transformer {
            Transformer::Passthrough { columns } => names.extend(columns.iter().cloned()),
            _ => {
                return Err(AppError::Incompatible(format!(
                    "'{}' stage is not a passthrough",
                    NUMERIC_STAGE
                )))
            }
        }

        let importances = artifact.classifier.feature_importances().ok_or_else(|| {
            AppError::Incompatible("classifier does not expose feature importances".to_string())
        })?;

        if importances.len() != names.len() {
            return Err(AppError::Incompatible(format!(
                "{} importances for {} feature names",
                importances.len(),
                names.len()
            )));
        }

        Ok(names.into_iter().zip(importances).collect())
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
