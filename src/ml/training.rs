use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::metrics::{TRAINING_RUNS_TOTAL, TRAINING_SKIPPED_RECORDS};
use crate::ml::artifact::ModelArtifact;
use crate::ml::classifier::{Classifier, GradientBoostingClassifier};
use crate::ml::encoding::{EncodingPipeline, LabelEncoder};
use crate::ml::features::{FeatureExtractor, SkippedRecord};
use crate::ml::models::{BoostingParams, ModelMetadata, ModelMetrics};
use crate::state::CaseStore;
use serde_json::Value;
use tracing::{error, info};

/// A freshly fitted artifact and the records that were left out
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub skipped: Vec<SkippedRecord>,
}

/// Fit encoder, label encoder and classifier on raw case documents
pub fn train_model(documents: &[Value], params: &BoostingParams) -> Result<TrainingOutcome> {
    let report = FeatureExtractor::new().extract(documents)?;

    let mut label_encoder = LabelEncoder::new();
    let labels = label_encoder.fit_transform(&report.labels)?;
    if label_encoder.n_classes() < 2 {
        return Err(AppError::Training(format!(
            "need at least 2 distinct case types, found only {:?}",
            label_encoder.classes()
        )));
    }

    let mut encoder = EncodingPipeline::new();
    let features = encoder.fit_transform(&report.rows)?;

    info!(
        samples = features.nrows(),
        features = features.ncols(),
        classes = ?label_encoder.classes(),
        "Fitting gradient boosting classifier"
    );

    let mut classifier = GradientBoostingClassifier::new(params.clone());
    classifier.fit(&features, &labels)?;

    let predictions = classifier.predict(&features)?;
    let training_metrics = ModelMetrics::compute(&labels, &predictions, label_encoder.classes());

    info!(
        accuracy = training_metrics.accuracy,
        "Classifier trained"
    );

    let metadata = ModelMetadata {
        trained_at: chrono::Utc::now(),
        n_training_samples: report.len(),
        n_skipped_records: report.skipped.len(),
        n_features: encoder.n_features_out(),
        classes: label_encoder.classes().to_vec(),
        training_metrics,
        hyperparameters: params.to_map(),
    };

    Ok(TrainingOutcome {
        artifact: ModelArtifact {
            encoder,
            classifier,
            label_encoder,
            metadata,
        },
        skipped: report.skipped,
    })
}

/// Read the whole store once, fit, and write the artifact
pub async fn run_training(store: &dyn CaseStore, config: &ModelConfig) -> Result<TrainingOutcome> {
    let documents = store.list_cases().await?;
    info!(documents = documents.len(), "Loaded case records for training");

    let outcome = match train_model(&documents, &config.boosting) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Training failed");
            TRAINING_RUNS_TOTAL.with_label_values(&["failed"]).inc();
            return Err(e);
        }
    };

    outcome.artifact.save(&config.artifact_path)?;

    TRAINING_RUNS_TOTAL.with_label_values(&["succeeded"]).inc();
    TRAINING_SKIPPED_RECORDS.inc_by(outcome.skipped.len() as f64);

    Ok(outcome)
}
