/// Case-type classification
///
/// Training turns stored case documents into a feature matrix, fits a
/// one-hot/passthrough encoding pipeline and a gradient-boosted tree
/// ensemble, and writes everything to one versioned artifact. Inference
/// loads that artifact read-only and scores single requests.
pub mod artifact;
pub mod classifier;
pub mod encoding;
pub mod features;
pub mod models;
pub mod service;
pub mod training;

pub use artifact::{ArtifactError, ModelArtifact};
pub use classifier::{Classifier, GradientBoostingClassifier};
pub use encoding::{EncodingPipeline, LabelEncoder};
pub use features::{ExtractionReport, FeatureExtractor, SkipReason, SkippedRecord};
pub use models::{BoostingParams, CasePrediction, FeatureRow, ModelMetadata, ModelMetrics};
pub use service::{InferenceService, PredictRequest};
pub use training::{run_training, train_model, TrainingOutcome};
