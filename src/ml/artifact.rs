//! Versioned, self-describing container for a trained model.
//!
//! On disk the artifact is a JSON object:
//!
//! ```json
//! {
//!   "format": "forensic-case-model",
//!   "schema_version": 1,
//!   "encoder": { ... },
//!   "classifier": { ... },
//!   "label_encoder": { ... },
//!   "metadata": { ... }
//! }
//! ```
//!
//! Decoding checks the header, then each member by name, so a missing or
//! malformed member is reported as exactly that.

use crate::ml::classifier::{Classifier, GradientBoostingClassifier};
use crate::ml::encoding::{EncodingPipeline, LabelEncoder, Transformer};
use crate::ml::models::ModelMetadata;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Format tag written into every artifact
pub const ARTIFACT_FORMAT: &str = "forensic-case-model";

/// Current artifact schema version
pub const ARTIFACT_SCHEMA_VERSION: u64 = 1;

const MEMBER_ENCODER: &str = "encoder";
const MEMBER_CLASSIFIER: &str = "classifier";
const MEMBER_LABEL_ENCODER: &str = "label_encoder";
const MEMBER_METADATA: &str = "metadata";

/// Why an artifact could not be written or read
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("cannot access model artifact at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("file is not a forensic-case-model artifact")]
    NotAnArtifact,

    #[error("unsupported artifact schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u64, expected: u64 },

    #[error("model artifact is missing member '{0}'")]
    MissingMember(&'static str),

    #[error("model artifact member '{member}' is malformed: {source}")]
    InvalidMember {
        member: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("model artifact is inconsistent: {0}")]
    Inconsistent(String),

    #[error("cannot encode model artifact: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encoding pipeline, classifier and label encoder fitted together
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub encoder: EncodingPipeline,
    pub classifier: GradientBoostingClassifier,
    pub label_encoder: LabelEncoder,
    pub metadata: ModelMetadata,
}

impl ModelArtifact {
    /// Render the versioned container
    pub fn to_json(&self) -> Result<Value, ArtifactError> {
        let mut object = Map::new();
        object.insert("format".to_string(), Value::from(ARTIFACT_FORMAT));
        object.insert(
            "schema_version".to_string(),
            Value::from(ARTIFACT_SCHEMA_VERSION),
        );
        object.insert(MEMBER_ENCODER.to_string(), encode_member(&self.encoder)?);
        object.insert(MEMBER_CLASSIFIER.to_string(), encode_member(&self.classifier)?);
        object.insert(
            MEMBER_LABEL_ENCODER.to_string(),
            encode_member(&self.label_encoder)?,
        );
        object.insert(MEMBER_METADATA.to_string(), encode_member(&self.metadata)?);
        Ok(Value::Object(object))
    }

    /// Decode a container produced by [`ModelArtifact::to_json`]
    pub fn from_json(value: Value) -> Result<Self, ArtifactError> {
        let Value::Object(mut object) = value else {
            return Err(ArtifactError::NotAnArtifact);
        };

        if object.get("format").and_then(Value::as_str) != Some(ARTIFACT_FORMAT) {
            return Err(ArtifactError::NotAnArtifact);
        }
        let version = object
            .get("schema_version")
            .and_then(Value::as_u64)
            .ok_or(ArtifactError::MissingMember("schema_version"))?;
        if version != ARTIFACT_SCHEMA_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: version,
                expected: ARTIFACT_SCHEMA_VERSION,
            });
        }

        let encoder: EncodingPipeline = take_member(&mut object, MEMBER_ENCODER)?;
        let classifier: GradientBoostingClassifier =
            take_member(&mut object, MEMBER_CLASSIFIER)?;
        let label_encoder: LabelEncoder = take_member(&mut object, MEMBER_LABEL_ENCODER)?;
        let metadata: ModelMetadata = take_member(&mut object, MEMBER_METADATA)?;

        let artifact = Self {
            encoder,
            classifier,
            label_encoder,
            metadata,
        };
        artifact.check_consistency()?;
        Ok(artifact)
    }

    /// Members must agree on class count and feature width
    fn check_consistency(&self) -> Result<(), ArtifactError> {
        if !self.encoder.is_fitted() {
            return Err(ArtifactError::Inconsistent(
                "encoding pipeline was never fitted".to_string(),
            ));
        }
        for stage in self.encoder.stages() {
            if let Transformer::OneHot(one_hot) = &stage.transformer {
                for vocabulary in one_hot.vocabularies() {
                    if !is_sorted_distinct(&vocabulary.categories) {
                        return Err(ArtifactError::Inconsistent(format!(
                            "categories of '{}' are not sorted and distinct",
                            vocabulary.column
                        )));
                    }
                }
            }
        }
        if !is_sorted_distinct(self.label_encoder.classes()) {
            return Err(ArtifactError::Inconsistent(
                "label classes are not sorted and distinct".to_string(),
            ));
        }
        self.classifier
            .validate()
            .map_err(|e| ArtifactError::Inconsistent(e.to_string()))?;
        if self.classifier.n_classes() != self.label_encoder.n_classes() {
            return Err(ArtifactError::Inconsistent(format!(
                "classifier predicts {} classes but label encoder knows {}",
                self.classifier.n_classes(),
                self.label_encoder.n_classes()
            )));
        }
        if self.classifier.n_features() != self.encoder.n_features_out() {
            return Err(ArtifactError::Inconsistent(format!(
                "classifier expects {} features but encoder produces {}",
                self.classifier.n_features(),
                self.encoder.n_features_out()
            )));
        }
        Ok(())
    }

    /// Write the artifact, replacing any file already at `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec(&self.to_json()?).map_err(ArtifactError::Encode)?;
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, bytes).map_err(io_err)?;
        std::fs::rename(&staging, path).map_err(io_err)?;

        tracing::info!(path = %path.display(), classes = self.label_encoder.n_classes(), "Model artifact saved");
        Ok(())
    }

    /// Read and decode the artifact at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_slice(&bytes).map_err(ArtifactError::Corrupt)?;
        let artifact = Self::from_json(value)?;

        tracing::info!(
            path = %path.display(),
            classes = ?artifact.label_encoder.classes(),
            features = artifact.encoder.n_features_out(),
            trained_at = %artifact.metadata.trained_at,
            "Model artifact loaded"
        );
        Ok(artifact)
    }
}

/// Encoders look categories up by binary search
fn is_sorted_distinct(values: &[String]) -> bool {
    values.windows(2).all(|pair| pair[0] < pair[1])
}

fn encode_member<T: Serialize>(member: &T) -> Result<Value, ArtifactError> {
    serde_json::to_value(member).map_err(ArtifactError::Encode)
}

fn take_member<T: DeserializeOwned>(
    object: &mut Map<String, Value>,
    member: &'static str,
) -> Result<T, ArtifactError> {
    let value = object
        .remove(member)
        .ok_or(ArtifactError::MissingMember(member))?;
    serde_json::from_value(value).map_err(|source| ArtifactError::InvalidMember { member, source })
}
