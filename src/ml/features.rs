use crate::error::{AppError, Result};
use crate::ml::models::FeatureRow;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Wire name of the numeric age column
pub const AGE: &str = "idade";

/// Wire name of the ethnicity column
pub const ETHNICITY: &str = "etnia";

/// Wire name of the location column
pub const LOCATION: &str = "localizacao";

/// Categorical inputs, in the order their indicator blocks are laid out
pub const CATEGORICAL_FEATURES: [&str; 2] = [ETHNICITY, LOCATION];

/// Numeric inputs, appended after the categorical blocks
pub const NUMERIC_FEATURES: [&str; 1] = [AGE];

/// Why a record was left out of the training set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The document is not a JSON object
    NotAnObject,

    /// A required field is absent or null
    MissingField(&'static str),

    /// A required field holds the wrong JSON type
    WrongType(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAnObject => write!(f, "document is not an object"),
            SkipReason::MissingField(field) => write!(f, "missing field '{}'", field),
            SkipReason::WrongType(field) => write!(f, "field '{}' has the wrong type", field),
        }
    }
}

/// A record dropped during extraction
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position of the record in the input sequence
    pub index: usize,
    pub reason: SkipReason,
}

/// Feature rows and labels in input order, plus what was dropped
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub rows: Vec<FeatureRow>,
    pub labels: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
}

impl ExtractionReport {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flattens raw case documents into feature rows and case-type labels
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract one row per well-formed document.
    ///
    /// A malformed document is skipped with a warning; only an empty result is
    /// an error.
    pub fn extract(&self, documents: &[Value]) -> Result<ExtractionReport> {
        let mut report = ExtractionReport::default();

        for (index, document) in documents.iter().enumerate() {
            match Self::extract_one(document) {
                Ok((row, label)) => {
                    report.rows.push(row);
                    report.labels.push(label);
                }
                Err(reason) => {
                    warn!(record_index = index, reason = %reason, "Skipping malformed case record");
                    report.skipped.push(SkippedRecord { index, reason });
                }
            }
        }

        if report.is_empty() {
            return Err(AppError::Training(format!(
                "no valid case records among {} documents",
                documents.len()
            )));
        }

        info!(
            rows = report.len(),
            skipped = report.skipped.len(),
            "Extracted training rows"
        );
        debug!(sample = ?report.rows.first(), "First extracted row");

        Ok(report)
    }

    /// Flatten a single document into a feature row and its label
    pub fn extract_one(document: &Value) -> std::result::Result<(FeatureRow, String), SkipReason> {
        let object = document.as_object().ok_or(SkipReason::NotAnObject)?;

        let victim = present(object.get("vitima"), "vitima")?
            .as_object()
            .ok_or(SkipReason::WrongType("vitima"))?;

        let age = present(victim.get(AGE), "vitima.idade")?
            .as_f64()
            .ok_or(SkipReason::WrongType("vitima.idade"))?;
        let ethnicity = string_field(victim.get(ETHNICITY), "vitima.etnia")?;
        let location = string_field(object.get(LOCATION), "localizacao")?;
        let label = string_field(object.get("tipo_do_caso"), "tipo_do_caso")?;

        Ok((FeatureRow::new(age, ethnicity, location), label))
    }
}

fn present<'a>(
    value: Option<&'a Value>,
    field: &'static str,
) -> std::result::Result<&'a Value, SkipReason> {
    value
        .filter(|v| !v.is_null())
        .ok_or(SkipReason::MissingField(field))
}

fn string_field(
    value: Option<&Value>,
    field: &'static str,
) -> std::result::Result<String, SkipReason> {
    present(value, field)?
        .as_str()
        .map(str::to_string)
        .ok_or(SkipReason::WrongType(field))
}
