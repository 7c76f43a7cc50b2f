use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Victim demographics attached to a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Victim {
    /// Self-declared ethnicity
    #[serde(rename = "etnia")]
    pub ethnicity: String,

    /// Age in years
    #[serde(rename = "idade")]
    pub age: i64,
}

/// A forensic case document as stored in the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// ISO-8601 date of the case, also used as the lookup key
    #[serde(rename = "data_do_caso")]
    pub case_date: String,

    /// Case type, the classifier's target
    #[serde(rename = "tipo_do_caso")]
    pub case_type: String,

    /// Where the case happened
    #[serde(rename = "localizacao")]
    pub location: String,

    #[serde(rename = "vitima")]
    pub victim: Victim,
}

impl CaseRecord {
    pub fn new(
        case_date: impl Into<String>,
        case_type: impl Into<String>,
        location: impl Into<String>,
        ethnicity: impl Into<String>,
        age: i64,
    ) -> Self {
        Self {
            case_date: case_date.into(),
            case_type: case_type.into(),
            location: location.into(),
            victim: Victim {
                ethnicity: ethnicity.into(),
                age,
            },
        }
    }

    /// Render the record as a store document
    pub fn to_document(&self) -> Value {
        serde_json::json!({
            "data_do_caso": self.case_date,
            "tipo_do_caso": self.case_type,
            "localizacao": self.location,
            "vitima": {
                "etnia": self.victim.ethnicity,
                "idade": self.victim.age,
            }
        })
    }
}

/// Why a case document was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseValidationError {
    #[error("case document must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("'{value}' is not an ISO-8601 date")]
    MalformedDate { value: String },
}

/// Validate a raw document and convert it into a typed [`CaseRecord`].
///
/// Reports the first problem found, checking the victim block first and then
/// the date, case type and location in that order.
pub fn validate_case(document: &Value) -> Result<CaseRecord, CaseValidationError> {
    let object = document
        .as_object()
        .ok_or(CaseValidationError::NotAnObject)?;

    let victim = object
        .get("vitima")
        .ok_or(CaseValidationError::MissingField("vitima"))?
        .as_object()
        .ok_or(CaseValidationError::WrongType {
            field: "vitima",
            expected: "an object",
        })?;

    let ethnicity = required_str(victim.get("etnia"), "vitima.etnia")?;
    let age = victim
        .get("idade")
        .filter(|v| !v.is_null())
        .ok_or(CaseValidationError::MissingField("vitima.idade"))?
        .as_i64()
        .ok_or(CaseValidationError::WrongType {
            field: "vitima.idade",
            expected: "an integer",
        })?;

    let case_date = required_str(object.get("data_do_caso"), "data_do_caso")?;
    if !is_iso_date(case_date) {
        return Err(CaseValidationError::MalformedDate {
            value: case_date.to_string(),
        });
    }

    let case_type = required_str(object.get("tipo_do_caso"), "tipo_do_caso")?;
    let location = required_str(object.get("localizacao"), "localizacao")?;

    Ok(CaseRecord::new(case_date, case_type, location, ethnicity, age))
}

fn required_str<'a>(
    value: Option<&'a Value>,
    field: &'static str,
) -> Result<&'a str, CaseValidationError> {
    value
        .filter(|v| !v.is_null())
        .ok_or(CaseValidationError::MissingField(field))?
        .as_str()
        .ok_or(CaseValidationError::WrongType {
            field,
            expected: "a string",
        })
}

/// Accepts a calendar date, a naive date-time or an RFC 3339 timestamp
pub fn is_iso_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}
