//! Feature and label encoders.
//!
//! The encoding pipeline turns [`FeatureRow`]s into a fixed-width numeric
//! matrix: one indicator column per (categorical column, fitted category),
//! followed by the numeric columns unchanged. Column order and vocabulary are
//! fixed by `fit` and travel with the model artifact.

use crate::error::{AppError, Result};
use crate::ml::features::{CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use crate::ml::models::FeatureRow;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name of the one-hot stage
pub const CATEGORICAL_STAGE: &str = "cat";

/// Name of the passthrough stage
pub const NUMERIC_STAGE: &str = "num";

/// Fitted vocabulary of one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub column: String,

    /// Sorted, distinct categories seen at fit time
    pub categories: Vec<String>,
}

/// One-hot encoder that ignores categories it has not seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    vocabularies: Vec<CategoryVocabulary>,
}

impl OneHotEncoder {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            vocabularies: columns
                .iter()
                .map(|c| CategoryVocabulary {
                    column: c.to_string(),
                    categories: Vec::new(),
                })
                .collect(),
        }
    }

    fn fit(&mut self, rows: &[FeatureRow]) -> Result<()> {
        for vocabulary in &mut self.vocabularies {
            let mut seen = BTreeSet::new();
            for row in rows {
                seen.insert(categorical_value(row, &vocabulary.column)?.to_string());
            }
            vocabulary.categories = seen.into_iter().collect();
        }
        Ok(())
    }

    /// Write the indicator block for `row` into `out`
    fn encode_into(&self, row: &FeatureRow, out: &mut [f64]) -> Result<()> {
        let mut offset = 0;
        for vocabulary in &self.vocabularies {
            let value = categorical_value(row, &vocabulary.column)?;
            if let Ok(position) = vocabulary
                .categories
                .binary_search_by(|c| c.as_str().cmp(value))
            {
                out[offset + position] = 1.0;
            }
            offset += vocabulary.categories.len();
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.vocabularies.iter().map(|v| v.categories.len()).sum()
    }

    pub fn vocabularies(&self) -> &[CategoryVocabulary] {
        &self.vocabularies
    }

    /// `<column>_<category>` for every indicator column, in layout order
    pub fn feature_names_out(&self) -> Vec<String> {
        self.vocabularies
            .iter()
            .flat_map(|v| {
                v.categories
                    .iter()
                    .map(move |category| format!("{}_{}", v.column, category))
            })
            .collect()
    }
}

/// What a pipeline stage does to its columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformer {
    OneHot(OneHotEncoder),
    Passthrough { columns: Vec<String> },
}

impl Transformer {
    fn width(&self) -> usize {
        match self {
            Transformer::OneHot(encoder) => encoder.width(),
            Transformer::Passthrough { columns } => columns.len(),
        }
    }

    fn feature_names_out(&self) -> Vec<String> {
        match self {
            Transformer::OneHot(encoder) => encoder.feature_names_out(),
            Transformer::Passthrough { columns } => columns.clone(),
        }
    }
}

/// A named step of the encoding pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    pub transformer: Transformer,
}

/// Column transformer applied identically at training and inference time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingPipeline {
    stages: Vec<PipelineStage>,
    fitted: bool,
}

impl Default for EncodingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodingPipeline {
    /// One-hot `etnia` and `localizacao`, then pass `idade` through
    pub fn new() -> Self {
        Self {
            stages: vec![
                PipelineStage {
                    name: CATEGORICAL_STAGE.to_string(),
                    transformer: Transformer::OneHot(OneHotEncoder::new(&CATEGORICAL_FEATURES)),
                },
                PipelineStage {
                    name: NUMERIC_STAGE.to_string(),
                    transformer: Transformer::Passthrough {
                        columns: NUMERIC_FEATURES.iter().map(|c| c.to_string()).collect(),
                    },
                },
            ],
            fitted: false,
        }
    }

    /// Learn the categorical vocabularies
    pub fn fit(&mut self, rows: &[FeatureRow]) -> Result<()> {
        if rows.is_empty() {
            return Err(AppError::Training(
                "cannot fit encoding pipeline on zero rows".to_string(),
            ));
        }

        for stage in &mut self.stages {
            if let Transformer::OneHot(encoder) = &mut stage.transformer {
                encoder.fit(rows)?;
            }
        }
        self.fitted = true;

        tracing::debug!(width = self.n_features_out(), "Encoding pipeline fitted");
        Ok(())
    }

    /// Encode rows into an `n_rows × n_features_out` matrix
    pub fn transform(&self, rows: &[FeatureRow]) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(AppError::Internal(
                "Encoding pipeline not fitted".to_string(),
            ));
        }

        let width = self.n_features_out();
        let mut matrix = Array2::zeros((rows.len(), width));

        for (i, row) in rows.iter().enumerate() {
            let mut out = vec![0.0; width];
            let mut offset = 0;
            for stage in &self.stages {
                let stage_width = stage.transformer.width();
                let block = &mut out[offset..offset + stage_width];
                match &stage.transformer {
                    Transformer::OneHot(encoder) => encoder.encode_into(row, block)?,
                    Transformer::Passthrough { columns } => {
                        for (slot, column) in block.iter_mut().zip(columns) {
                            *slot = row.numeric(column).ok_or_else(|| {
                                AppError::Incompatible(format!(
                                    "unknown numeric column '{}'",
                                    column
                                ))
                            })?;
                        }
                    }
                }
                offset += stage_width;
            }
            for (j, value) in out.into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }

        Ok(matrix)
    }

    pub fn fit_transform(&mut self, rows: &[FeatureRow]) -> Result<Array2<f64>> {
        self.fit(rows)?;
        self.transform(rows)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn n_features_out(&self) -> usize {
        self.stages.iter().map(|s| s.transformer.width()).sum()
    }

    /// Names of every output column, in layout order
    pub fn feature_names_out(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|s| s.transformer.feature_names_out())
            .collect()
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Position of a stage in the layout
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }
}

fn categorical_value<'a>(row: &'a FeatureRow, column: &str) -> Result<&'a str> {
    row.categorical(column).ok_or_else(|| {
        AppError::Incompatible(format!("unknown categorical column '{}'", column))
    })
}

/// Bijective mapping between case-type labels and dense class ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Distinct labels, sorted; the index is the class id
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the sorted label vocabulary
    pub fn fit(&mut self, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Err(AppError::Training(
                "cannot fit label encoder on zero labels".to_string(),
            ));
        }
        let distinct: BTreeSet<&String> = labels.iter().collect();
        self.classes = distinct.into_iter().cloned().collect();
        Ok(())
    }

    pub fn fit_transform(&mut self, labels: &[String]) -> Result<Vec<usize>> {
        self.fit(labels)?;
        self.transform(labels)
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| AppError::Validation(format!("unknown case type '{}'", label)))
    }

    pub fn transform(&self, labels: &[String]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l)).collect()
    }

    pub fn decode(&self, class_id: usize) -> Result<&str> {
        self.classes
            .get(class_id)
            .map(String::as_str)
            .ok_or_else(|| {
                AppError::Incompatible(format!(
                    "class id {} outside label vocabulary of {}",
                    class_id,
                    self.classes.len()
                ))
            })
    }

    pub fn inverse_transform(&self, class_ids: &[usize]) -> Result<Vec<String>> {
        class_ids
            .iter()
            .map(|&id| self.decode(id).map(str::to_string))
            .collect()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<FeatureRow> {
        vec![
            FeatureRow::new(30.0, "Branca", "São Paulo"),
            FeatureRow::new(25.0, "Parda", "Rio de Janeiro"),
            FeatureRow::new(40.0, "Negra", "Belo Horizonte"),
        ]
    }

    #[test]
    fn test_fit_builds_sorted_layout() {
        let mut pipeline = EncodingPipeline::new();
        pipeline.fit(&rows()).unwrap();

        assert_eq!(pipeline.n_features_out(), 7);
        assert_eq!(
            pipeline.feature_names_out(),
            vec![
                "etnia_Branca",
                "etnia_Negra",
                "etnia_Parda",
                "localizacao_Belo Horizonte",
                "localizacao_Rio de Janeiro",
                "localizacao_São Paulo",
                "idade",
            ]
        );
    }

    #[test]
    fn test_transform_one_hot_then_numeric() {
        let mut pipeline = EncodingPipeline::new();
        let matrix = pipeline.fit_transform(&rows()).unwrap();

        assert_eq!(matrix.shape(), &[3, 7]);
        assert_eq!(
            matrix.row(1).to_vec(),
            vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 25.0]
        );
    }

    #[test]
    fn test_unknown_category_encodes_as_zero_block() {
        let mut pipeline = EncodingPipeline::new();
        pipeline.fit(&rows()).unwrap();

        let matrix = pipeline
            .transform(&[FeatureRow::new(31.0, "Indígena", "São Paulo")])
            .unwrap();

        assert_eq!(
            matrix.row(0).to_vec(),
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 31.0]
        );
    }

    #[test]
    fn test_transform_requires_fit() {
        let pipeline = EncodingPipeline::new();
        assert!(pipeline.transform(&rows()).is_err());
        assert!(!pipeline.is_fitted());
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let mut pipeline = EncodingPipeline::new();
        assert!(matches!(pipeline.fit(&[]), Err(AppError::Training(_))));
    }

    #[test]
    fn test_stage_lookup() {
        let pipeline = EncodingPipeline::new();
        assert_eq!(pipeline.stage_index(CATEGORICAL_STAGE), Some(0));
        assert_eq!(pipeline.stage_index(NUMERIC_STAGE), Some(1));
        assert!(pipeline.stage("scaler").is_none());
    }

    #[test]
    fn test_label_encoder_sorted_round_trip() {
        let labels: Vec<String> = ["Tráfico", "Furto", "Assalto", "Furto"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut encoder = LabelEncoder::new();
        let ids = encoder.fit_transform(&labels).unwrap();

        assert_eq!(encoder.classes(), &["Assalto", "Furto", "Tráfico"]);
        assert_eq!(ids, vec![2, 1, 0, 1]);
        for label in &labels {
            assert_eq!(encoder.decode(encoder.encode(label).unwrap()).unwrap(), label);
        }
        assert_eq!(encoder.inverse_transform(&ids).unwrap(), labels);
    }

    #[test]
    fn test_label_encoder_rejects_unknowns() {
        let mut encoder = LabelEncoder::new();
        encoder.fit(&["Furto".to_string()]).unwrap();

        assert!(encoder.encode("Assalto").is_err());
        assert!(matches!(encoder.decode(5), Err(AppError::Incompatible(_))));
    }
}
