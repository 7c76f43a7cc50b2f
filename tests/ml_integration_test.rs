/// Integration tests for the case-type classification pipeline
///
/// These tests cover training from stored documents, artifact persistence
/// and inference through the public service API.
use forensic_case_manager::{
    config::ModelConfig,
    error::AppError,
    ml::{
        run_training, train_model, ArtifactError, BoostingParams, Classifier, FeatureExtractor,
        FeatureRow, InferenceService, ModelArtifact, PredictRequest,
    },
    seed::{generate_random_cases, reference_cases, seed_if_empty},
    state::{CaseStore, InMemoryStore},
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn reference_documents() -> Vec<Value> {
    reference_cases().iter().map(|c| c.to_document()).collect()
}

fn fast_params() -> BoostingParams {
    BoostingParams {
        n_estimators: 20,
        ..BoostingParams::default()
    }
}

#[test]
fn test_reference_scenario_prediction() {
    let outcome = train_model(&reference_documents(), &BoostingParams::default()).unwrap();
    assert_eq!(outcome.artifact.label_encoder.classes(), &["Caso A", "Caso B"]);

    let service = InferenceService::new(outcome.artifact);
    let prediction = service
        .predict(&FeatureRow::new(31.0, "Branca", "São Paulo"))
        .unwrap();

    assert!(["Caso A", "Caso B"].contains(&prediction.predicted_class.as_str()));
    assert_eq!(prediction.probabilities.len(), 2);
    let total: f64 = prediction.probabilities.values().sum();
    assert!((total - 1.0).abs() <= 1e-4);
}

#[test]
fn test_partial_request_is_validation_error() {
    let outcome = train_model(&reference_documents(), &fast_params()).unwrap();
    let service = InferenceService::new(outcome.artifact);

    let request = PredictRequest::from_value(json!({"idade": 25})).unwrap();
    let result = service.predict_request(request);
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn test_artifact_without_label_encoder_fails_to_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("model.json");

    let outcome = train_model(&reference_documents(), &fast_params()).unwrap();
    let mut value = outcome.artifact.to_json().unwrap();
    value.as_object_mut().unwrap().remove("label_encoder");
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let result = InferenceService::load(&path);
    assert!(matches!(
        result,
        Err(AppError::Artifact(ArtifactError::MissingMember("label_encoder")))
    ));
}

#[test]
fn test_extractor_drops_incomplete_records() {
    let mut documents = reference_documents();
    documents.push(json!({"vitima": {"idade": 22}, "localizacao": "Centro", "tipo_do_caso": "Furto"}));
    documents.push(json!({"vitima": {"idade": 22, "etnia": "Parda"}, "tipo_do_caso": "Furto"}));
    documents.push(json!("not a case"));

    let report = FeatureExtractor::new().extract(&documents).unwrap();
    assert_eq!(report.len(), 3);
    assert_eq!(report.skipped.len(), 3);
}

#[test]
fn test_probabilities_cover_every_class_for_unseen_categories() {
    let documents: Vec<Value> = generate_random_cases(80, &mut rand::rng())
        .iter()
        .map(|c| c.to_document())
        .collect();
    let outcome = train_model(&documents, &fast_params()).unwrap();
    let n_classes = outcome.artifact.label_encoder.n_classes();

    let rows = vec![
        FeatureRow::new(45.0, "Branca", "Centro"),
        FeatureRow::new(7.0, "Desconhecida", "Outro Estado"),
    ];
    let features = outcome.artifact.encoder.transform(&rows).unwrap();
    let proba = outcome.artifact.classifier.predict_proba(&features).unwrap();

    assert_eq!(proba.ncols(), n_classes);
    for row in proba.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-6);
    }

    // Unseen categories leave every one-hot column at zero
    let cat_width = features.ncols() - 1;
    assert!(features.row(1).iter().take(cat_width).all(|v| *v == 0.0));
}

#[test]
fn test_label_encoder_round_trips_training_labels() {
    let documents: Vec<Value> = generate_random_cases(40, &mut rand::rng())
        .iter()
        .map(|c| c.to_document())
        .collect();
    let outcome = train_model(&documents, &fast_params()).unwrap();
    let encoder = &outcome.artifact.label_encoder;

    for document in &documents {
        let label = document["tipo_do_caso"].as_str().unwrap();
        let id = encoder.encode(label).unwrap();
        assert_eq!(encoder.decode(id).unwrap(), label);
    }
}

#[tokio::test]
async fn test_run_training_from_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    seed_if_empty(&store, &reference_cases()).await.unwrap();
    store
        .insert_case(&json!({"tipo_do_caso": "Furto", "localizacao": "Centro"}))
        .await
        .unwrap();

    let config = ModelConfig {
        artifact_path: temp_dir.path().join("models").join("model.json"),
        boosting: fast_params(),
    };

    let outcome = run_training(&store, &config).await.unwrap();
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].index, 3);

    let loaded = ModelArtifact::load(&config.artifact_path).unwrap();
    assert_eq!(loaded.metadata.classes, vec!["Caso A", "Caso B"]);
    assert_eq!(loaded.metadata.n_training_samples, 3);

    let service = InferenceService::new(loaded);
    let importance = service.feature_importance().unwrap();
    assert!(importance.contains_key("idade"));
    assert!(importance.contains_key("etnia_Branca"));
    assert!(importance.contains_key("localizacao_São Paulo"));
}

#[tokio::test]
async fn test_run_training_on_empty_store_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    let config = ModelConfig {
        artifact_path: temp_dir.path().join("model.json"),
        boosting: fast_params(),
    };

    let result = run_training(&store, &config).await;
    assert!(matches!(result, Err(AppError::Training(_))));
    assert!(!config.artifact_path.exists());
}
