use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use forensic_case_manager::{
    api::{build_router, AppContext},
    config::ServerConfig,
    ml::{train_model, BoostingParams, InferenceService, ModelArtifact},
    seed::reference_cases,
    state::{CaseStore, InMemoryStore},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> (Router, Arc<InMemoryStore>) {
    let documents: Vec<Value> = reference_cases().iter().map(|c| c.to_document()).collect();
    let params = BoostingParams {
        n_estimators: 20,
        ..BoostingParams::default()
    };
    let artifact = train_model(&documents, &params).unwrap().artifact;

    let store = Arc::new(InMemoryStore::new());
    let ctx = AppContext::new(store.clone(), InferenceService::new(artifact));
    (build_router(ctx, &ServerConfig::default()), store)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn valid_case() -> Value {
    json!({
        "data_do_caso": "2024-08-15",
        "tipo_do_caso": "Assalto",
        "localizacao": "Bairro B",
        "vitima": {"etnia": "Preta", "idade": 27}
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app();
    let (status, body) = send(app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_classes"], json!(["Caso A", "Caso B"]));
}

#[tokio::test]
async fn test_create_and_fetch_case() {
    let (app, store) = test_app();

    let (status, body) = send(app.clone(), "POST", "/api/casos", Some(valid_case())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Caso criado com sucesso");
    assert_eq!(store.count_cases().await.unwrap(), 1);

    let (status, body) = send(app.clone(), "GET", "/api/casos/2024-08-15", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, valid_case());

    let (status, body) = send(app, "GET", "/api/casos", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_invalid_case() {
    let (app, store) = test_app();

    let mut case = valid_case();
    case["vitima"].as_object_mut().unwrap().remove("idade");
    let (status, body) = send(app.clone(), "POST", "/api/casos", Some(case)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let mut case = valid_case();
    case["data_do_caso"] = json!("15/08/2024");
    let (status, _) = send(app, "POST", "/api/casos", Some(case)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.count_cases().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_case() {
    let (app, store) = test_app();
    store.insert_case(&valid_case()).await.unwrap();

    let (status, body) = send(app.clone(), "DELETE", "/api/casos/2024-08-15", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Caso deletado");

    let (status, body) = send(app.clone(), "DELETE", "/api/casos/2024-08-15", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(app, "GET", "/api/casos/2024-08-15", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_predict() {
    let (app, _) = test_app();
    let request = json!({"idade": 31, "etnia": "Branca", "localizacao": "São Paulo"});

    let (status, body) = send(app, "POST", "/api/predizer", Some(request)).await;
    assert_eq!(status, StatusCode::OK);

    let class = body["classe_predita"].as_str().unwrap();
    assert!(["Caso A", "Caso B"].contains(&class));

    let probabilities = body["probabilidades"].as_object().unwrap();
    assert_eq!(probabilities.len(), 2);
    let total: f64 = probabilities.values().map(|p| p.as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() <= 1e-4);
}

#[tokio::test]
async fn test_predict_missing_fields() {
    let (app, _) = test_app();

    let (status, body) = send(app, "POST", "/api/predizer", Some(json!({"idade": 25}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_predict_malformed_body() {
    let (app, _) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/predizer")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feature_importance() {
    let (app, _) = test_app();

    let (status, body) = send(app, "GET", "/api/modelo/coeficientes", None).await;
    assert_eq!(status, StatusCode::OK);

    let importance = body.as_object().unwrap();
    assert!(importance.contains_key("idade"));
    assert!(importance.contains_key("etnia_Parda"));
    assert!(importance.contains_key("localizacao_Rio de Janeiro"));
}

#[tokio::test]
async fn test_feature_importance_incompatible_model() {
    let documents: Vec<Value> = reference_cases().iter().map(|c| c.to_document()).collect();
    let params = BoostingParams {
        n_estimators: 5,
        ..BoostingParams::default()
    };
    let mut json = train_model(&documents, &params)
        .unwrap()
        .artifact
        .to_json()
        .unwrap();
    json["encoder"]["stages"][0]["name"] = json!("categorical");
    let artifact = ModelArtifact::from_json(json).unwrap();

    let ctx = AppContext::new(
        Arc::new(InMemoryStore::new()),
        InferenceService::new(artifact),
    );
    let app = build_router(ctx, &ServerConfig::default());

    let (status, body) = send(app, "GET", "/api/modelo/coeficientes", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INCOMPATIBLE_MODEL");
    assert_eq!(body["error"]["status"], 500);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    forensic_case_manager::metrics::init_metrics().unwrap();
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("forensic_case_manager_model_classes"));
}
