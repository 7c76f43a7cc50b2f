use crate::api::AppContext;
use crate::error::{AppError, Result};
use crate::metrics::{gather_metrics, PREDICTIONS_TOTAL};
use crate::ml::{CasePrediction, PredictRequest};
use crate::models::validate_case;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Health check endpoint
pub async fn health_check(State(ctx): State<AppContext>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: ctx.started_at.elapsed().as_secs(),
        model_classes: ctx.inference.classes().to_vec(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub model_classes: Vec<String>,
}

/// Unwrap a JSON body, turning axum's rejection into a 400
fn json_body(body: std::result::Result<Json<Value>, JsonRejection>) -> Result<Value> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// List every stored case
pub async fn list_cases(State(ctx): State<AppContext>) -> Result<Json<Vec<Value>>> {
    let cases = ctx.store.list_cases().await?;
    Ok(Json(cases))
}

/// Validate and store a case document
pub async fn create_case(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let document = json_body(body)?;
    let record = validate_case(&document)?;

    ctx.store.insert_case(&document).await?;
    tracing::info!(
        data_do_caso = %record.case_date,
        tipo_do_caso = %record.case_type,
        "Case stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Caso criado com sucesso"})),
    ))
}

/// Fetch the first case recorded on `data_caso`
pub async fn get_case(
    State(ctx): State<AppContext>,
    Path(data_caso): Path<String>,
) -> Result<Json<Value>> {
    ctx.store
        .find_by_date(&data_caso)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Caso com data {} não encontrado", data_caso)))
}

/// Delete the first case recorded on `data_caso`
pub async fn delete_case(
    State(ctx): State<AppContext>,
    Path(data_caso): Path<String>,
) -> Result<Json<Value>> {
    if !ctx.store.delete_by_date(&data_caso).await? {
        return Err(AppError::NotFound(format!(
            "Caso com data {} não encontrado",
            data_caso
        )));
    }

    tracing::info!(data_do_caso = %data_caso, "Case deleted");
    Ok(Json(json!({"message": "Caso deletado"})))
}

/// Predict the case type for one victim/location
pub async fn predict(
    State(ctx): State<AppContext>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<CasePrediction>> {
    let request = match json_body(body).and_then(PredictRequest::from_value) {
        Ok(request) => request,
        Err(e) => {
            PREDICTIONS_TOTAL.with_label_values(&["invalid_input"]).inc();
            return Err(e);
        }
    };

    let prediction = ctx.inference.predict_request(request)?;
    Ok(Json(prediction))
}

/// Per-feature importance of the loaded model
pub async fn feature_importance(
    State(ctx): State<AppContext>,
) -> Result<Json<BTreeMap<String, f64>>> {
    Ok(Json(ctx.inference.feature_importance()?))
}

/// Prometheus scrape endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
