use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::AppState;
use crate::result::QueryResult;
use crate::store::{DocumentStore, FindOptions, StoreError};

const MAX_QUESTION_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatsResponse {
    pub total_records: u64,
    pub departments: usize,
    pub suppliers: usize,
    pub fiscal_years: Vec<String>,
    pub total_spending: f64,
    pub date_range: DateRange,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub async fn handle_root() -> Json<Value> {
    Json(json!({
        "message": "California Procurement Assistant API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "features": ["Reasoning agent", "Gemini", "Document store", "Natural language queries"]
    }))
}

pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    match state.store.ping() {
        Ok(()) => Json(json!({
            "status": "healthy",
            "database": "connected",
            "agent": "ready"
        })),
        Err(err) => Json(json!({
            "status": "unhealthy",
            "database": "disconnected",
            "error": err.to_string()
        })),
    }
}

pub async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<QueryResult>) {
    let length = req.question.chars().count();
    if length == 0 || length > MAX_QUESTION_CHARS {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(QueryResult::error(format!(
                "question must be between 1 and {} characters",
                MAX_QUESTION_CHARS
            ))),
        );
    }

    let agent = state.agent.clone();
    let question = req.question;
    let result = tokio::task::spawn_blocking(move || agent.query(&question)).await;
    match result {
        Ok(result) => {
            tracing::info!(answer = %preview(&result.answer), "query response");
            (StatusCode::OK, Json(result))
        }
        Err(err) => {
            tracing::error!(error = %err, "agent task failed");
            (StatusCode::OK, Json(QueryResult::error(err)))
        }
    }
}

pub async fn handle_departments(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let departments = distinct_off_runtime(&state, "department_name").await?;
    Ok(Json(json!({ "departments": departments })))
}

pub async fn handle_acquisition_types(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let types = distinct_off_runtime(&state, "acquisition_type").await?;
    Ok(Json(json!({ "acquisition_types": types })))
}

/// Store scans are synchronous; keep them off the async workers.
async fn distinct_off_runtime(state: &AppState, field: &'static str) -> Result<Vec<Value>, ApiError> {
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.distinct(field))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
}

pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let store = state.store.clone();
    let stats = tokio::task::spawn_blocking(move || collect_stats(store.as_ref()))
        .await
        .map_err(ApiError::internal)??;
    Ok(Json(stats))
}

pub fn collect_stats(store: &dyn DocumentStore) -> Result<StatsResponse, StoreError> {
    let total_records = store.count(&json!({}))?;
    let departments = store.distinct("department_name")?.len();
    let suppliers = store.distinct("supplier_name")?.len();
    let fiscal_years = store
        .distinct("fiscal_year")?
        .into_iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();

    let spending = store.aggregate(&[
        json!({"$match": {"total_price": {"$exists": true, "$ne": null}}}),
        json!({"$group": {"_id": null, "total": {"$sum": "$total_price"}}}),
    ])?;
    let total_spending = spending
        .first()
        .and_then(|row| row.get("total"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    Ok(StatsResponse {
        total_records,
        departments,
        suppliers,
        fiscal_years,
        total_spending,
        date_range: DateRange {
            start: creation_date_bound(store, 1)?,
            end: creation_date_bound(store, -1)?,
        },
    })
}

fn creation_date_bound(store: &dyn DocumentStore, order: i64) -> Result<String, StoreError> {
    let options = FindOptions {
        sort: Some(("creation_date".to_string(), order)),
        limit: Some(1),
    };
    let found = store.find(&json!({"creation_date": {"$exists": true, "$ne": null}}), &options)?;
    Ok(found
        .first()
        .and_then(|doc| doc.get("creation_date"))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "N/A".to_string()))
}

fn preview(answer: &str) -> String {
    let mut out: String = answer.chars().take(100).collect();
    if answer.chars().count() > 100 {
        out.push_str("...");
    }
    out
}
