//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::ApiError;
use crate::jobs::JobRef;
use crate::registry::{check_description, check_label, CategoryInput, ConfigurationForm};
use crate::rename::RenameEvent;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config).put(put_config))
        .route("/config/label", put(put_label))
        .route("/config/description", put(put_description))
        .route("/config/check/label", get(check_label_value))
        .route("/config/check/description", get(check_description_value))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/options", get(category_options))
        .route(
            "/categories/{id}",
            get(get_category).put(rename_category).delete(delete_category),
        )
        .route("/executions", post(record_execution))
        .route("/history", get(history))
        .route("/latest", get(latest))
        .route("/renames", post(rename))
}

#[derive(Debug, Deserialize)]
struct ValueBody {
    value: String,
}

#[derive(Debug, Deserialize)]
struct NameBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ExecutionBody {
    job: String,
    category: String,
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let config = state.tracker.registry().snapshot().await;
    Json(json!({ "data": config }))
}

async fn put_config(
    State(state): State<AppState>,
    Json(form): Json<ConfigurationForm>,
) -> Result<Json<Value>, ApiError> {
    let registry = state.tracker.registry();
    registry.configure(form).await?;
    Ok(Json(json!({ "data": registry.snapshot().await })))
}

async fn put_label(
    State(state): State<AppState>,
    Json(body): Json<ValueBody>,
) -> Result<Json<Value>, ApiError> {
    state.tracker.registry().set_label(&body.value).await?;
    Ok(Json(json!({ "data": { "label": body.value } })))
}

async fn put_description(
    State(state): State<AppState>,
    Json(body): Json<ValueBody>,
) -> Result<Json<Value>, ApiError> {
    state.tracker.registry().set_description(&body.value).await?;
    Ok(Json(json!({ "data": { "description": body.value } })))
}

async fn check_label_value(Query(q): Query<CheckQuery>) -> Json<Value> {
    Json(json!({ "data": check_label(&q.value) }))
}

async fn check_description_value(Query(q): Query<CheckQuery>) -> Json<Value> {
    Json(json!({ "data": check_description(&q.value) }))
}

async fn list_categories(State(state): State<AppState>) -> Json<Value> {
    let categories = state.tracker.registry().list_all().await;
    Json(json!({ "data": categories, "meta": { "total": categories.len() } }))
}

async fn category_options(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.tracker.registry().options().await }))
}

async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let category = state
        .tracker
        .registry()
        .create_category(&input.name, input.id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": category }))))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.tracker.registry().resolve(&id).await {
        Some(category) => Ok(Json(json!({ "data": category }))),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("category {} not found", id),
        )),
    }
}

async fn rename_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NameBody>,
) -> Result<Json<Value>, ApiError> {
    let category = state
        .tracker
        .registry()
        .rename_category(&id, &body.name)
        .await?;
    Ok(Json(json!({ "data": category })))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.tracker.registry().delete_category(&id).await?;
    Ok(Json(json!({ "data": removed })))
}

async fn record_execution(
    State(state): State<AppState>,
    Json(body): Json<ExecutionBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let record = state
        .tracker
        .on_execution_complete(JobRef::new(body.job), &body.category)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": record }))))
}

async fn history(State(state): State<AppState>) -> Json<Value> {
    let items = state.tracker.history_view().await;
    Json(json!({ "data": items, "meta": { "total": items.len() } }))
}

async fn latest(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.tracker.recorder().latest_per_category().await }))
}

async fn rename(State(state): State<AppState>, Json(event): Json<RenameEvent>) -> Json<Value> {
    let report = state
        .tracker
        .on_rename(event.kind, &event.old_name, &event.new_name)
        .await;
    Json(json!({ "data": report }))
}
