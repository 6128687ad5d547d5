use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::{META_LAST_STOCK_SYNC_DATE, META_LAST_SYNC_DATE};
use crate::sync::SyncEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub api_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub action: String,
    pub token: String,
    pub product_id: Option<i64>,
    #[serde(default)]
    pub skip_images: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/logs", get(get_logs))
        .route("/sync", post(handle_sync))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "catalog-sync-service" }))
}

async fn get_logs(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.engine.logger().entries();
    Json(json!({ "success": true, "data": { "logs": entries } }))
}

/// Single trigger endpoint. Every request carries the shared token and an
/// action; sync outcomes are reported in the body with `success` plus the
/// step trail, not via HTTP status, so the caller always gets the steps.
async fn handle_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    if request.token != state.api_token {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "data": { "message": "Invalid token" } })),
        );
    }

    match request.action.as_str() {
        "full_sync" => {
            let Some(product_id) = request.product_id else {
                return bad_request("product_id is required");
            };
            match state.engine.full_sync(product_id, request.skip_images).await {
                Ok(report) => {
                    let last_sync = last_meta(&state, product_id, META_LAST_SYNC_DATE).await;
                    (
                        StatusCode::OK,
                        Json(json!({
                            "success": true,
                            "data": {
                                "message": "Product synced successfully",
                                "action": report.action,
                                "steps": report.steps,
                                "last_sync": last_sync,
                            }
                        })),
                    )
                }
                Err(failure) => (
                    StatusCode::OK,
                    Json(json!({
                        "success": false,
                        "data": { "message": failure.message(), "steps": failure.steps }
                    })),
                ),
            }
        }
        "stock_sync" => {
            let Some(product_id) = request.product_id else {
                return bad_request("product_id is required");
            };
            match state.engine.stock_sync(product_id).await {
                Ok(report) => {
                    let last_sync = last_meta(&state, product_id, META_LAST_STOCK_SYNC_DATE).await;
                    (
                        StatusCode::OK,
                        Json(json!({
                            "success": true,
                            "data": {
                                "message": "Stock updated",
                                "action": report.action,
                                "steps": report.steps,
                                "last_stock_sync": last_sync,
                            }
                        })),
                    )
                }
                Err(failure) => (
                    StatusCode::OK,
                    Json(json!({
                        "success": false,
                        "data": { "message": failure.message(), "steps": failure.steps }
                    })),
                ),
            }
        }
        "test_connection" => match state.engine.test_connection().await {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({ "success": true, "data": { "message": "Connection successful" } })),
            ),
            Err(e) => (
                StatusCode::OK,
                Json(json!({ "success": false, "data": { "message": e.user_message() } })),
            ),
        },
        "clear_logs" => {
            state.engine.logger().clear();
            (
                StatusCode::OK,
                Json(json!({ "success": true, "data": { "message": "Logs cleared" } })),
            )
        }
        other => bad_request(&format!("Unknown action: {}", other)),
    }
}

async fn last_meta(state: &AppState, product_id: i64, key: &str) -> Value {
    match state.engine.catalog().get_meta(product_id, key).await {
        Ok(Some(value)) => Value::String(value),
        _ => Value::Null,
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "data": { "message": message } })),
    )
}
