// SPDX-License-Identifier: Apache-2.0

use crate::coordinator::UpdateCoordinator;
use crate::error::{UpdateError, UpdateErrorCode};
use crate::response::UpdateResponse;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<UpdateCoordinator>,
}

impl AppState {
    #[must_use]
    pub fn new(coordinator: Arc<UpdateCoordinator>) -> Self {
        Self { coordinator }
    }
}

/// Trigger, status and health endpoints plus the published tree served as
/// static files under the public prefix.
pub fn build_router(state: AppState) -> Router {
    let layout = state.coordinator.layout();
    let files = ServeDir::new(layout.root());
    let router = Router::new()
        .route("/update", get(update_handler))
        .route("/status", get(status_handler))
        .route("/healthz", get(healthz_handler));
    let router = if layout.public_prefix().is_empty() {
        router.fallback_service(files)
    } else {
        router.nest_service(&format!("/{}", layout.public_prefix()), files)
    };
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

// The run is detached from the request so a client hanging up cannot cancel
// it half way.
async fn update_handler(State(state): State<AppState>) -> Json<UpdateResponse> {
    let coordinator = state.coordinator.clone();
    let response = tokio::spawn(async move { coordinator.update().await })
        .await
        .unwrap_or_else(|e| {
            UpdateResponse::failure(&UpdateError::new(
                UpdateErrorCode::Internal,
                format!("update task failed: {e}"),
            ))
        });
    Json(response)
}

async fn status_handler(State(state): State<AppState>) -> Json<UpdateResponse> {
    let coordinator = state.coordinator.clone();
    let response = tokio::spawn(async move { coordinator.status().await })
        .await
        .unwrap_or_else(|e| {
            UpdateResponse::failure(&UpdateError::new(
                UpdateErrorCode::Internal,
                format!("status task failed: {e}"),
            ))
        });
    Json(response)
}

async fn healthz_handler() -> &'static str {
    "ok"
}
