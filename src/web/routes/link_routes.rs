use axum::{Json, Router, extract::State, routing::post};
use std::sync::Arc;

use crate::db::services::link_validity_service;
use crate::services::link_probe::is_probeable;
use crate::web::models::{ValidUrlRequest, ValidUrlResponse};
use crate::web::{AppError, AppState};

/// Resolves a url through the validity cache, probing it on first sight.
async fn valid_url_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ValidUrlRequest>,
) -> Result<Json<ValidUrlResponse>, AppError> {
    let url = payload.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(AppError::ValidationFailed("Url field is required".to_string()));
    }
    if !is_probeable(url) {
        return Err(AppError::ValidationFailed("Enter a valid URL.".to_string()));
    }

    let row = link_validity_service::resolve(&app_state.db_pool, app_state.prober.as_ref(), url).await?;
    Ok(Json(ValidUrlResponse {
        url: row.url,
        is_valid: row.is_valid,
        title: row.title,
    }))
}

pub fn create_links_router() -> Router<Arc<AppState>> {
    Router::new().route("/api/valid-url", post(valid_url_handler))
}
