use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::get,
};
use std::sync::Arc;

use crate::db::services::TagService;
use crate::web::models::{AuthenticatedUser, LabelResponse, NamePayload};
use crate::web::{AppError, AppState};

async fn get_user_tags_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<LabelResponse>>, AppError> {
    let tags = TagService::get_tags_by_user(&app_state.db_pool, authenticated_user.id).await?;
    Ok(Json(tags.into_iter().map(LabelResponse::from).collect()))
}

async fn create_tag_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<NamePayload>,
) -> Result<(StatusCode, Json<LabelResponse>), AppError> {
    let name = payload.name.unwrap_or_default();
    let tag = TagService::create_tag(&app_state.db_pool, authenticated_user.id, &name).await?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}

async fn get_tag_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(tag_id): Path<i32>,
) -> Result<Json<LabelResponse>, AppError> {
    let tag = TagService::get_tag_by_id(&app_state.db_pool, tag_id, authenticated_user.id).await?;
    Ok(Json(tag.into()))
}

async fn update_tag_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(tag_id): Path<i32>,
    Json(payload): Json<NamePayload>,
) -> Result<Json<LabelResponse>, AppError> {
    let name = payload.name.unwrap_or_default();
    let tag = TagService::rename_tag(&app_state.db_pool, tag_id, authenticated_user.id, &name).await?;
    Ok(Json(tag.into()))
}

async fn delete_tag_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(tag_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    TagService::delete_tag(&app_state.db_pool, tag_id, authenticated_user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_tags_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_user_tags_handler).post(create_tag_handler))
        .route(
            "/{tag_id}",
            get(get_tag_handler).put(update_tag_handler).delete(delete_tag_handler),
        )
}
