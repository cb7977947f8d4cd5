use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::get,
};
use std::sync::Arc;

use crate::db::services::CategoryService;
use crate::web::models::{AuthenticatedUser, LabelResponse, NamePayload};
use crate::web::{AppError, AppState};

async fn get_user_categories_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<LabelResponse>>, AppError> {
    let categories =
        CategoryService::get_categories_by_user(&app_state.db_pool, authenticated_user.id).await?;
    Ok(Json(categories.into_iter().map(LabelResponse::from).collect()))
}

async fn create_category_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<NamePayload>,
) -> Result<(StatusCode, Json<LabelResponse>), AppError> {
    let category = CategoryService::create_category(
        &app_state.db_pool,
        authenticated_user.id,
        payload.name.as_deref().unwrap_or_default(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

async fn get_category_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(category_id): Path<i32>,
) -> Result<Json<LabelResponse>, AppError> {
    let category =
        CategoryService::get_category_by_id(&app_state.db_pool, category_id, authenticated_user.id)
            .await?;
    Ok(Json(category.into()))
}

async fn update_category_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(category_id): Path<i32>,
    Json(payload): Json<NamePayload>,
) -> Result<Json<LabelResponse>, AppError> {
    let category = CategoryService::rename_category(
        &app_state.db_pool,
        category_id,
        authenticated_user.id,
        payload.name.as_deref().unwrap_or_default(),
    )
    .await?;
    Ok(Json(category.into()))
}

async fn delete_category_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(category_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    CategoryService::delete_category(&app_state.db_pool, category_id, authenticated_user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_categories_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_user_categories_handler).post(create_category_handler))
        .route(
            "/{category_id}",
            get(get_category_handler)
                .put(update_category_handler)
                .delete(delete_category_handler),
        )
}
