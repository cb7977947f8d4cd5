use axum::{
    Json, Router,
    extract::{Extension, OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use std::sync::Arc;

use crate::db::services::{FavouriteChanges, FavouriteFilter, FavouriteService, NewFavourite};
use crate::web::models::{
    AuthenticatedUser, CategoryRefRequest, CreateFavouriteRequest, FavouriteResponse, Page, PageParams,
    TagIdsRequest, UpdateFavouriteRequest,
};
use crate::web::{AppError, AppState};

async fn list_favourites_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Query(filter): Query<FavouriteFilter>,
    Query(page_params): Query<PageParams>,
) -> Result<Json<Page<FavouriteResponse>>, AppError> {
    let (page, page_size) = page_params.resolve();
    let (count, favourites) = FavouriteService::list_favourites(
        &app_state.db_pool,
        authenticated_user.id,
        &filter,
        page,
        page_size,
    )
    .await?;

    let results = favourites.into_iter().map(FavouriteResponse::from).collect();
    Ok(Json(Page::new(results, count, page, page_size, uri.path(), uri.query())))
}

async fn create_favourite_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateFavouriteRequest>,
) -> Result<(StatusCode, Json<FavouriteResponse>), AppError> {
    let new = NewFavourite {
        url: payload.url.unwrap_or_default(),
        title: payload.title,
        category_id: payload.category,
        tag_ids: payload.tags,
    };
    let details = FavouriteService::create_favourite(
        &app_state.db_pool,
        app_state.prober.as_ref(),
        authenticated_user.id,
        new,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

async fn get_favourite_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(favourite_id): Path<i32>,
) -> Result<Json<FavouriteResponse>, AppError> {
    let details =
        FavouriteService::get_favourite(&app_state.db_pool, favourite_id, authenticated_user.id).await?;
    Ok(Json(details.into()))
}

async fn update_favourite_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(favourite_id): Path<i32>,
    Json(payload): Json<UpdateFavouriteRequest>,
) -> Result<Json<FavouriteResponse>, AppError> {
    let changes = FavouriteChanges {
        url: payload.url,
        title: payload.title,
        category_id: payload.category,
        // An explicit null clears the tags like an empty list does
        tag_ids: payload.tags.map(Option::unwrap_or_default),
    };
    let details = FavouriteService::update_favourite(
        &app_state.db_pool,
        app_state.prober.as_ref(),
        favourite_id,
        authenticated_user.id,
        changes,
    )
    .await?;
    Ok(Json(details.into()))
}

async fn delete_favourite_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(favourite_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    FavouriteService::delete_favourite(&app_state.db_pool, favourite_id, authenticated_user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_tags_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(favourite_id): Path<i32>,
    Json(payload): Json<TagIdsRequest>,
) -> Result<Json<FavouriteResponse>, AppError> {
    let details = FavouriteService::add_tags(
        &app_state.db_pool,
        favourite_id,
        authenticated_user.id,
        &payload.tags,
    )
    .await?;
    Ok(Json(details.into()))
}

async fn set_tags_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(favourite_id): Path<i32>,
    Json(payload): Json<TagIdsRequest>,
) -> Result<Json<FavouriteResponse>, AppError> {
    let details = FavouriteService::set_tags(
        &app_state.db_pool,
        favourite_id,
        authenticated_user.id,
        &payload.tags,
    )
    .await?;
    Ok(Json(details.into()))
}

async fn set_category_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(favourite_id): Path<i32>,
    Json(payload): Json<CategoryRefRequest>,
) -> Result<Json<FavouriteResponse>, AppError> {
    let details = FavouriteService::set_category(
        &app_state.db_pool,
        favourite_id,
        authenticated_user.id,
        payload.category,
    )
    .await?;
    Ok(Json(details.into()))
}

pub fn create_favourites_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_favourites_handler).post(create_favourite_handler))
        .route(
            "/{favourite_id}",
            get(get_favourite_handler)
                .put(update_favourite_handler)
                .delete(delete_favourite_handler),
        )
        .route("/{favourite_id}/tags", post(add_tags_handler).put(set_tags_handler))
        .route("/{favourite_id}/category", put(set_category_handler))
}
