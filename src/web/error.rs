use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::services::{CategoryError, FavouriteError, OwnershipError, TagError, UserError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Authentication credentials were not provided or are invalid")]
    AuthenticationRequired,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationFailed(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "Authentication credentials were not provided.".to_string(),
            ),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PasswordHashingError(msg) => {
                error!(error = %msg, "Password hashing failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Password hashing error".to_string())
            }
            AppError::TokenCreationError(msg) => {
                error!(error = %msg, "Token creation failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Token creation error".to_string())
            }
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Database error while handling request.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::InternalServerError(msg) => {
                error!(error = %msg, "Internal server error.");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<TagError> for AppError {
    fn from(err: TagError) -> Self {
        match err {
            TagError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            TagError::NotFound(_) => AppError::NotFound("Tag not found.".to_string()),
            e @ TagError::DuplicateName(_) => AppError::ValidationFailed(e.to_string()),
            TagError::InvalidName(msg) => AppError::ValidationFailed(msg),
        }
    }
}

impl From<CategoryError> for AppError {
    fn from(err: CategoryError) -> Self {
        match err {
            CategoryError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            CategoryError::NotFound(_) => AppError::NotFound("Category not found.".to_string()),
            e @ CategoryError::DuplicateName(_) => AppError::ValidationFailed(e.to_string()),
            CategoryError::InvalidName(msg) => AppError::ValidationFailed(msg),
        }
    }
}

impl From<FavouriteError> for AppError {
    fn from(err: FavouriteError) -> Self {
        match err {
            FavouriteError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            FavouriteError::NotFound(_) => AppError::NotFound("Favourite not found.".to_string()),
            FavouriteError::Ownership(OwnershipError::DbErr(e)) => AppError::DatabaseError(e.to_string()),
            other => AppError::ValidationFailed(other.to_string()),
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            e @ UserError::UsernameTaken(_) => AppError::ValidationFailed(e.to_string()),
        }
    }
}
