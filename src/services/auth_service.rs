use axum::{Extension, Json, extract::State};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::info;

use crate::db::entities::user;
use crate::db::services::user_service::{self, ROLE_ADMIN, ROLE_USER};
use crate::web::AppState;
use crate::web::error::AppError;
use crate::web::models::{AuthenticatedUser, Claims, LoginRequest, LoginResponse, RegisterRequest, UserResponse};

const MIN_PASSWORD_LEN: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "letmein1", "welcome1", "admin123",
    "abc12345", "football", "baseball", "sunshine", "princess", "trustno1",
    "passw0rd", "11111111", "00000000", "87654321", "superman", "starwars",
];

/// Checks a candidate password against the account password policy.
pub fn validate_password(password: &str, username: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("This password is entirely numeric.".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        return Err("This password is too common.".to_string());
    }

    let username = user_service::normalize_username(username);
    if username.len() >= 3 && (lowered.contains(&username) || username.contains(&lowered)) {
        return Err("The password is too similar to the username.".to_string());
    }
    Ok(())
}

pub async fn register_user(pool: &DatabaseConnection, req: RegisterRequest) -> Result<UserResponse, AppError> {
    let username = user_service::normalize_username(&req.username);
    if username.is_empty() {
        return Err(AppError::ValidationFailed("Username field is required".to_string()));
    }
    if req.password != req.confirm_password {
        return Err(AppError::ValidationFailed("Password fields didn't match.".to_string()));
    }
    validate_password(&req.password, &username).map_err(AppError::ValidationFailed)?;

    if user_service::get_user_by_username(pool, &username).await?.is_some() {
        return Err(AppError::ValidationFailed("This username is already in use.".to_string()));
    }

    let password_hash = hash(&req.password, DEFAULT_COST)
        .map_err(|e| AppError::PasswordHashingError(e.to_string()))?;

    let user_model = user_service::create_user(pool, &username, &req.email, password_hash, ROLE_USER).await?;
    info!(user_id = user_model.id, username = %user_model.username, "User registered.");
    Ok(UserResponse::from(user_model))
}

pub async fn login_user(
    pool: &DatabaseConnection,
    req: LoginRequest,
    jwt_secret: &str,
    ttl_hours: i64,
) -> Result<LoginResponse, AppError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::ValidationFailed("Username and password are required.".to_string()));
    }

    let user = match user_service::get_user_by_username(pool, &req.username).await? {
        Some(u) => u,
        None => return Err(AppError::ValidationFailed("User not found.".to_string())),
    };

    let valid_password = verify(&req.password, &user.password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))?;

    if !valid_password {
        return Err(AppError::InvalidCredentials);
    }

    create_jwt_for_user(&user, jwt_secret, ttl_hours)
}

pub fn create_jwt_for_user(user: &user::Model, jwt_secret: &str, ttl_hours: i64) -> Result<LoginResponse, AppError> {
    let expiration = (Utc::now() + Duration::hours(ttl_hours)).timestamp() as usize;

    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        exp: expiration,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::TokenCreationError(e.to_string()))?;

    Ok(LoginResponse {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        token,
    })
}

pub async fn me(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserResponse>, AppError> {
    let user_model = user_service::get_user_by_id(&app_state.db_pool, user.id)
        .await?
        .ok_or(AppError::AuthenticationRequired)?;
    Ok(Json(UserResponse::from(user_model)))
}

/// Creates the admin account if it does not exist yet. Returns whether a new
/// account was created.
pub async fn ensure_admin(pool: &DatabaseConnection, username: &str, password: &str) -> Result<bool, AppError> {
    if user_service::get_user_by_username(pool, username).await?.is_some() {
        return Ok(false);
    }
    validate_password(password, username).map_err(AppError::ValidationFailed)?;

    let password_hash = hash(password, DEFAULT_COST)
        .map_err(|e| AppError::PasswordHashingError(e.to_string()))?;
    let admin = user_service::create_user(pool, username, "", password_hash, ROLE_ADMIN).await?;
    info!(user_id = admin.id, username = %admin.username, "Admin account created.");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_policy() {
        assert!(validate_password("short1", "alice").is_err());
        assert!(validate_password("1234567890123", "alice").is_err());
        assert!(validate_password("Password123", "alice").is_err());
        assert!(validate_password("alice-rocks-42", "Alice").is_err());
        assert!(validate_password("correct horse battery", "alice").is_ok());
    }

    #[test]
    fn test_jwt_carries_user() {
        let now = Utc::now();
        let user = user::Model {
            id: 7,
            username: "alice".to_string(),
            email: "a@example.com".to_string(),
            password_hash: String::new(),
            role: ROLE_USER.to_string(),
            created_at: now,
            updated_at: now,
        };
        let login = create_jwt_for_user(&user, "secret", 1).unwrap();
        assert_eq!(login.id, 7);
        assert_eq!(login.email, "a@example.com");

        let decoded = jsonwebtoken::decode::<Claims>(
            &login.token,
            &jsonwebtoken::DecodingKey::from_secret(b"secret"),
            &jsonwebtoken::Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.user_id, 7);
        assert_eq!(decoded.claims.sub, "alice");
    }
}
