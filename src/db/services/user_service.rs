use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, Set};

use crate::db::entities::{prelude::User, user};
use crate::db::is_unique_violation;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Database error: {0}")]
    DbErr(DbErr),
    #[error("This username is already in use.")]
    UsernameTaken(String),
}

impl From<DbErr> for UserError {
    fn from(err: DbErr) -> Self {
        UserError::DbErr(err)
    }
}

/// Usernames are compared and stored lower-cased.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Retrieves a user by their username (case-insensitive).
pub async fn get_user_by_username(db: &DbConn, username: &str) -> Result<Option<user::Model>, DbErr> {
    User::find()
        .filter(user::Column::Username.eq(normalize_username(username)))
        .one(db)
        .await
}

/// Retrieves a user by their ID.
pub async fn get_user_by_id(db: &DbConn, user_id: i32) -> Result<Option<user::Model>, DbErr> {
    User::find_by_id(user_id).one(db).await
}

/// Creates a new user from an already hashed password.
pub async fn create_user(
    db: &DbConn,
    username: &str,
    email: &str,
    password_hash: String,
    role: &str,
) -> Result<user::Model, UserError> {
    let username = normalize_username(username);
    if get_user_by_username(db, &username).await?.is_some() {
        return Err(UserError::UsernameTaken(username));
    }

    let now = Utc::now();
    let new_user = user::ActiveModel {
        username: Set(username.clone()),
        email: Set(email.trim().to_string()),
        password_hash: Set(password_hash),
        role: Set(role.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_user.insert(db).await {
        Ok(user_model) => Ok(user_model),
        Err(e) if is_unique_violation(&e) => Err(UserError::UsernameTaken(username)),
        Err(e) => Err(UserError::DbErr(e)),
    }
}
