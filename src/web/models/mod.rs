use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::db::entities::{category, tag, user};
use crate::db::services::FavouriteDetails;

pub mod pagination;

pub use pagination::{Page, PageParams};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self { id: user.id, username: user.username, email: user.email }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub token: String,
}

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (username)
    pub user_id: i32,
    pub exp: usize, // Expiration time (timestamp)
}

/// Struct to hold authenticated user details, to be passed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub username: String,
}

/// Body for tag and category create/rename. A missing name is reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct NamePayload {
    #[serde(default)]
    pub name: Option<String>,
}

/// Shape shared by tags and categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelResponse {
    pub id: i32,
    pub user: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<tag::Model> for LabelResponse {
    fn from(tag: tag::Model) -> Self {
        Self {
            id: tag.id,
            user: tag.user_id,
            name: tag.name,
            created_at: tag.created_at,
            updated_at: tag.updated_at,
        }
    }
}

impl From<category::Model> for LabelResponse {
    fn from(category: category::Model) -> Self {
        Self {
            id: category.id,
            user: category.user_id,
            name: category.name,
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavouriteResponse {
    pub id: i32,
    pub user: i32,
    pub url: String,
    pub title: String,
    pub category: Option<LabelResponse>,
    pub tags: Vec<LabelResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FavouriteDetails> for FavouriteResponse {
    fn from(details: FavouriteDetails) -> Self {
        let FavouriteDetails { favourite, category, tags } = details;
        Self {
            id: favourite.id,
            user: favourite.user_id,
            url: favourite.url,
            title: favourite.title,
            category: category.map(LabelResponse::from),
            tags: tags.into_iter().map(LabelResponse::from).collect(),
            created_at: favourite.created_at,
            updated_at: favourite.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFavouriteRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<i32>,
    #[serde(default)]
    pub tags: Vec<i32>,
}

/// Distinguishes an omitted field (`None`) from an explicit `null`
/// (`Some(None)`).
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFavouriteRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub category: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub tags: Option<Option<Vec<i32>>>,
}

#[derive(Debug, Deserialize)]
pub struct TagIdsRequest {
    #[serde(default)]
    pub tags: Vec<i32>,
}

/// `{"category": null}` clears the category.
#[derive(Debug, Deserialize)]
pub struct CategoryRefRequest {
    #[serde(default)]
    pub category: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ValidUrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidUrlResponse {
    pub url: String,
    pub is_valid: bool,
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_distinguishes_null_from_missing() {
        let omitted: UpdateFavouriteRequest = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(omitted.category, None);
        assert!(omitted.tags.is_none());

        let cleared: UpdateFavouriteRequest =
            serde_json::from_str(r#"{"category": null, "tags": null}"#).unwrap();
        assert_eq!(cleared.category, Some(None));
        assert_eq!(cleared.tags, Some(None));

        let set: UpdateFavouriteRequest =
            serde_json::from_str(r#"{"category": 4, "tags": [1, 2]}"#).unwrap();
        assert_eq!(set.category, Some(Some(4)));
        assert_eq!(set.tags, Some(Some(vec![1, 2])));
    }
}
