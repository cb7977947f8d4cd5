use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
    Set,
};

use crate::db::entities::{prelude::Tag, tag};
use crate::db::is_unique_violation;

pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Database error: {0}")]
    DbErr(DbErr),
    #[error("Tag not found: {0}")]
    NotFound(i32),
    #[error("Tag with this name already exists")]
    DuplicateName(String),
    #[error("{0}")]
    InvalidName(String),
}

impl From<DbErr> for TagError {
    fn from(err: DbErr) -> Self {
        TagError::DbErr(err)
    }
}

/// Trims the name and rejects empty or oversized values.
pub fn clean_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name field is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name must be at most {MAX_NAME_LEN} characters"));
    }
    Ok(name.to_string())
}

pub struct TagService;

impl TagService {
    pub async fn create_tag(db: &DbConn, user_id: i32, name: &str) -> Result<tag::Model, TagError> {
        let name = clean_name(name).map_err(TagError::InvalidName)?;

        // Check for duplicate name for the same user
        if Tag::find()
            .filter(tag::Column::UserId.eq(user_id))
            .filter(tag::Column::Name.eq(&name))
            .one(db)
            .await?
            .is_some()
        {
            return Err(TagError::DuplicateName(name));
        }

        let now = Utc::now();
        let new_tag = tag::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        new_tag.insert(db).await.map_err(|db_err| {
            if is_unique_violation(&db_err) {
                TagError::DuplicateName(name)
            } else {
                TagError::DbErr(db_err)
            }
        })
    }

    /// All tags owned by the user. This is the user's "tags" view; it is
    /// always queried, never cached on the user.
    pub async fn get_tags_by_user(db: &DbConn, user_id: i32) -> Result<Vec<tag::Model>, TagError> {
        Ok(Tag::find()
            .filter(tag::Column::UserId.eq(user_id))
            .order_by_asc(tag::Column::Name)
            .all(db)
            .await?)
    }

    pub async fn get_tag_by_id(db: &DbConn, tag_id: i32, user_id: i32) -> Result<tag::Model, TagError> {
        Tag::find_by_id(tag_id)
            .filter(tag::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(TagError::NotFound(tag_id))
    }

    pub async fn rename_tag(
        db: &DbConn,
        tag_id: i32,
        user_id: i32,
        name: &str,
    ) -> Result<tag::Model, TagError> {
        let tag = Self::get_tag_by_id(db, tag_id, user_id).await?;
        let name = clean_name(name).map_err(TagError::InvalidName)?;

        if Tag::find()
            .filter(tag::Column::UserId.eq(user_id))
            .filter(tag::Column::Name.eq(&name))
            .filter(tag::Column::Id.ne(tag_id))
            .one(db)
            .await?
            .is_some()
        {
            return Err(TagError::DuplicateName(name));
        }

        let mut active_tag: tag::ActiveModel = tag.into();
        active_tag.name = Set(name.clone());
        active_tag.updated_at = Set(Utc::now());

        active_tag.update(db).await.map_err(|db_err| {
            if is_unique_violation(&db_err) {
                TagError::DuplicateName(name)
            } else {
                TagError::DbErr(db_err)
            }
        })
    }

    /// Deletes a tag. The ON DELETE CASCADE on favourite_tags drops its links.
    pub async fn delete_tag(db: &DbConn, tag_id: i32, user_id: i32) -> Result<(), TagError> {
        let tag = Self::get_tag_by_id(db, tag_id, user_id).await?;
        tag.delete(db).await?;
        Ok(())
    }
}
