use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
    Set,
};

use crate::db::entities::{category, prelude::Category};
use crate::db::is_unique_violation;
use crate::db::services::tag_service::clean_name;

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Category not found: {0}")]
    NotFound(i32),
    #[error("Category with this name already exists")]
    DuplicateName(String),
    #[error("{0}")]
    InvalidName(String),
}

pub struct CategoryService;

impl CategoryService {
    pub async fn create_category(
        db: &DbConn,
        user_id: i32,
        name: &str,
    ) -> Result<category::Model, CategoryError> {
        let name = clean_name(name).map_err(CategoryError::InvalidName)?;

        if Category::find()
            .filter(category::Column::UserId.eq(user_id))
            .filter(category::Column::Name.eq(&name))
            .one(db)
            .await?
            .is_some()
        {
            return Err(CategoryError::DuplicateName(name));
        }

        let now = Utc::now();
        let new_category = category::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match new_category.insert(db).await {
            Ok(model) => Ok(model),
            Err(db_err) if is_unique_violation(&db_err) => Err(CategoryError::DuplicateName(name)),
            Err(db_err) => Err(CategoryError::DbErr(db_err)),
        }
    }

    /// The user's "categories" view.
    pub async fn get_categories_by_user(
        db: &DbConn,
        user_id: i32,
    ) -> Result<Vec<category::Model>, CategoryError> {
        let query = Category::find()
            .filter(category::Column::UserId.eq(user_id))
            .order_by_asc(category::Column::Name);

        Ok(query.all(db).await?)
    }

    pub async fn get_category_by_id(
        db: &DbConn,
        category_id: i32,
        user_id: i32,
    ) -> Result<category::Model, CategoryError> {
        let category = Category::find_by_id(category_id)
            .filter(category::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(CategoryError::NotFound(category_id))?;
        Ok(category)
    }

    pub async fn rename_category(
        db: &DbConn,
        category_id: i32,
        user_id: i32,
        name: &str,
    ) -> Result<category::Model, CategoryError> {
        let category = Self::get_category_by_id(db, category_id, user_id).await?;
        let name = clean_name(name).map_err(CategoryError::InvalidName)?;

        let clash = Category::find()
            .filter(category::Column::UserId.eq(user_id))
            .filter(category::Column::Name.eq(&name))
            .filter(category::Column::Id.ne(category_id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(CategoryError::DuplicateName(name));
        }

        let mut active_category: category::ActiveModel = category.into();
        active_category.name = Set(name.clone());
        active_category.updated_at = Set(Utc::now());

        match active_category.update(db).await {
            Ok(model) => Ok(model),
            Err(db_err) if is_unique_violation(&db_err) => Err(CategoryError::DuplicateName(name)),
            Err(db_err) => Err(CategoryError::DbErr(db_err)),
        }
    }

    /// Favourites filed under the category fall back to no category.
    pub async fn delete_category(
        db: &DbConn,
        category_id: i32,
        user_id: i32,
    ) -> Result<(), CategoryError> {
        let category = Self::get_category_by_id(db, category_id, user_id).await?;
        category.delete(db).await?;
        Ok(())
    }
}
