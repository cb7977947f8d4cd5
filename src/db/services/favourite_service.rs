//! Favourites and the rules around them.
//!
//! Creation runs: input check → per-user url uniqueness → link validity →
//! ownership of the category/tags → one transaction writing the row and its
//! tag links. Any failure leaves the database untouched.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, LikeExpr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbConn, DbErr, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Select, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

use crate::db::entities::prelude::{Category, Favourite, FavouriteTag, Tag};
use crate::db::entities::{category, favourite, favourite_tag, tag};
use crate::db::is_unique_violation;
use crate::db::services::link_validity_service;
use crate::db::services::ownership::{self, OwnershipError};
use crate::services::link_probe::{LinkProber, MAX_TITLE_LEN, is_probeable};

#[derive(Debug, thiserror::Error)]
pub enum FavouriteError {
    #[error("Database error: {0}")]
    DbErr(DbErr),
    #[error("Favourite not found: {0}")]
    NotFound(i32),
    #[error("Favourite with this url already exists")]
    DuplicateUrl(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Url is not valid or unreachable")]
    UnreachableUrl(String),
    #[error(transparent)]
    Ownership(OwnershipError),
}

impl From<DbErr> for FavouriteError {
    fn from(err: DbErr) -> Self {
        FavouriteError::DbErr(err)
    }
}

impl From<OwnershipError> for FavouriteError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::DbErr(e) => FavouriteError::DbErr(e),
            other => FavouriteError::Ownership(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewFavourite {
    pub url: String,
    pub title: Option<String>,
    pub category_id: Option<i32>,
    pub tag_ids: Vec<i32>,
}

/// Partial update. `None` keeps the stored value; `Some(None)` on
/// `category_id` clears the category; `Some(vec![])` on `tag_ids` clears
/// all tags.
#[derive(Debug, Clone, Default)]
pub struct FavouriteChanges {
    pub url: Option<String>,
    pub title: Option<String>,
    pub category_id: Option<Option<i32>>,
    pub tag_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FavouriteFilter {
    pub title: Option<String>,
    pub url: Option<String>,
    pub category_name: Option<String>,
    pub tag_name: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FavouriteDetails {
    pub favourite: favourite::Model,
    pub category: Option<category::Model>,
    pub tags: Vec<tag::Model>,
}

fn clean_url(url: &str) -> Result<String, FavouriteError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FavouriteError::InvalidInput("Url field is required".to_string()));
    }
    if !is_probeable(url) {
        return Err(FavouriteError::InvalidInput("Enter a valid URL.".to_string()));
    }
    Ok(url.to_string())
}

fn clean_title(title: &str) -> Result<String, FavouriteError> {
    let title = title.trim();
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(FavouriteError::InvalidInput(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

/// Case-insensitive substring pattern with LIKE wildcards escaped.
fn contains_pattern(value: &str) -> LikeExpr {
    let escaped = value
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    LikeExpr::new(format!("%{escaped}%")).escape('\\')
}

/// Applies the list filters. `owner` scopes the category lookup as well as
/// the favourites; `None` searches across all users.
fn apply_filter(
    mut query: Select<favourite::Entity>,
    filter: &FavouriteFilter,
    owner: Option<i32>,
) -> Select<favourite::Entity> {
    if let Some(user_id) = owner {
        query = query.filter(favourite::Column::UserId.eq(user_id));
    }
    if let Some(title) = filter.title.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(
            Expr::expr(Func::lower(Expr::col((favourite::Entity, favourite::Column::Title))))
                .like(contains_pattern(title)),
        );
    }
    if let Some(url) = filter.url.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(
            Expr::expr(Func::lower(Expr::col((favourite::Entity, favourite::Column::Url))))
                .like(contains_pattern(url)),
        );
    }
    if let Some(category_name) = filter.category_name.as_deref().filter(|s| !s.is_empty()) {
        let mut matching_categories = Query::select();
        matching_categories
            .column((category::Entity, category::Column::Id))
            .from(category::Entity)
            .and_where(
                Expr::expr(Func::lower(Expr::col((category::Entity, category::Column::Name))))
                    .like(contains_pattern(category_name)),
            );
        if let Some(user_id) = owner {
            matching_categories
                .and_where(Expr::col((category::Entity, category::Column::UserId)).eq(user_id));
        }
        query = query
            .filter(favourite::Column::CategoryId.in_subquery(matching_categories.to_owned()));
    }
    if let Some(tag_name) = filter.tag_name.as_deref().filter(|s| !s.is_empty()) {
        let tagged = Query::select()
            .column((favourite_tag::Entity, favourite_tag::Column::FavouriteId))
            .from(favourite_tag::Entity)
            .inner_join(
                tag::Entity,
                Expr::col((tag::Entity, tag::Column::Id))
                    .equals((favourite_tag::Entity, favourite_tag::Column::TagId)),
            )
            .and_where(Expr::col((tag::Entity, tag::Column::Name)).eq(tag_name))
            .to_owned();
        query = query.filter(favourite::Column::Id.in_subquery(tagged));
    }
    if let Some(after) = filter.created_after {
        query = query.filter(favourite::Column::CreatedAt.gte(after));
    }
    if let Some(before) = filter.created_before {
        query = query.filter(favourite::Column::CreatedAt.lte(before));
    }
    if let Some(after) = filter.updated_after {
        query = query.filter(favourite::Column::UpdatedAt.gte(after));
    }
    if let Some(before) = filter.updated_before {
        query = query.filter(favourite::Column::UpdatedAt.lte(before));
    }
    query
}

/// Loads category and tags for a batch of favourites with two queries.
async fn load_details<C: ConnectionTrait>(
    conn: &C,
    favourites: Vec<favourite::Model>,
) -> Result<Vec<FavouriteDetails>, DbErr> {
    if favourites.is_empty() {
        return Ok(Vec::new());
    }

    let category_ids: Vec<i32> = favourites.iter().filter_map(|f| f.category_id).collect();
    let categories: HashMap<i32, category::Model> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        Category::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect()
    };

    let favourite_ids: Vec<i32> = favourites.iter().map(|f| f.id).collect();
    let mut tags_by_favourite: HashMap<i32, Vec<tag::Model>> = HashMap::new();
    for (link, tag) in FavouriteTag::find()
        .filter(favourite_tag::Column::FavouriteId.is_in(favourite_ids))
        .find_also_related(Tag)
        .all(conn)
        .await?
    {
        if let Some(tag) = tag {
            tags_by_favourite.entry(link.favourite_id).or_default().push(tag);
        }
    }

    Ok(favourites
        .into_iter()
        .map(|favourite| {
            let category = favourite.category_id.and_then(|id| categories.get(&id).cloned());
            let mut tags = tags_by_favourite.remove(&favourite.id).unwrap_or_default();
            tags.sort_by(|a, b| a.name.cmp(&b.name));
            FavouriteDetails { favourite, category, tags }
        })
        .collect())
}

async fn load_one<C: ConnectionTrait>(
    conn: &C,
    favourite: favourite::Model,
) -> Result<FavouriteDetails, DbErr> {
    let id = favourite.id;
    load_details(conn, vec![favourite])
        .await?
        .pop()
        .ok_or_else(|| DbErr::RecordNotFound(format!("favourite {id}")))
}

async fn link_tags<C: ConnectionTrait>(conn: &C, favourite_id: i32, tag_ids: &[i32]) -> Result<(), DbErr> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    let links = tag_ids.iter().map(|tag_id| favourite_tag::ActiveModel {
        favourite_id: Set(favourite_id),
        tag_id: Set(*tag_id),
    });
    FavouriteTag::insert_many(links).exec_without_returning(conn).await?;
    Ok(())
}

async fn unlink_all_tags<C: ConnectionTrait>(conn: &C, favourite_id: i32) -> Result<(), DbErr> {
    FavouriteTag::delete_many()
        .filter(favourite_tag::Column::FavouriteId.eq(favourite_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn touch<C: ConnectionTrait>(conn: &C, favourite: favourite::Model) -> Result<favourite::Model, DbErr> {
    let mut active: favourite::ActiveModel = favourite.into();
    active.updated_at = Set(Utc::now());
    active.update(conn).await
}

async fn url_taken(
    db: &DbConn,
    user_id: i32,
    url: &str,
    except_id: Option<i32>,
) -> Result<bool, DbErr> {
    let mut query = Favourite::find()
        .filter(favourite::Column::UserId.eq(user_id))
        .filter(favourite::Column::Url.eq(url));
    if let Some(id) = except_id {
        query = query.filter(favourite::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

fn map_write_err(db_err: DbErr, url: &str) -> FavouriteError {
    if is_unique_violation(&db_err) {
        FavouriteError::DuplicateUrl(url.to_string())
    } else {
        FavouriteError::DbErr(db_err)
    }
}

pub struct FavouriteService;

impl FavouriteService {
    pub async fn create_favourite(
        db: &DbConn,
        prober: &dyn LinkProber,
        user_id: i32,
        new: NewFavourite,
    ) -> Result<FavouriteDetails, FavouriteError> {
        let url = clean_url(&new.url)?;
        let requested_title = new.title.as_deref().map(clean_title).transpose()?;

        if url_taken(db, user_id, &url, None).await? {
            return Err(FavouriteError::DuplicateUrl(url));
        }

        let link = link_validity_service::resolve(db, prober, &url).await?;
        if !link.is_valid {
            return Err(FavouriteError::UnreachableUrl(url));
        }

        let title = match requested_title.filter(|t| !t.is_empty()) {
            Some(title) => title,
            None => link.title.unwrap_or_default().chars().take(MAX_TITLE_LEN).collect(),
        };
        let tag_ids = ownership::distinct_ids(&new.tag_ids);

        let txn = db.begin().await?;
        ownership::ensure_owned(&txn, user_id, new.category_id, &tag_ids).await?;

        let now = Utc::now();
        let favourite = favourite::ActiveModel {
            user_id: Set(user_id),
            url: Set(url.clone()),
            title: Set(title),
            category_id: Set(new.category_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| map_write_err(e, &url))?;

        link_tags(&txn, favourite.id, &tag_ids).await?;
        let details = load_one(&txn, favourite).await?;
        txn.commit().await?;

        info!(user_id, favourite_id = details.favourite.id, "Favourite created.");
        Ok(details)
    }

    async fn find_owned(db: &DbConn, favourite_id: i32, user_id: i32) -> Result<favourite::Model, FavouriteError> {
        Favourite::find_by_id(favourite_id)
            .filter(favourite::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(FavouriteError::NotFound(favourite_id))
    }

    pub async fn get_favourite(
        db: &DbConn,
        favourite_id: i32,
        user_id: i32,
    ) -> Result<FavouriteDetails, FavouriteError> {
        let favourite = Self::find_owned(db, favourite_id, user_id).await?;
        Ok(load_one(db, favourite).await?)
    }

    /// One page (1-based) of the user's favourites plus the total match count.
    pub async fn list_favourites(
        db: &DbConn,
        user_id: i32,
        filter: &FavouriteFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(u64, Vec<FavouriteDetails>), FavouriteError> {
        let query = apply_filter(Favourite::find(), filter, Some(user_id))
            .order_by_asc(favourite::Column::Id);
        let page_size = page_size.max(1);
        let page_index = page.saturating_sub(1);
        let paginator = query.paginate(db, page_size);
        let count = paginator.num_items().await?;

        // Past the end (or too far to even compute an offset): empty page.
        match page_index.checked_mul(page_size) {
            Some(offset) if offset < count => {
                let favourites = paginator.fetch_page(page_index).await?;
                Ok((count, load_details(db, favourites).await?))
            }
            _ => Ok((count, Vec::new())),
        }
    }

    /// Read-only lookup across every user, used by the `search` command.
    pub async fn search_favourites(
        db: &DbConn,
        filter: &FavouriteFilter,
    ) -> Result<Vec<favourite::Model>, FavouriteError> {
        Ok(apply_filter(Favourite::find(), filter, None)
            .order_by_asc(favourite::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn update_favourite(
        db: &DbConn,
        prober: &dyn LinkProber,
        favourite_id: i32,
        user_id: i32,
        changes: FavouriteChanges,
    ) -> Result<FavouriteDetails, FavouriteError> {
        let favourite = Self::find_owned(db, favourite_id, user_id).await?;

        let new_url = match changes.url.as_deref() {
            Some(raw) => {
                let url = clean_url(raw)?;
                if url == favourite.url {
                    None
                } else {
                    Some(url)
                }
            }
            None => None,
        };
        let new_title = changes.title.as_deref().map(clean_title).transpose()?;

        if let Some(url) = new_url.as_deref() {
            if url_taken(db, user_id, url, Some(favourite_id)).await? {
                return Err(FavouriteError::DuplicateUrl(url.to_string()));
            }
            let link = link_validity_service::resolve(db, prober, url).await?;
            if !link.is_valid {
                return Err(FavouriteError::UnreachableUrl(url.to_string()));
            }
        }

        let tag_ids = changes.tag_ids.as_deref().map(ownership::distinct_ids);

        let txn = db.begin().await?;
        ownership::ensure_owned(
            &txn,
            user_id,
            changes.category_id.flatten(),
            tag_ids.as_deref().unwrap_or(&[]),
        )
        .await?;

        let url_for_err = new_url.clone().unwrap_or_else(|| favourite.url.clone());
        let mut active: favourite::ActiveModel = favourite.into();
        if let Some(url) = new_url {
            active.url = Set(url);
        }
        if let Some(title) = new_title {
            active.title = Set(title);
        }
        if let Some(category_id) = changes.category_id {
            active.category_id = Set(category_id);
        }
        active.updated_at = Set(Utc::now());
        let favourite = active.update(&txn).await.map_err(|e| map_write_err(e, &url_for_err))?;

        if let Some(tag_ids) = tag_ids {
            unlink_all_tags(&txn, favourite.id).await?;
            link_tags(&txn, favourite.id, &tag_ids).await?;
        }

        let details = load_one(&txn, favourite).await?;
        txn.commit().await?;
        Ok(details)
    }

    /// Attaches tags on top of the existing ones.
    pub async fn add_tags(
        db: &DbConn,
        favourite_id: i32,
        user_id: i32,
        tag_ids: &[i32],
    ) -> Result<FavouriteDetails, FavouriteError> {
        let favourite = Self::find_owned(db, favourite_id, user_id).await?;
        let tag_ids = ownership::distinct_ids(tag_ids);

        let txn = db.begin().await?;
        ownership::ensure_owned(&txn, user_id, None, &tag_ids).await?;

        let existing: Vec<i32> = favourite
            .find_related(Tag)
            .all(&txn)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        let missing: Vec<i32> = tag_ids.into_iter().filter(|id| !existing.contains(id)).collect();
        link_tags(&txn, favourite.id, &missing).await?;

        let favourite = touch(&txn, favourite).await?;
        let details = load_one(&txn, favourite).await?;
        txn.commit().await?;
        Ok(details)
    }

    /// Replaces the tag set.
    pub async fn set_tags(
        db: &DbConn,
        favourite_id: i32,
        user_id: i32,
        tag_ids: &[i32],
    ) -> Result<FavouriteDetails, FavouriteError> {
        let favourite = Self::find_owned(db, favourite_id, user_id).await?;
        let tag_ids = ownership::distinct_ids(tag_ids);

        let txn = db.begin().await?;
        ownership::ensure_owned(&txn, user_id, None, &tag_ids).await?;
        unlink_all_tags(&txn, favourite.id).await?;
        link_tags(&txn, favourite.id, &tag_ids).await?;

        let favourite = touch(&txn, favourite).await?;
        let details = load_one(&txn, favourite).await?;
        txn.commit().await?;
        Ok(details)
    }

    pub async fn set_category(
        db: &DbConn,
        favourite_id: i32,
        user_id: i32,
        category_id: Option<i32>,
    ) -> Result<FavouriteDetails, FavouriteError> {
        let favourite = Self::find_owned(db, favourite_id, user_id).await?;

        let txn = db.begin().await?;
        ownership::ensure_owned(&txn, user_id, category_id, &[]).await?;
        let mut active: favourite::ActiveModel = favourite.into();
        active.category_id = Set(category_id);
        active.updated_at = Set(Utc::now());
        let favourite = active.update(&txn).await?;

        let details = load_one(&txn, favourite).await?;
        txn.commit().await?;
        Ok(details)
    }

    /// Removes the favourite; its tag links go with it.
    pub async fn delete_favourite(db: &DbConn, favourite_id: i32, user_id: i32) -> Result<(), FavouriteError> {
        let favourite = Self::find_owned(db, favourite_id, user_id).await?;
        let txn = db.begin().await?;
        unlink_all_tags(&txn, favourite.id).await?;
        favourite.delete(&txn).await?;
        txn.commit().await?;
        Ok(())
    }
}
