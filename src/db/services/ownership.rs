//! The one place that decides whether associations may be attached to a
//! favourite. Every mutation path (create, update, add tags, set tags,
//! set category) calls [`ensure_owned`] inside its transaction before it
//! writes, so there is no way to attach another user's tag or category.

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter};
use std::collections::BTreeSet;

use crate::db::entities::{category, tag};

#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    #[error("Tag must belong to the same user.")]
    ForeignTag,
    #[error("Category must belong to the same user.")]
    ForeignCategory,
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
}

/// Collapses duplicated ids while keeping a stable order.
pub fn distinct_ids(ids: &[i32]) -> Vec<i32> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Verifies that `category_id` and every id in `tag_ids` belong to `user_id`.
///
/// Ids that do not exist at all fail the same way as ids owned by someone
/// else, so the caller cannot probe for other users' rows.
pub async fn ensure_owned<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    category_id: Option<i32>,
    tag_ids: &[i32],
) -> Result<(), OwnershipError> {
    if let Some(category_id) = category_id {
        let owned = category::Entity::find_by_id(category_id)
            .filter(category::Column::UserId.eq(user_id))
            .count(conn)
            .await?;
        if owned == 0 {
            return Err(OwnershipError::ForeignCategory);
        }
    }

    let tag_ids = distinct_ids(tag_ids);
    if !tag_ids.is_empty() {
        let owned = tag::Entity::find()
            .filter(tag::Column::Id.is_in(tag_ids.clone()))
            .filter(tag::Column::UserId.eq(user_id))
            .count(conn)
            .await?;
        if owned != tag_ids.len() as u64 {
            return Err(OwnershipError::ForeignTag);
        }
    }

    Ok(())
}
