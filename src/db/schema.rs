//! Idempotent schema bootstrap derived from the entity definitions.
//!
//! Tables are created from the SeaORM entities (columns, primary keys and
//! foreign keys come from the entity/relation attributes). The composite
//! per-user uniqueness rules cannot be expressed on a single column, so they
//! are added here as unique indexes. These indexes are the authoritative
//! guard against concurrent duplicate inserts.

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{category, favourite, favourite_tag, link_validity, tag, user};

async fn create_table<E, C>(conn: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("uq_tags_user_id_name")
            .table(tag::Entity)
            .col(tag::Column::UserId)
            .col(tag::Column::Name)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uq_categories_user_id_name")
            .table(category::Entity)
            .col(category::Column::UserId)
            .col(category::Column::Name)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uq_favourites_user_id_url")
            .table(favourite::Entity)
            .col(favourite::Column::UserId)
            .col(favourite::Column::Url)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

/// Creates every table and index that does not exist yet.
pub async fn ensure_schema<C: ConnectionTrait>(conn: &C) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    // Order matters: referenced tables first.
    create_table(conn, &schema, user::Entity).await?;
    create_table(conn, &schema, tag::Entity).await?;
    create_table(conn, &schema, category::Entity).await?;
    create_table(conn, &schema, favourite::Entity).await?;
    create_table(conn, &schema, favourite_tag::Entity).await?;
    create_table(conn, &schema, link_validity::Entity).await?;

    for index in unique_indexes() {
        conn.execute(backend.build(&index)).await?;
    }

    info!("Database schema is up to date.");
    Ok(())
}
