//! The `services` module provides a high-level API for interacting with the database.
//! It encapsulates the query logic and data access patterns, allowing the rest of
//! the application (HTTP handlers, maintenance jobs, the CLI) to work with domain models
//! without needing to know about the underlying schema.

pub mod category_service;
pub mod favourite_service;
pub mod link_validity_service;
pub mod ownership;
pub mod tag_service;
pub mod user_service;

pub use category_service::{CategoryError, CategoryService};
pub use favourite_service::{
    FavouriteChanges, FavouriteDetails, FavouriteError, FavouriteFilter, FavouriteService, NewFavourite,
};
pub use link_validity_service::RefreshSummary;
pub use ownership::OwnershipError;
pub use tag_service::{TagError, TagService};
pub use user_service::UserError;
