//! SeaORM Entity Crate
//!
//! Defines the SeaORM entities that map to database tables.
//! Each entity is defined in its own module.

pub mod user;
pub mod tag;
pub mod category;
pub mod favourite;
pub mod favourite_tag;
pub mod link_validity;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;
    pub use super::user::ActiveModel as UserActiveModel;
    pub use super::user::Column as UserColumn;

    pub use super::tag::Entity as Tag;
    pub use super::tag::Model as TagModel;
    pub use super::tag::ActiveModel as TagActiveModel;
    pub use super::tag::Column as TagColumn;

    pub use super::category::Entity as Category;
    pub use super::category::Model as CategoryModel;
    pub use super::category::ActiveModel as CategoryActiveModel;
    pub use super::category::Column as CategoryColumn;

    pub use super::favourite::Entity as Favourite;
    pub use super::favourite::Model as FavouriteModel;
    pub use super::favourite::ActiveModel as FavouriteActiveModel;
    pub use super::favourite::Column as FavouriteColumn;

    pub use super::favourite_tag::Entity as FavouriteTag;
    pub use super::favourite_tag::Model as FavouriteTagModel;
    pub use super::favourite_tag::ActiveModel as FavouriteTagActiveModel;
    pub use super::favourite_tag::Column as FavouriteTagColumn;

    pub use super::link_validity::Entity as LinkValidity;
    pub use super::link_validity::Model as LinkValidityModel;
    pub use super::link_validity::ActiveModel as LinkValidityActiveModel;
    pub use super::link_validity::Column as LinkValidityColumn;
}
