pub mod category_routes;
pub mod favourite_routes;
pub mod link_routes;
pub mod tag_routes;
