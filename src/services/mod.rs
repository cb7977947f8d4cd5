pub mod auth_service;
pub mod link_probe;
