pub mod config;
pub mod jobs;
