pub mod cache;
pub mod error;
pub mod feed;
pub mod sources;
pub mod types;
