//! Application services layer.

pub mod cache_keys;
pub mod error;
pub mod fanout;
pub mod jobs;
pub mod news;
pub mod query;
pub mod reindex;
pub mod repos;
