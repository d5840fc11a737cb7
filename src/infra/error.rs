use thiserror::Error;

use crate::application::repos::SearchError;

/// Failure while bringing a backend up or tearing the process down.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database url is not configured")]
    MissingDatabaseUrl,
    #[error("database unavailable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("search index unavailable: {0}")]
    Search(#[from] SearchError),
    #[error("read cache unavailable: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}
