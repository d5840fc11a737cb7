//! Port traits describing the backends the news pipeline depends on.
//!
//! Each backend is a single long-lived handle shared by every in-flight operation,
//! so implementations must be safe for concurrent use.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::query::{NewsDocument, NewsQuery, SearchQuery};
use crate::domain::entities::NewsRecord;
use crate::domain::news::NewsDraft;
use crate::domain::types::JobType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index name must not be empty")]
    InvalidIndex,
    #[error("document id must be positive, got {0}")]
    InvalidId(i64),
    #[error("search transport error: {0}")]
    Transport(String),
    #[error("[{status}] {kind}: {reason}")]
    Status {
        status: u16,
        kind: String,
        reason: String,
    },
    #[error("document {id} was not stored by any shard")]
    Rejected { id: i64 },
    #[error("failed to decode search response: {0}")]
    Decode(String),
    #[error("search request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache {operation} failed for `{key}`: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },
    #[error("cache {operation} timed out for `{key}`")]
    Timeout { operation: &'static str, key: String },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to encode queue message: {0}")]
    Encode(String),
    #[error("failed to publish to `{topic}`: {message}")]
    Publish { topic: &'static str, message: String },
    #[error("publishing to `{topic}` timed out")]
    Timeout { topic: &'static str },
}

/// Durable relational store for news items.
#[async_trait]
pub trait NewsRepo: Send + Sync {
    /// Persist a draft in a single transaction, assigning identity and creation time.
    ///
    /// Inserting a draft whose token is already stored returns the existing row.
    async fn create_news(&self, draft: &NewsDraft) -> Result<NewsRecord, RepoError>;

    /// Run a filtered, sorted, paginated select. Zero rows is `Ok(vec![])`.
    async fn list_news(&self, query: &NewsQuery) -> Result<Vec<NewsRecord>, RepoError>;

    /// Cheap connectivity check used by the health endpoint.
    async fn health_check(&self) -> Result<(), RepoError>;

    /// Load one item by identity, returning [`RepoError::NotFound`] when no row matches.
    async fn find_news(&self, id: i64) -> Result<NewsRecord, RepoError> {
        let query = NewsQuery::by_id(id);
        self.list_news(&query)
            .await?
            .into_iter()
            .next()
            .ok_or(RepoError::NotFound)
    }
}

/// Result of a paginated index search: identifiers in rank order plus the total match count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHits {
    pub ids: Vec<i64>,
    pub total: u64,
}

/// Secondary index of news identifiers, kept eventually consistent with the store.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upsert a document; it must be searchable as soon as this returns.
    async fn index_news(&self, index: &str, document: &NewsDocument) -> Result<(), SearchError>;

    async fn search_ids(&self, index: &str, query: &SearchQuery)
    -> Result<SearchHits, SearchError>;
}

/// One batch of a cursor-based key scan. A `cursor` of zero ends the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanBatch {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// String key/value cache holding serialized pages.
#[async_trait]
pub trait ReadCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn scan(&self, cursor: u64, pattern: &str) -> Result<ScanBatch, CacheError>;

    /// Enumerate every key matching `pattern`, following the cursor until the backend
    /// reports completion. A single batch is never assumed to be complete.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut cursor = 0;
        let mut keys = Vec::new();
        loop {
            let batch = self.scan(cursor, pattern).await?;
            keys.extend(batch.keys);
            if batch.cursor == 0 {
                break;
            }
            cursor = batch.cursor;
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

/// Durable at-least-once message channel.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Publish an opaque payload under `topic`, returning the queue-assigned message id.
    async fn publish(&self, topic: JobType, payload: &[u8]) -> Result<String, QueueError>;
}
