//! Ingestion worker: turns queued drafts into stored, indexed news items.

use std::sync::Arc;

use apalis::prelude::{Data, Error as ApalisError};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    application::{
        query::NewsDocument,
        repos::{NewsRepo, RepoError, SearchError, SearchIndex},
    },
    domain::{entities::NewsRecord, error::DomainError, types::JobState},
};

use super::{
    context::{IngestContext, job_aborted, job_failed},
    message::{MessageError, NewsMessage},
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed news message: {0}")]
    Malformed(#[from] MessageError),
    #[error("failed to persist news: {0}")]
    Persist(#[source] RepoError),
    #[error(transparent)]
    Invariant(#[from] DomainError),
    #[error("failed to index news {id}: {source}")]
    Index {
        id: i64,
        #[source]
        source: SearchError,
    },
}

impl IngestError {
    /// State the job storage records for a message that failed with this error.
    pub fn outcome(&self) -> JobState {
        match self {
            IngestError::Malformed(_) => JobState::Killed,
            IngestError::Persist(_) | IngestError::Invariant(_) | IngestError::Index { .. } => {
                JobState::Failed
            }
        }
    }

    pub fn into_job_error(self) -> ApalisError {
        match self.outcome() {
            JobState::Killed => job_aborted(self),
            _ => job_failed(self),
        }
    }
}

pub struct IngestWorker {
    repo: Arc<dyn NewsRepo>,
    search: Arc<dyn SearchIndex>,
    index: String,
}

impl IngestWorker {
    pub fn new(repo: Arc<dyn NewsRepo>, search: Arc<dyn SearchIndex>, index: impl Into<String>) -> Self {
        Self {
            repo,
            search,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Decode, persist and index one message.
    ///
    /// The store insert is idempotent on the draft token, so a redelivered message whose
    /// previous attempt failed at indexing resolves to the same record.
    pub async fn handle(&self, message: &NewsMessage) -> Result<NewsRecord, IngestError> {
        let draft = message.to_draft()?;

        let record = self
            .repo
            .create_news(&draft)
            .await
            .map_err(IngestError::Persist)?;
        record.validate_persisted()?;

        let document = NewsDocument::from_record(&record)
            .map_err(|err| DomainError::invariant(format!("unformattable timestamp: {err}")))?;

        self.search
            .index_news(&self.index, &document)
            .await
            .map_err(|source| IngestError::Index {
                id: record.id,
                source,
            })?;

        Ok(record)
    }
}

/// Job handler registered with the ingestion worker.
pub async fn process_news_message(
    message: NewsMessage,
    context: Data<IngestContext>,
) -> Result<(), ApalisError> {
    match context.worker.handle(&message).await {
        Ok(record) => {
            counter!("newsfeed_news_ingested_total", "outcome" => JobState::Done.as_str())
                .increment(1);
            info!(
                target = "newsfeed::jobs::ingest",
                id = record.id,
                index = context.worker.index(),
                "news ingested"
            );
            Ok(())
        }
        Err(err) => {
            let outcome = err.outcome();
            counter!("newsfeed_news_ingested_total", "outcome" => outcome.as_str()).increment(1);
            warn!(
                target = "newsfeed::jobs::ingest",
                error = %err,
                outcome = outcome.as_str(),
                "news ingestion failed"
            );
            Err(err.into_job_error())
        }
    }
}
