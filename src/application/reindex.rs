//! Rebuild the search index from the item store.
//!
//! Items are read in ascending id order, one batch at a time, and indexed with bounded
//! concurrency. Re-indexing an item overwrites its document, so the command can be rerun.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{StreamExt, TryStreamExt, stream};
use thiserror::Error;
use tracing::info;

use crate::{
    application::{
        query::{FilterOp, FilterValue, NewsColumn, NewsDocument, NewsQuery, SortDirection},
        repos::{NewsRepo, RepoError, SearchError, SearchIndex},
    },
    domain::error::DomainError,
};

#[derive(Debug, Error)]
pub enum ReindexError {
    #[error("failed to load news batch: {0}")]
    Repo(#[from] RepoError),
    #[error("failed to index news {id}: {source}")]
    Index {
        id: i64,
        #[source]
        source: SearchError,
    },
    #[error(transparent)]
    Invariant(#[from] DomainError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub indexed: usize,
    pub batches: usize,
}

pub async fn reindex_all(
    repo: &dyn NewsRepo,
    search: &dyn SearchIndex,
    index: &str,
    batch_size: u32,
    concurrency: usize,
) -> Result<ReindexReport, ReindexError> {
    let batch_size = batch_size.max(1);
    let indexed = AtomicUsize::new(0);
    let mut batches = 0;
    let mut last_id = 0_i64;

    loop {
        let query = NewsQuery::default()
            .filter(NewsColumn::Id, FilterOp::Gt, FilterValue::Int(last_id))
            .sort_by(NewsColumn::Id, SortDirection::Asc)
            .limit(batch_size);
        let records = repo.list_news(&query).await?;
        let Some(last) = records.last() else {
            break;
        };
        last_id = last.id;
        batches += 1;
        let full_batch = records.len() as u64 == u64::from(batch_size);

        stream::iter(records)
            .map(Ok::<_, ReindexError>)
            .try_for_each_concurrent(Some(concurrency.max(1)), |record| {
                let indexed = &indexed;
                async move {
                    record.validate_persisted()?;
                    let document = NewsDocument::from_record(&record).map_err(|err| {
                        DomainError::invariant(format!("unformattable timestamp: {err}"))
                    })?;
                    search
                        .index_news(index, &document)
                        .await
                        .map_err(|source| ReindexError::Index {
                            id: record.id,
                            source,
                        })?;
                    indexed.fetch_add(1, Ordering::Relaxed);
                    Ok::<(), ReindexError>(())
                }
            })
            .await?;

        info!(
            target = "newsfeed::reindex",
            batch = batches,
            last_id,
            indexed = indexed.load(Ordering::Relaxed),
            "indexed batch"
        );

        if !full_batch {
            break;
        }
    }

    Ok(ReindexReport {
        indexed: indexed.into_inner(),
        batches,
    })
}
