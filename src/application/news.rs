//! Submission, cache-fronted reads and cache invalidation for news items.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    application::{
        cache_keys::{CacheKey, NEWS_RESOURCE},
        fanout,
        jobs::publish_draft,
        query::{PageNumber, RESULT_WINDOW, SearchQuery},
        repos::{
            CacheError, NewsRepo, QueueError, ReadCache, RepoError, SearchError, SearchIndex,
            WorkQueue,
        },
    },
    config,
    domain::news::{NewsDraft, NewsPage},
};

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news {id} not found")]
    NotFound { id: i64 },
    #[error("item store {operation} failed: {source}")]
    Repo {
        operation: &'static str,
        #[source]
        source: RepoError,
    },
    #[error("search {operation} failed: {source}")]
    Search {
        operation: &'static str,
        #[source]
        source: SearchError,
    },
    #[error("cache {operation} failed: {source}")]
    Cache {
        operation: &'static str,
        #[source]
        source: CacheError,
    },
    #[error("failed to invalidate {failed} of {total} cached pages: {source}")]
    Invalidation {
        failed: usize,
        total: usize,
        #[source]
        source: CacheError,
    },
    #[error("failed to enqueue news: {0}")]
    Queue(#[source] QueueError),
}

#[derive(Debug, Clone)]
pub struct NewsOptions {
    pub index: String,
    pub page_size: u32,
    pub fanout_concurrency: usize,
}

impl NewsOptions {
    pub fn from_settings(search: &config::SearchSettings, news: &config::NewsSettings) -> Self {
        Self {
            index: search.index.clone(),
            page_size: news.page_size.get(),
            fanout_concurrency: news.fanout_concurrency.get() as usize,
        }
    }
}

impl Default for NewsOptions {
    fn default() -> Self {
        Self {
            index: NEWS_RESOURCE.to_string(),
            page_size: 10,
            fanout_concurrency: 16,
        }
    }
}

pub struct NewsService {
    repo: Arc<dyn NewsRepo>,
    search: Arc<dyn SearchIndex>,
    cache: Arc<dyn ReadCache>,
    queue: Arc<dyn WorkQueue>,
    options: NewsOptions,
}

impl NewsService {
    pub fn new(
        repo: Arc<dyn NewsRepo>,
        search: Arc<dyn SearchIndex>,
        cache: Arc<dyn ReadCache>,
        queue: Arc<dyn WorkQueue>,
        options: NewsOptions,
    ) -> Self {
        Self {
            repo,
            search,
            cache,
            queue,
            options,
        }
    }

    pub fn options(&self) -> &NewsOptions {
        &self.options
    }

    /// Enqueue a new item for ingestion and drop every cached page.
    ///
    /// Returns once the queue has accepted the message; the item becomes visible to reads
    /// only after the worker has persisted and indexed it. Author and body are taken as
    /// given; rejecting empty values is up to the caller.
    pub async fn submit(&self, author: &str, body: &str) -> Result<(), NewsError> {
        let draft = NewsDraft::new(author, body);
        let job_id = publish_draft(self.queue.as_ref(), &draft)
            .await
            .map_err(NewsError::Queue)?;
        counter!("newsfeed_news_submitted_total").increment(1);
        info!(
            target = "newsfeed::news::submit",
            job_id = %job_id,
            token = %draft.token,
            "news enqueued"
        );

        if let Err(err) = self.invalidate_pages().await {
            warn!(
                target = "newsfeed::news::submit",
                error = %err,
                "cache invalidation after submit failed"
            );
        }

        Ok(())
    }

    /// Serve one page, newest first, from the cache or by rebuilding it.
    pub async fn read_page(&self, page: PageNumber) -> Result<NewsPage, NewsError> {
        let started = Instant::now();
        let key = CacheKey::search_page(NEWS_RESOURCE, page).render();

        if let Some(cached) = self.cached_page(&key).await? {
            counter!("newsfeed_cache_hit_total").increment(1);
            histogram!("newsfeed_read_page_seconds", "source" => "cache")
                .record(started.elapsed().as_secs_f64());
            return Ok(cached);
        }
        counter!("newsfeed_cache_miss_total").increment(1);

        let LoadedPage { items, past_end } = self.load_page(page).await?;

        if past_end {
            debug!(
                target = "newsfeed::news::read_page",
                key = %key,
                "page lies past the last item; not cached"
            );
        } else {
            self.populate(&key, &items).await;
        }

        histogram!("newsfeed_read_page_seconds", "source" => "backends")
            .record(started.elapsed().as_secs_f64());
        Ok(items)
    }

    /// Delete every cached page, returning how many keys were removed.
    ///
    /// All deletions are attempted even when some fail; keys already deleted stay deleted.
    pub async fn invalidate_pages(&self) -> Result<usize, NewsError> {
        let pattern = CacheKey::search_pattern(NEWS_RESOURCE);
        let keys = self
            .cache
            .scan_keys(&pattern)
            .await
            .map_err(|source| NewsError::Cache {
                operation: "scan",
                source,
            })?;

        let total = keys.len();
        let cache = &self.cache;
        let outcomes =
            fanout::join_all_ordered(keys, self.options.fanout_concurrency, |key| async move {
                cache.delete(&key).await
            })
            .await;

        let mut failures = outcomes.into_iter().filter_map(Result::err);
        let first = failures.next();
        let failed = first.as_ref().map_or(0, |_| 1 + failures.count());
        counter!("newsfeed_cache_invalidated_keys_total").increment((total - failed) as u64);

        match first {
            Some(source) => Err(NewsError::Invalidation {
                failed,
                total,
                source,
            }),
            None => {
                debug!(
                    target = "newsfeed::news::invalidate_pages",
                    deleted = total,
                    "cached pages invalidated"
                );
                Ok(total)
            }
        }
    }

    /// A cache that cannot be reached fails the read; an entry that does not decode is a miss.
    async fn cached_page(&self, key: &str) -> Result<Option<NewsPage>, NewsError> {
        let Some(raw) = self
            .lookup(key)
            .await
            .map_err(|source| NewsError::Cache {
                operation: "lookup",
                source,
            })?
        else {
            return Ok(None);
        };

        match serde_json::from_str::<NewsPage>(&raw) {
            Ok(page) => Ok(Some(page)),
            Err(err) => {
                warn!(
                    target = "newsfeed::news::read_page",
                    key = %key,
                    error = %err,
                    "cached page is unreadable; treating as miss"
                );
                Ok(None)
            }
        }
    }

    async fn populate(&self, key: &str, items: &NewsPage) {
        let serialized = match serde_json::to_string(items) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(
                    target = "newsfeed::news::read_page",
                    key = %key,
                    error = %err,
                    "failed to serialize page for cache"
                );
                return;
            }
        };
        if let Err(err) = self.cache.set(key, &serialized).await {
            warn!(
                target = "newsfeed::news::read_page",
                key = %key,
                error = %err,
                "failed to populate cache"
            );
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, CacheError> {
        if !self.cache.exists(key).await? {
            return Ok(None);
        }
        self.cache.get(key).await
    }

    async fn load_page(&self, page: PageNumber) -> Result<LoadedPage, NewsError> {
        let Some(query) =
            SearchQuery::newest_first(page, self.options.page_size).within_window(RESULT_WINDOW)
        else {
            return Ok(LoadedPage::past_end());
        };

        let hits = self
            .search
            .search_ids(&self.options.index, &query)
            .await
            .map_err(|source| NewsError::Search {
                operation: "search",
                source,
            })?;

        if hits.ids.is_empty() {
            return Ok(LoadedPage {
                items: Vec::new(),
                past_end: query.from() > 0 && hits.total <= query.from(),
            });
        }

        let repo = &self.repo;
        let concurrency = self.options.fanout_concurrency;
        let items = fanout::try_join_ordered(hits.ids, concurrency, |id| async move {
            repo.find_news(id).await.map_err(|source| match source {
                RepoError::NotFound => NewsError::NotFound { id },
                source => NewsError::Repo {
                    operation: "find_news",
                    source,
                },
            })
        })
        .await?;

        Ok(LoadedPage {
            items,
            past_end: false,
        })
    }
}

struct LoadedPage {
    items: NewsPage,
    /// Nothing exists at or after this page's offset, so caching it would only add keys.
    past_end: bool,
}

impl LoadedPage {
    fn past_end() -> Self {
        Self {
            items: Vec::new(),
            past_end: true,
        }
    }
}
