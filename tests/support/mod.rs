#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use newsfeed::application::jobs::{IngestWorker, NewsMessage};
use newsfeed::application::news::{NewsOptions, NewsService};
use newsfeed::application::query::{
    FilterOp, FilterValue, NewsColumn, NewsDocument, NewsQuery, SearchQuery, SortDirection,
};
use newsfeed::application::repos::{
    CacheError, NewsRepo, QueueError, ReadCache, RepoError, ScanBatch, SearchError, SearchHits,
    SearchIndex, WorkQueue,
};
use newsfeed::domain::entities::NewsRecord;
use newsfeed::domain::news::NewsDraft;
use newsfeed::domain::types::JobType;

pub const INDEX: &str = "news";

#[derive(Default)]
struct StoreState {
    rows: BTreeMap<i64, NewsRecord>,
    tokens: HashMap<Uuid, i64>,
    next_id: i64,
}

/// Item store keeping rows in memory, with per-id latency and failure injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    delays: Mutex<HashMap<i64, Duration>>,
    failing_finds: Mutex<HashSet<i64>>,
    unhealthy: AtomicBool,
    pub creates: AtomicUsize,
    pub finds: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn remove(&self, id: i64) {
        self.state.lock().await.rows.remove(&id);
    }

    pub async fn delay_find(&self, id: i64, delay: Duration) {
        self.delays.lock().await.insert(id, delay);
    }

    pub async fn fail_find(&self, id: i64) {
        self.failing_finds.lock().await.insert(id);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }
}

fn compare(op: FilterOp, left: i64, right: i64) -> bool {
    match op {
        FilterOp::Eq => left == right,
        FilterOp::NotEq => left != right,
        FilterOp::Lt => left < right,
        FilterOp::Gt => left > right,
        FilterOp::Le => left <= right,
        FilterOp::Ge => left >= right,
        _ => true,
    }
}

#[async_trait]
impl NewsRepo for MemoryStore {
    async fn create_news(&self, draft: &NewsDraft) -> Result<NewsRecord, RepoError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if let Some(id) = state.tokens.get(&draft.token) {
            if let Some(existing) = state.rows.get(id) {
                return Ok(existing.clone());
            }
        }

        state.next_id += 1;
        let id = state.next_id;
        let record = NewsRecord {
            id,
            author: draft.author.clone(),
            body: draft.body.clone(),
            created: OffsetDateTime::now_utc(),
        };
        state.tokens.insert(draft.token, id);
        state.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn list_news(&self, query: &NewsQuery) -> Result<Vec<NewsRecord>, RepoError> {
        let ids: Vec<i64> = query
            .filters
            .iter()
            .filter(|filter| filter.column == NewsColumn::Id)
            .filter_map(|filter| match filter.value {
                Some(FilterValue::Int(id)) if filter.op == FilterOp::Eq => Some(id),
                _ => None,
            })
            .collect();

        if let Some(&id) = ids.first() {
            self.finds.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().await.get(&id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_finds.lock().await.contains(&id) {
                return Err(RepoError::Timeout);
            }
        }

        let state = self.state.lock().await;
        let mut rows: Vec<NewsRecord> = state
            .rows
            .values()
            .filter(|record| {
                query.filters.iter().all(|filter| match (&filter.value, filter.column) {
                    (Some(FilterValue::Int(value)), NewsColumn::Id) => {
                        compare(filter.op, record.id, *value)
                    }
                    _ => true,
                })
            })
            .cloned()
            .collect();

        if let Some((_, direction)) = query.sort.first() {
            if *direction == SortDirection::Desc {
                rows.reverse();
            }
        }
        let offset = query.offset() as usize;
        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Search index ordering documents by their formatted creation time.
#[derive(Default)]
pub struct MemoryIndex {
    documents: Mutex<BTreeMap<i64, String>>,
    indexed: Mutex<Vec<i64>>,
    fail_next_index: AtomicUsize,
    fail_search: AtomicBool,
    pub index_calls: AtomicUsize,
    pub searches: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    /// Ids of every accepted index call, in call order.
    pub async fn indexed_ids(&self) -> Vec<i64> {
        self.indexed.lock().await.clone()
    }

    /// Reject the next `count` index calls.
    pub fn fail_next_index(&self, count: usize) {
        self.fail_next_index.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Point an extra document at an id the store does not hold.
    pub async fn insert_raw(&self, id: i64, created: &str) {
        self.documents.lock().await.insert(id, created.to_string());
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn index_news(&self, index: &str, document: &NewsDocument) -> Result<(), SearchError> {
        if index.is_empty() {
            return Err(SearchError::InvalidIndex);
        }
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_next_index.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_index.store(pending - 1, Ordering::SeqCst);
            return Err(SearchError::Transport("connection reset".to_string()));
        }
        self.documents
            .lock()
            .await
            .insert(document.id, document.created.clone());
        self.indexed.lock().await.push(document.id);
        Ok(())
    }

    async fn search_ids(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchHits, SearchError> {
        if index.is_empty() {
            return Err(SearchError::InvalidIndex);
        }
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(SearchError::Status {
                status: 503,
                kind: "unavailable".to_string(),
                reason: "no shards".to_string(),
            });
        }

        let documents = self.documents.lock().await;
        let mut ordered: Vec<(&String, i64)> = documents
            .iter()
            .map(|(id, created)| (created, *id))
            .collect();
        ordered.sort_by(|left, right| right.cmp(left));

        let ids = ordered
            .into_iter()
            .skip(query.from() as usize)
            .take(query.size as usize)
            .map(|(_, id)| id)
            .collect();
        Ok(SearchHits {
            ids,
            total: documents.len() as u64,
        })
    }
}

/// Key/value cache whose SCAN returns at most `scan_batch` keys per call.
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, String>>,
    scan_batch: usize,
    failing_deletes: Mutex<HashSet<String>>,
    fail_reads: AtomicBool,
    pub scans: AtomicUsize,
    pub sets: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_scan_batch(3)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_batch(scan_batch: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            scan_batch: scan_batch.max(1),
            failing_deletes: Mutex::new(HashSet::new()),
            fail_reads: AtomicBool::new(false),
            scans: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    pub async fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    pub async fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().await.insert(key.to_string());
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn read_error(operation: &'static str, key: &str) -> CacheError {
        CacheError::Backend {
            operation,
            key: key.to_string(),
            message: "connection reset by peer".to_string(),
        }
    }
}

fn glob_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

#[async_trait]
impl ReadCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::read_error("get", key));
        }
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::read_error("exists", key));
        }
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if self.failing_deletes.lock().await.contains(key) {
            return Err(Self::read_error("delete", key));
        }
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn scan(&self, cursor: u64, pattern: &str) -> Result<ScanBatch, CacheError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().await;
        let matching: Vec<String> = entries
            .keys()
            .filter(|key| glob_matches(pattern, key))
            .cloned()
            .collect();

        let start = cursor as usize;
        let end = (start + self.scan_batch).min(matching.len());
        let keys = matching.get(start..end).map(<[String]>::to_vec).unwrap_or_default();
        let cursor = if end >= matching.len() { 0 } else { end as u64 };
        Ok(ScanBatch { cursor, keys })
    }
}

/// Work queue recording every published payload in order.
#[derive(Default)]
pub struct RecordingQueue {
    published: Mutex<Vec<(JobType, Vec<u8>)>>,
    fail: AtomicBool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<(JobType, Vec<u8>)> {
        self.published.lock().await.clone()
    }

    /// Remove and return every pending message, as the consumer would receive it.
    pub async fn take_messages(&self) -> Vec<NewsMessage> {
        self.published
            .lock()
            .await
            .drain(..)
            .map(|(_, payload)| NewsMessage::from_bytes(&payload))
            .collect()
    }
}

#[async_trait]
impl WorkQueue for RecordingQueue {
    async fn publish(&self, topic: JobType, payload: &[u8]) -> Result<String, QueueError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueueError::Publish {
                topic: topic.as_str(),
                message: "broker unavailable".to_string(),
            });
        }
        let mut published = self.published.lock().await;
        published.push((topic, payload.to_vec()));
        Ok(published.len().to_string())
    }
}

/// Every backend wired into a service and a worker, as the binary does.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub cache: Arc<MemoryCache>,
    pub queue: Arc<RecordingQueue>,
    pub service: Arc<NewsService>,
    pub worker: IngestWorker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(NewsOptions::default())
    }

    pub fn with_options(options: NewsOptions) -> Self {
        Self::with_cache(Arc::new(MemoryCache::new()), options)
    }

    pub fn with_cache(cache: Arc<MemoryCache>, options: NewsOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new());
        let queue = Arc::new(RecordingQueue::new());
        let index_name = options.index.clone();

        let service = Arc::new(NewsService::new(
            store.clone(),
            index.clone(),
            cache.clone(),
            queue.clone(),
            options,
        ));
        let worker = IngestWorker::new(store.clone(), index.clone(), index_name);

        Self {
            store,
            index,
            cache,
            queue,
            service,
            worker,
        }
    }

    /// Submit and fully ingest `count` items, returning their ids in submission order.
    pub async fn seed(&self, count: usize) -> Vec<i64> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            self.service
                .submit(&format!("author-{n}"), &format!("body {n}"))
                .await
                .expect("submit");
            for message in self.queue.take_messages().await {
                let record = self.worker.handle(&message).await.expect("ingest");
                ids.push(record.id);
            }
            // Distinct creation times keep the newest-first order unambiguous.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        ids
    }

    pub async fn drain_queue(&self) -> Vec<NewsRecord> {
        let mut records = Vec::new();
        for message in self.queue.take_messages().await {
            records.push(self.worker.handle(&message).await.expect("ingest"));
        }
        records
    }
}

pub fn options(page_size: u32) -> NewsOptions {
    NewsOptions {
        page_size,
        ..NewsOptions::default()
    }
}
