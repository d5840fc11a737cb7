//! Work queue backed by apalis job storage in Postgres.

use std::{future::Future, time::Duration};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::{
    application::{
        jobs::{IngestContext, NewsMessage, process_news_message},
        repos::{QueueError, WorkQueue},
    },
    config::QueueSettings,
    domain::types::{JobState, JobType},
    infra::deadline::with_deadline,
};

pub const INGEST_WORKER_NAME: &str = "ingest-news-worker";

#[derive(Clone)]
pub struct PostgresWorkQueue {
    pool: PgPool,
    max_attempts: i32,
    timeout: Duration,
}

impl PostgresWorkQueue {
    pub fn new(pool: PgPool, max_attempts: i32, timeout: Duration) -> Self {
        Self {
            pool,
            max_attempts,
            timeout,
        }
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn publish(&self, topic: JobType, payload: &[u8]) -> Result<String, QueueError> {
        let message = NewsMessage::from_bytes(payload);
        let job = serde_json::to_value(&message).map_err(|err| QueueError::Encode(err.to_string()))?;

        with_deadline(
            self.timeout,
            async {
                sqlx::query_scalar::<_, String>(
                    "SELECT (apalis.push_job($1, $2::json, $3, now(), $4, 0)).id",
                )
                .bind(topic.as_str())
                .bind(job)
                .bind(JobState::Pending.as_str())
                .bind(self.max_attempts)
                .fetch_one(&self.pool)
                .await
                .map_err(|err| QueueError::Publish {
                    topic: topic.as_str(),
                    message: err.to_string(),
                })
            },
            || QueueError::Timeout {
                topic: topic.as_str(),
            },
        )
        .await
    }
}

/// Consume `NEWS_ADD` messages until `shutdown` resolves.
///
/// No new messages are fetched after the signal. The returned future resolves only once every
/// handler already running has finished; nothing is cut off mid-message.
pub async fn run_ingestion<S>(
    pool: PgPool,
    context: IngestContext,
    settings: &QueueSettings,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let topic = JobType::CreateNews;
    let config = ApalisSqlConfig::new(topic.as_str())
        .set_buffer_size(settings.max_in_flight.get() as usize)
        .set_poll_interval(settings.poll_interval);
    let storage: PostgresStorage<NewsMessage> = PostgresStorage::new_with_config(pool, config);

    let worker = WorkerBuilder::new(INGEST_WORKER_NAME)
        .concurrency(settings.worker_concurrency.get() as usize)
        .data(context)
        .backend(storage)
        .build_fn(process_news_message);

    info!(
        target = "newsfeed::queue",
        topic = topic.as_str(),
        channel = topic.channel(),
        concurrency = settings.worker_concurrency.get(),
        max_in_flight = settings.max_in_flight.get(),
        "ingestion worker starting"
    );

    Monitor::new()
        .register(worker)
        .run_with_signal(async move {
            shutdown.await;
            info!(target = "newsfeed::queue", "ingestion worker draining");
            Ok(())
        })
        .await
}
