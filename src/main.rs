use std::{process, sync::Arc};

use newsfeed::{
    application::{
        error::AppError,
        jobs::{IngestContext, IngestWorker},
        news::{NewsOptions, NewsService},
        reindex::reindex_all,
        repos::{NewsRepo, ReadCache, SearchIndex, WorkQueue},
    },
    config,
    infra::{
        cache::RedisCache,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        queue::{PostgresWorkQueue, run_ingestion},
        search::ElasticsearchIndex,
        shutdown::Shutdown,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Reindex(args) => run_reindex(settings, args).await,
    }
}

/// Long-lived backend handles, built once and shared by every service.
struct Backends {
    store: Arc<PostgresRepositories>,
    search: Arc<ElasticsearchIndex>,
}

async fn init_backends(settings: &config::Settings) -> Result<Backends, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingDatabaseUrl)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.backends.timeout,
    )
    .await
    .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    let search = ElasticsearchIndex::new(&settings.search.url, settings.backends.timeout)
        .map_err(InfraError::from)?;
    search.ping().await.map_err(InfraError::from)?;
    search
        .ensure_index(&settings.search.index)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "newsfeed::bootstrap",
        search = %settings.search.url,
        index = %settings.search.index,
        "backends ready"
    );

    Ok(Backends {
        store: Arc::new(PostgresRepositories::new(pool, settings.backends.timeout)),
        search: Arc::new(search),
    })
}

fn ingest_context(backends: &Backends, settings: &config::Settings) -> IngestContext {
    let repo: Arc<dyn NewsRepo> = backends.store.clone();
    let search: Arc<dyn SearchIndex> = backends.search.clone();
    IngestContext {
        worker: Arc::new(IngestWorker::new(repo, search, settings.search.index.clone())),
    }
}

fn spawn_ingestion(
    backends: &Backends,
    settings: &config::Settings,
    shutdown: &Shutdown,
) -> tokio::task::JoinHandle<()> {
    let pool = backends.store.pool().clone();
    let context = ingest_context(backends, settings);
    let queue = settings.queue.clone();
    let signal = shutdown.clone().wait();

    tokio::spawn(async move {
        if let Err(err) = run_ingestion(pool, context, &queue, signal).await {
            error!(target = "newsfeed::queue", error = %err, "ingestion worker stopped");
        }
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let backends = init_backends(&settings).await?;

    let cache = RedisCache::connect(&settings.cache.url, settings.backends.timeout)
        .await
        .map_err(InfraError::from)?;
    let max_attempts = i32::try_from(settings.queue.max_attempts.get())
        .map_err(|_| AppError::validation("queue.max_attempts exceeds i32 range"))?;
    let queue = PostgresWorkQueue::new(
        backends.store.pool().clone(),
        max_attempts,
        settings.backends.timeout,
    );

    let store: Arc<dyn NewsRepo> = backends.store.clone();
    let search: Arc<dyn SearchIndex> = backends.search.clone();
    let cache: Arc<dyn ReadCache> = Arc::new(cache);
    let queue: Arc<dyn WorkQueue> = Arc::new(queue);
    let news = Arc::new(NewsService::new(
        store.clone(),
        search,
        cache,
        queue,
        NewsOptions::from_settings(&settings.search, &settings.news),
    ));

    let shutdown = Shutdown::new();
    let signals = shutdown.listen_for_os_signals();
    let worker = spawn_ingestion(&backends, &settings, &shutdown);

    let result = serve_http(&settings, HttpState { news, store }, &shutdown).await;

    // Stop the worker too when the server exits on its own.
    shutdown.trigger();
    if let Err(err) = worker.await {
        warn!(target = "newsfeed::queue", error = %err, "ingestion task panicked");
    }
    signals.abort();

    result
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let backends = init_backends(&settings).await?;

    let shutdown = Shutdown::new();
    let signals = shutdown.listen_for_os_signals();

    run_ingestion(
        backends.store.pool().clone(),
        ingest_context(&backends, &settings),
        &settings.queue,
        shutdown.clone().wait(),
    )
    .await
    .map_err(InfraError::from)?;

    signals.abort();
    Ok(())
}

async fn run_reindex(
    settings: config::Settings,
    args: config::ReindexArgs,
) -> Result<(), AppError> {
    let backends = init_backends(&settings).await?;
    let concurrency = args.concurrency.clamp(1, 64);

    info!(
        target = "newsfeed::reindex",
        concurrency,
        batch_size = args.batch_size,
        index = %settings.search.index,
        "Starting reindex"
    );

    let report = reindex_all(
        backends.store.as_ref(),
        backends.search.as_ref(),
        &settings.search.index,
        args.batch_size,
        concurrency,
    )
    .await?;

    info!(
        target = "newsfeed::reindex",
        indexed = report.indexed,
        batches = report.batches,
        "Reindex completed"
    );
    Ok(())
}

async fn serve_http(
    settings: &config::Settings,
    state: HttpState,
    shutdown: &Shutdown,
) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "newsfeed::http",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown.clone().wait())
        .await
        .map_err(AppError::Server)
}
