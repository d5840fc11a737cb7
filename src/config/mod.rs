//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "newsfeed";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_SEARCH_INDEX: &str = "news";
const DEFAULT_CACHE_URL: &str = "redis://localhost:6379";
const DEFAULT_QUEUE_WORKER_CONCURRENCY: u32 = 20;
const DEFAULT_QUEUE_MAX_IN_FLIGHT: u32 = 100;
const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 25;
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_NEWS_PAGE_SIZE: u32 = 10;
const DEFAULT_NEWS_FANOUT_CONCURRENCY: u32 = 16;
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;

/// Command-line arguments for the newsfeed binary.
#[derive(Debug, Parser)]
#[command(name = "newsfeed", version, about = "News item service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "NEWSFEED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API together with the ingestion worker.
    Serve(Box<ServeArgs>),
    /// Run only the ingestion worker.
    Worker(WorkerArgs),
    /// Rebuild the search index from the item store.
    Reindex(ReindexArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct BackendOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the search engine base URL.
    #[arg(long = "search-url", value_name = "URL")]
    pub search_url: Option<String>,

    /// Override the search index name.
    #[arg(long = "search-index", value_name = "NAME")]
    pub search_index: Option<String>,

    /// Override the cache connection URL.
    #[arg(long = "cache-url", value_name = "URL")]
    pub cache_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub backends: BackendOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the number of messages handled concurrently by the ingestion worker.
    #[arg(long = "queue-worker-concurrency", value_name = "COUNT")]
    pub queue_worker_concurrency: Option<u32>,

    /// Override the number of messages fetched ahead of processing.
    #[arg(long = "queue-max-in-flight", value_name = "COUNT")]
    pub queue_max_in_flight: Option<u32>,

    /// Override the number of items per page.
    #[arg(long = "news-page-size", value_name = "COUNT")]
    pub news_page_size: Option<u32>,

    /// Override the per-call backend timeout.
    #[arg(long = "backends-timeout-ms", value_name = "MILLIS")]
    pub backends_timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub backends: BackendOverrides,

    /// Override the number of messages handled concurrently.
    #[arg(long = "queue-worker-concurrency", value_name = "COUNT")]
    pub queue_worker_concurrency: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct ReindexArgs {
    #[command(flatten)]
    pub backends: BackendOverrides,

    /// Maximum number of concurrent index writes.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(usize))]
    pub concurrency: usize,

    /// Number of items loaded from the store per batch.
    #[arg(long = "batch-size", default_value_t = 500, value_parser = clap::value_parser!(u32))]
    pub batch_size: u32,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub queue: QueueSettings,
    pub news: NewsSettings,
    pub backends: BackendSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub url: String,
    pub index: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub worker_concurrency: NonZeroU32,
    pub max_in_flight: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct NewsSettings {
    pub page_size: NonZeroU32,
    pub fanout_concurrency: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("NEWSFEED").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Worker(args)) => raw.apply_worker_overrides(args),
        Some(Command::Reindex(args)) => raw.apply_backend_overrides(&args.backends),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    search: RawSearchSettings,
    cache: RawCacheSettings,
    queue: RawQueueSettings,
    news: RawNewsSettings,
    backends: RawBackendSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_backend_overrides(&overrides.backends);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(value) = overrides.queue_worker_concurrency {
            self.queue.worker_concurrency = Some(value);
        }
        if let Some(value) = overrides.queue_max_in_flight {
            self.queue.max_in_flight = Some(value);
        }
        if let Some(value) = overrides.news_page_size {
            self.news.page_size = Some(value);
        }
        if let Some(value) = overrides.backends_timeout_ms {
            self.backends.timeout_ms = Some(value);
        }
    }

    fn apply_worker_overrides(&mut self, args: &WorkerArgs) {
        self.apply_backend_overrides(&args.backends);
        if let Some(value) = args.queue_worker_concurrency {
            self.queue.worker_concurrency = Some(value);
        }
    }

    fn apply_backend_overrides(&mut self, overrides: &BackendOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(url) = overrides.search_url.as_ref() {
            self.search.url = Some(url.clone());
        }
        if let Some(index) = overrides.search_index.as_ref() {
            self.search.index = Some(index.clone());
        }
        if let Some(url) = overrides.cache_url.as_ref() {
            self.cache.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            search,
            cache,
            queue,
            news,
            backends,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            search: build_search_settings(search)?,
            cache: build_cache_settings(cache)?,
            queue: build_queue_settings(queue)?,
            news: build_news_settings(news)?,
            backends: build_backend_settings(backends)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let url = non_blank(search.url).unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(LoadError::invalid(
            "search.url",
            format!("`{url}` must be an http(s) URL"),
        ));
    }

    let index = non_blank(search.index).unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string());
    if index.contains(['/', ' ', '*', '?', '"', '<', '>', '|', ',', '#']) {
        return Err(LoadError::invalid(
            "search.index",
            format!("`{index}` is not a valid index name"),
        ));
    }

    Ok(SearchSettings {
        url: url.trim_end_matches('/').to_string(),
        index,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let url = non_blank(cache.url).unwrap_or_else(|| DEFAULT_CACHE_URL.to_string());
    if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
        return Err(LoadError::invalid(
            "cache.url",
            format!("`{url}` must use the redis:// or rediss:// scheme"),
        ));
    }
    Ok(CacheSettings { url })
}

fn build_queue_settings(queue: RawQueueSettings) -> Result<QueueSettings, LoadError> {
    let worker_concurrency = non_zero_u32(
        queue
            .worker_concurrency
            .unwrap_or(DEFAULT_QUEUE_WORKER_CONCURRENCY)
            .into(),
        "queue.worker_concurrency",
    )?;
    let max_in_flight = non_zero_u32(
        queue
            .max_in_flight
            .unwrap_or(DEFAULT_QUEUE_MAX_IN_FLIGHT)
            .into(),
        "queue.max_in_flight",
    )?;
    let max_attempts = non_zero_u32(
        queue
            .max_attempts
            .unwrap_or(DEFAULT_QUEUE_MAX_ATTEMPTS)
            .into(),
        "queue.max_attempts",
    )?;
    i32::try_from(max_attempts.get())
        .map_err(|_| LoadError::invalid("queue.max_attempts", "value exceeds i32 range"))?;

    let poll_ms = queue
        .poll_interval_ms
        .unwrap_or(DEFAULT_QUEUE_POLL_INTERVAL_MS);
    if poll_ms == 0 {
        return Err(LoadError::invalid(
            "queue.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(QueueSettings {
        worker_concurrency,
        max_in_flight,
        max_attempts,
        poll_interval: Duration::from_millis(poll_ms),
    })
}

fn build_news_settings(news: RawNewsSettings) -> Result<NewsSettings, LoadError> {
    Ok(NewsSettings {
        page_size: non_zero_u32(
            news.page_size.unwrap_or(DEFAULT_NEWS_PAGE_SIZE).into(),
            "news.page_size",
        )?,
        fanout_concurrency: non_zero_u32(
            news.fanout_concurrency
                .unwrap_or(DEFAULT_NEWS_FANOUT_CONCURRENCY)
                .into(),
            "news.fanout_concurrency",
        )?,
    })
}

fn build_backend_settings(backends: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let timeout_ms = backends.timeout_ms.unwrap_or(DEFAULT_BACKEND_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "backends.timeout_ms",
            "must be greater than zero",
        ));
    }
    Ok(BackendSettings {
        timeout: Duration::from_millis(timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    url: Option<String>,
    index: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQueueSettings {
    worker_concurrency: Option<u32>,
    max_in_flight: Option<u32>,
    max_attempts: Option<u32>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNewsSettings {
    page_size: Option<u32>,
    fanout_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    timeout_ms: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.search.index, "news");
        assert_eq!(settings.queue.worker_concurrency.get(), 20);
        assert_eq!(settings.queue.max_in_flight.get(), 100);
        assert_eq!(settings.news.page_size.get(), 10);
        assert_eq!(settings.backends.timeout, Duration::from_secs(5));
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());
        raw.search.index = Some("from-file".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            backends: BackendOverrides {
                search_index: Some("from-cli".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.search.index, "from-cli");
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut raw = RawSettings::default();
        raw.news.page_size = Some(0);

        let err = Settings::from_raw(raw).expect_err("page size must be positive");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "news.page_size",
                ..
            }
        ));
    }

    #[test]
    fn non_redis_cache_url_is_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.url = Some("http://localhost:6379".to_string());

        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "cache.url",
                ..
            })
        ));
    }

    #[test]
    fn search_url_trailing_slash_is_trimmed() {
        let mut raw = RawSettings::default();
        raw.search.url = Some("http://search:9200/".to_string());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.search.url, "http://search:9200");
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["newsfeed"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_worker_arguments() {
        let args = CliArgs::parse_from([
            "newsfeed",
            "worker",
            "--database-url",
            "postgres://example",
            "--queue-worker-concurrency",
            "4",
        ]);

        match args.command.expect("worker command") {
            Command::Worker(worker) => {
                assert_eq!(
                    worker.backends.database_url.as_deref(),
                    Some("postgres://example")
                );
                assert_eq!(worker.queue_worker_concurrency, Some(4));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_reindex_arguments() {
        let args = CliArgs::parse_from([
            "newsfeed",
            "reindex",
            "--search-url",
            "http://search:9200",
            "--concurrency",
            "3",
        ]);

        match args.command.expect("reindex command") {
            Command::Reindex(reindex) => {
                assert_eq!(
                    reindex.backends.search_url.as_deref(),
                    Some("http://search:9200")
                );
                assert_eq!(reindex.concurrency, 3);
                assert_eq!(reindex.batch_size, 500);
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "newsfeed",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--cache-url",
            "redis://cache:6379",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.backends.cache_url.as_deref(),
                    Some("redis://cache:6379")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
