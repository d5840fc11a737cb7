//! Tracing subscriber setup and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

/// Per-target overrides, in `EnvFilter` syntax, read on top of the configured level.
pub const LOG_FILTER_ENV: &str = "NEWSFEED_LOG";

/// Chatty dependencies capped at `warn` unless the filter variable says otherwise.
const QUIET_TARGETS: &[&str] = &["sqlx::query", "hyper_util", "apalis_sql"];

static METRIC_DESCRIPTIONS: Once = Once::new();

pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(log_filter(logging.level, std::env::var(LOG_FILTER_ENV).ok().as_deref()))
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::Telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn log_filter(level: LevelFilter, overrides: Option<&str>) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy("");

    if level > LevelFilter::WARN {
        for target in QUIET_TARGETS {
            if let Ok(directive) = format!("{target}=warn").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    for directive in overrides.unwrap_or("").split(',').map(str::trim) {
        if directive.is_empty() {
            continue;
        }
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(err) => eprintln!("ignoring {LOG_FILTER_ENV} directive `{directive}`: {err}"),
        }
    }
    filter
}

/// Register metric descriptions with the installed recorder. Safe to call more than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "newsfeed_cache_hit_total",
            Unit::Count,
            "Page reads served from the read cache."
        );
        describe_counter!(
            "newsfeed_cache_miss_total",
            Unit::Count,
            "Page reads rebuilt from the search index and item store."
        );
        describe_counter!(
            "newsfeed_cache_invalidated_keys_total",
            Unit::Count,
            "Cached pages deleted by invalidation."
        );
        describe_counter!(
            "newsfeed_news_submitted_total",
            Unit::Count,
            "News drafts accepted by the work queue."
        );
        describe_counter!(
            "newsfeed_news_ingested_total",
            Unit::Count,
            "Queue messages handled by the ingestion worker, by outcome."
        );
        describe_histogram!(
            "newsfeed_read_page_seconds",
            Unit::Seconds,
            "Page read latency, by source."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_the_default_directive() {
        let filter = log_filter(LevelFilter::WARN, None);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn overrides_can_raise_a_single_target() {
        let filter = log_filter(LevelFilter::INFO, Some("newsfeed::queue=trace, ,"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn unparsable_overrides_are_skipped() {
        let filter = log_filter(LevelFilter::INFO, Some("newsfeed=notalevel"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
