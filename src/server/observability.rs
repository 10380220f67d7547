//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - `RUST_LOG` overriding the configured level
//! - Span constructors shared by the HTTP layer and the sync engine

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Tracing configuration options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG`, when set, takes precedence over `config.level`. Calling
/// this twice in one process is a no-op for the second call.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing already initialized");
        return;
    }

    tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
}

/// Span constructors.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span for one HTTP request.
    #[must_use]
    pub fn request_span(method: &str, uri: &str, request_id: &str) -> Span {
        info_span!(
            "http_request",
            method = %method,
            uri = %uri,
            request_id = %request_id,
        )
    }

    /// Span for one reconciliation cycle.
    #[must_use]
    pub fn sync_cycle_span(cycle: u64) -> Span {
        info_span!("sync_cycle", cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = TracingConfig {
            level: "debug".to_string(),
            json: true,
        };
        init_tracing(&config);
        init_tracing(&config);
    }

    #[test]
    fn test_span_creation() {
        let span = spans::request_span("GET", "/health", "req-123");
        let _guard = span.enter();

        let cycle = spans::sync_cycle_span(7);
        let _cycle_guard = cycle.enter();
    }
}
