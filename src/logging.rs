//! Log setup for the binary. Everything goes to stderr: stdin carries the
//! record stream and stdout is left to the caller.

use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_DIRECTIVES: &str = "record_publisher=info,warn";
pub const VERBOSE_DIRECTIVES: &str = "record_publisher=debug,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// One flattened JSON object per event.
    Json,
}

/// `RUST_LOG` wins unless verbose output was requested explicitly.
pub fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_DIRECTIVES);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(format: LogFormat, verbose: bool) -> Result<()> {
    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_filter_ignores_environment() {
        let filter = filter(true).to_string();
        assert!(filter.contains("record_publisher=debug"));
    }

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init(LogFormat::Text, false);
        let err = init(LogFormat::Json, true).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
