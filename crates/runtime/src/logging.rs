//! Logging setup
//!
//! Installs a `tracing-subscriber` fmt subscriber whose output goes through
//! [`ConsoleWriter`], so events land in the host console when a sink is
//! installed and on stderr otherwise. Each event keeps its level: errors show
//! as console errors, warnings as warnings, info as tips.

use crate::config::{BridgeConfig, DEFAULT_LOG_FILTER};
use crate::console::{ConsoleWriter, LogLevel};
use std::sync::Once;
use tracing::Metadata;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Hands out a stderr [`ConsoleWriter`] at the event's console level
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter::stderr()
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter::stderr().with_level(LogLevel::from(*meta.level()))
    }
}

/// Parse filter directives, falling back to the default filter
pub fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!(
            "plugbridge: invalid log filter {:?} ({}), using {:?}",
            directives, e, DEFAULT_LOG_FILTER
        );
        EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

static INIT: Once = Once::new();

/// Install the global subscriber using `BridgeConfig::from_env()`.
///
/// Only the first call does anything. If the embedding application already
/// set a global subscriber, that one is kept.
pub fn init_logging() {
    init_logging_with(&BridgeConfig::from_env());
}

/// Same as [`init_logging`] with an explicit configuration
pub fn init_logging_with(config: &BridgeConfig) {
    INIT.call_once(|| {
        let installed = tracing_subscriber::fmt()
            .with_env_filter(build_filter(&config.log_filter))
            .with_writer(ConsoleMakeWriter)
            .with_ansi(false)
            .try_init();
        if installed.is_ok() {
            tracing::debug!(filter = %config.log_filter, "logging initialized");
        }
    });
}
