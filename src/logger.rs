use std::path::Path;

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

pub const LOG_FILE: &str = "pipewright.log";
/// Newline-delimited JSON, one line per admin request.
pub const EVENT_FILE: &str = "requests.log";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn log(&self, context: &str, msg: &str) {
        match self {
            LogLevel::Trace => tracing::trace!(%context, "{msg}"),
            LogLevel::Debug => tracing::debug!(%context, "{msg}"),
            LogLevel::Info => tracing::info!(%context, "{msg}"),
            LogLevel::Warn => tracing::warn!(%context, "{msg}"),
            LogLevel::Error => tracing::error!(%context, "{msg}"),
            LogLevel::Critical => tracing::error!(%context, "[CRITICAL] {msg}"),
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Lenient parse used for CLI flags and environment values; unknown names
/// fall back to `info`.
pub fn convert_level(level: &str) -> LogLevel {
    match level.to_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        "warn" | "warning" => LogLevel::Warn,
        "error" => LogLevel::Error,
        "critical" => LogLevel::Critical,
        _ => LogLevel::Info,
    }
}

/// Install the global subscriber.
///
/// Always logs to stdout. With a `log_dir`, also writes a daily rolling text
/// log and a JSON file of `target: "request"` events next to it.
pub fn init_tracing(log_dir: Option<&Path>, level: LogLevel) -> Result<()> {
    let env_filter = EnvFilter::new(level.directive());

    let stdout_layer = fmt::layer().with_thread_names(true);

    let (txt_layer, json_layer) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let txt_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
            let txt_layer = fmt::layer().with_writer(txt_appender).with_ansi(false);

            let json_appender = RollingFileAppender::new(Rotation::DAILY, dir, EVENT_FILE);
            let json_layer = fmt::layer()
                .json()
                .with_writer(json_appender)
                .with_target(true)
                .with_filter(EnvFilter::new("request=info"));
            (Some(txt_layer), Some(json_layer))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(txt_layer)
        .with(json_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_level_is_lenient() {
        assert_eq!(convert_level("DEBUG"), LogLevel::Debug);
        assert_eq!(convert_level("warning"), LogLevel::Warn);
        assert_eq!(convert_level("critical"), LogLevel::Critical);
        assert_eq!(convert_level("loud"), LogLevel::Info);
    }

    #[test]
    fn levels_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let level: LogLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(level.directive(), "error");
    }
}
