//! Logging setup
//!
//! Logs go to stderr and/or a daily-rolling file, as text or JSON. The
//! filter comes from `RUST_LOG`, defaulting to the configured level.

use crate::error::{NodeError, Result};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILE: &str = "domoticz-sensor-node.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` has no directive
    pub level: Level,

    /// Log to a daily-rolling file at this path
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if rust_log.contains("trace") {
                config.level = Level::TRACE;
            } else if rust_log.contains("debug") {
                config.level = Level::DEBUG;
            } else if rust_log.contains("info") {
                config.level = Level::INFO;
            } else if rust_log.contains("warn") {
                config.level = Level::WARN;
            } else if rust_log.contains("error") {
                config.level = Level::ERROR;
            }
        }

        if let Ok(log_file) = std::env::var("NODE_LOG_FILE") {
            if !log_file.is_empty() {
                config.file_path = Some(PathBuf::from(log_file));
            }
        }

        if let Ok(log_stderr) = std::env::var("NODE_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(json) = std::env::var("NODE_LOG_JSON") {
            config.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }
}

/// Install the global subscriber
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stderr {
        layers.push(output_layer(std::io::stderr, true, config.json));
    }

    if let Some(file_path) = &config.file_path {
        let directory = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(directory)?;

        let file_name = file_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new(DEFAULT_LOG_FILE));
        let file_appender = tracing_appender::rolling::daily(directory, file_name);
        layers.push(output_layer(file_appender, false, config.json));
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| NodeError::config(format!("Logging already initialized: {e}")))
}

fn output_layer<W>(writer: W, ansi: bool, json: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .boxed()
    }
}
