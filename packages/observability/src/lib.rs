//! # Observability
//!
//! Centralized logging layer for the campaign dispatch services.
//!
//! Services are **log producers** only. They call `observability::init_with_config()` once
//! at startup and use the standard `tracing` macros everywhere else. Where the
//! lines end up (central JSONL file, stderr) is decided here.
//!
//! ## Central log file
//!
//! Every service appends structured JSONL to `~/.campaign/logs/dev.jsonl`
//! unless an explicit path is configured:
//!
//! - `tail -f ~/.campaign/logs/dev.jsonl | jq` for pretty JSON
//! - `jq 'select(.broadcast_id == "b-1")'` to follow one broadcast
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "campaign-dispatcher".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod sink;

use std::path::PathBuf;

pub use json_layer::LogEntry;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "campaign-dispatcher", "scheduler").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.campaign/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// Falls back to a plain stderr subscriber when the central log file cannot
/// be opened (read-only home, sandboxed CI). Calling this twice is a no-op
/// for the second call.
pub fn init_with_config(config: LogConfig) {
    let log_path = config
        .log_path
        .clone()
        .or_else(sink::default_log_path);

    if let Some(path) = log_path {
        match sink::init_file_subscriber(&config, &path) {
            Ok(()) => return,
            Err(err) => {
                eprintln!(
                    "observability: cannot open {}: {err}; logging to stderr",
                    path.display()
                );
            }
        }
    }

    sink::init_stderr_subscriber(&config);
}
