//! Logging initialization for the campaign services.
//!
//! Every service writes structured JSONL to `~/.campaign/logs/dev.jsonl`
//! through the observability crate. `CAMPAIGN_LOG_PATH` points the sink at a
//! different file.

use std::path::PathBuf;

/// Initialize logging for the dispatcher binary.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Dispatcher started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("campaign-dispatcher", level);
}

/// Initialize logging with a custom service name.
///
/// Use this to tell the scheduler and one-shot dispatch runs apart in the
/// central log stream.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: log_path_override(),
        also_stderr: true,
    });
}

fn log_path_override() -> Option<PathBuf> {
    std::env::var("CAMPAIGN_LOG_PATH")
        .ok()
        .and_then(non_empty_env)
        .map(PathBuf::from)
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
