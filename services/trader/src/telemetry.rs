//! Tracing subscriber setup

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const WORKSPACE_CRATES: [&str; 4] = ["trader", "feeds", "engine", "common"];

/// Filter directive for the subscriber.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` (default info) applies to
/// the workspace crates. `debug` forces debug for them either way.
#[must_use]
pub fn filter_directive(rust_log: Option<&str>, log_level: Option<&str>, debug: bool) -> String {
    let level = if debug {
        "debug".to_string()
    } else {
        log_level
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("info")
            .to_ascii_lowercase()
    };
    let crates = WORKSPACE_CRATES
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    match rust_log.map(str::trim).filter(|r| !r.is_empty()) {
        Some(base) if debug => format!("{base},{crates}"),
        Some(base) => base.to_string(),
        None => format!("warn,{crates}"),
    }
}

pub fn init_tracing(debug: bool) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    let filter = EnvFilter::try_new(filter_directive(
        rust_log.as_deref(),
        log_level.as_deref(),
        debug,
    ))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_thread_ids(false)
        .with_file(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;
    Ok(())
}
