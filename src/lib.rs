#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! macroflow: a desktop macro runner. It replays a recorded flow of clicks, typing and
//! image waits, once per spreadsheet row or a fixed/endless number of times.
//!
//! Modules:
//! - `config`: Project models, loader, schema helpers and the application path layout.
//! - `providers`: Coordinate, image template and spreadsheet lookups used by the engine.
//! - `executor`: The execution engine (drivers, action handlers, looping strategies).
//! - `control`: Pause/resume/stop command sources (stdin).
//!
//! Use `macroflow::prelude::*` to bring commonly used items into scope quickly.

pub mod config;
pub mod control;
pub mod executor;
pub mod providers;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a level name (`trace|debug|info|warn|error`), case-insensitive.
pub fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing. An explicit `level` wins over `RUST_LOG`; the fallback is `info`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::fmt;

    let level = level
        .and_then(parse_level)
        .or_else(|| std::env::var("RUST_LOG").ok().as_deref().and_then(parse_level))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use macroflow::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn};

    pub use std::time::Duration;

    pub use crate as macroflow;
    pub use enigo;

    pub use crate::config::{AppConfig, ExecutionMode, ExecutionSettings, OnError, Project};
    pub use crate::executor::{
        DryRunDriver, EnigoDriver, ExecutorHandle, InputDriver, MacroError, MacroExecutor,
        RunReport,
    };
    pub use crate::providers::Resources;
    pub use crate::{config, control, executor, providers};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level("warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(PKG_NAME, "macroflow");
    }
}
