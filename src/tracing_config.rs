//! Tracing configuration for debugging pool behavior.
//!
//! Supports three output formats controlled by `TREEPOOL_LOG_FORMAT`:
//!
//! - `text` (default): Standard `tracing-subscriber` flat output
//! - `tree`: Hierarchical indented output via `tracing-tree` — easy to read,
//!   great for pasting into conversations
//! - `json`: One JSON object per span/event — machine-readable, also pasteable
//!
//! ## Quick start
//!
//! ```bash
//! # Follow every relocation and retain change while a test runs
//! TREEPOOL_LOG=trace TREEPOOL_LOG_FORMAT=tree cargo test -- --nocapture
//!
//! # Allocation failures only
//! TREEPOOL_LOG=debug cargo test -- --nocapture
//!
//! # Fine-grained filtering
//! TREEPOOL_LOG="treepool::pool::arena=trace" cargo test -- --nocapture
//! ```
//!
//! The subscriber is only initialised when `TREEPOOL_LOG` (or `RUST_LOG`) is
//! set, so there is zero overhead in normal builds.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Standard flat text lines (default).
    Text,
    /// Hierarchical indented tree via `tracing-tree`.
    Tree,
    /// Newline-delimited JSON objects.
    Json,
}

impl LogFormat {
    /// Parse from the `TREEPOOL_LOG_FORMAT` environment variable.
    fn from_env() -> Self {
        match std::env::var("TREEPOOL_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "tree" => Self::Tree,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Build an `EnvFilter` from `TREEPOOL_LOG`, falling back to `RUST_LOG`.
///
/// `TREEPOOL_LOG` takes precedence when both are set. Values use the same
/// syntax as `RUST_LOG` (e.g. `debug`, `treepool::pool::arena=trace`).
fn build_filter() -> EnvFilter {
    if let Ok(val) = std::env::var("TREEPOOL_LOG") {
        EnvFilter::builder().parse_lossy(val)
    } else {
        // RUST_LOG is set (caller already checked).  Use it as-is.
        EnvFilter::from_default_env()
    }
}

/// Initialise the global tracing subscriber.
///
/// Does nothing when neither `TREEPOOL_LOG` nor `RUST_LOG` is set, keeping
/// startup cost at zero for normal usage.
///
/// All output goes to stderr so it never interferes with whatever the
/// embedding program writes to stdout.
pub fn init_tracing() {
    // Only pay for tracing when explicitly requested.
    let has_pool_log = std::env::var("TREEPOOL_LOG").is_ok();
    let has_rust_log = std::env::var("RUST_LOG").is_ok();
    if !has_pool_log && !has_rust_log {
        return;
    }

    let filter = build_filter();
    let format = LogFormat::from_env();

    match format {
        LogFormat::Tree => {
            let tree_layer = tracing_tree::HierarchicalLayer::default()
                .with_indent_amount(2)
                .with_indent_lines(true)
                .with_deferred_spans(true)
                .with_span_retrace(true)
                .with_targets(true);

            Registry::default().with(filter).with(tree_layer).init();
        }
        LogFormat::Json => {
            let json_layer = fmt::layer().json().with_writer(std::io::stderr);

            Registry::default().with(filter).with(json_layer).init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
