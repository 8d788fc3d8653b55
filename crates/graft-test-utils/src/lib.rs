//! Test utilities and fixtures for Graft development.
//!
//! Provides standard node types ([`OrderTypes`]), a recording
//! persistence layer ([`PersistenceLog`]), a gated asynchronous rule
//! ([`GatedRule`]) for driving completion order by hand, and
//! [`init_tracing`] for readable test logs.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{Gate, GatedRule, OrderTypes, PersistenceLog};

use graft_engine::{Graph, GraphConfig};
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber writing to the test harness.
///
/// Honours `RUST_LOG`, defaulting to `warn`. Safe to call from every
/// test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A graph with `workers` rule workers and otherwise default settings.
pub fn graph_with_workers(workers: usize) -> Graph {
    init_tracing();
    Graph::new(GraphConfig {
        worker_count: Some(workers),
        ..GraphConfig::default()
    })
    .expect("default config with explicit workers is valid")
}

/// A single-worker graph.
pub fn graph() -> Graph {
    graph_with_workers(1)
}
