//! Aggregate graph engine for Graft.
//!
//! Provides the [`Graph`] that owns every node of one or more aggregates,
//! applies user edits and rule outcomes to property cells, cascades
//! validity, busy and modified state up parent links, and persists whole
//! aggregates through per-type handlers. Asynchronous rules run on a
//! small worker pool; their outcomes are applied back on the graph.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod binding;
pub mod cascade;
pub mod cell;
pub mod collection;
pub mod config;
mod executor;
pub mod factory;
pub mod graph;
pub mod lifecycle;
pub mod metrics;
pub mod node;
pub mod notify;
pub mod rules;
pub mod save;
pub mod schema;

pub use batch::BatchScope;
pub use cell::PropertyCell;
pub use config::{ConfigError, GraphConfig};
pub use factory::FactoryContext;
pub use graph::Graph;
pub use metrics::GraphMetrics;
pub use node::NodeState;
pub use notify::{ChangeEvent, ChangeKind, SubscriptionId};
pub use save::{CancellationToken, SaveOutcome, SaveStep};
pub use schema::{FactoryHandler, NodeType, NodeTypeBuilder};
