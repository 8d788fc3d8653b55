//! Rule trait, node views and the per-node rule pipeline for Graft.
//!
//! The [`Rule`] trait declares trigger properties at registration and
//! computes a [`RuleOutcome`] from an owned [`NodeView`] snapshot, so
//! the same rule body runs inline (synchronous rules) or on a worker
//! thread (asynchronous rules). [`RulePipeline`] orders rules, tracks
//! in-flight executions by [`ExecutionToken`](graft_core::ExecutionToken),
//! and discards outcomes of superseded runs.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod common;
pub mod guard;
pub mod outcome;
pub mod pipeline;
pub mod rule;
pub mod view;

pub use common::{Dependency, FnRule, MaxLength, Range, Required};
pub use guard::execute_guarded;
pub use outcome::{OutcomeMessage, RuleOutcome};
pub use pipeline::{validate_rules, Begin, Completed, RegisteredRule, RulePipeline, ScheduledRule};
pub use rule::{Rule, RuleMode};
pub use view::NodeView;
