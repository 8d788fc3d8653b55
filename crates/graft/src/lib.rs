//! Graft: reactive domain objects with rule-driven validation and
//! aggregate-level persistence.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Graft sub-crates. For most users, adding `graft` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use graft::prelude::*;
//!
//! // An order with a required customer and a collection of lines.
//! let mut order = NodeType::builder("Order");
//! let customer = order.property::<String>("customer");
//! order.rule(Required::new(customer, "customer is required"));
//! order.on_insert(|_ctx| Ok(()));
//! let order = order.build().unwrap();
//!
//! let mut line = NodeType::builder("Line");
//! let quantity = line.property::<i64>("quantity");
//! line.rule(Range::new(quantity, 1.0, 100.0));
//! line.on_insert(|_ctx| Ok(()));
//! let line = line.build().unwrap();
//!
//! let mut graph = Graph::new(GraphConfig::default()).unwrap();
//! let root = graph.create(&order).unwrap();
//! let lines = graph.new_collection(root).unwrap();
//! let item = graph.create(&line).unwrap();
//! graph.add(lines, item).unwrap();
//!
//! graph.set(item, quantity, 500).unwrap();
//! assert!(!graph.is_valid(root).unwrap());
//!
//! graph.set(root, customer, "ACME".to_owned()).unwrap();
//! graph.set(item, quantity, 5).unwrap();
//! assert!(graph.is_savable(root).unwrap());
//!
//! let saved = graph.save(root, &CancellationToken::new()).unwrap();
//! assert_eq!(saved.plan.len(), 2);
//! assert!(!graph.is_new(item).unwrap());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `graft-core` | IDs, values, property keys, messages, errors |
//! | [`arena`] | `graft-arena` | Generational slot arena |
//! | [`rules`] | `graft-rules` | Rule trait, outcomes, pipeline, common rules |
//! | [`engine`] | `graft-engine` | Graph, cascade, collections, save orchestrator |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits and IDs (`graft-core`).
///
/// Contains identifiers, [`types::Value`], typed
/// [`types::Property`] keys, rule messages and the error taxonomy.
pub use graft_core as types;

/// Generational arena storage (`graft-arena`).
pub use graft_arena as arena;

/// Rules and the per-node rule pipeline (`graft-rules`).
///
/// The [`rules::Rule`] trait is the main extension point for business
/// and validation logic.
pub use graft_rules as rules;

/// The aggregate graph engine (`graft-engine`).
///
/// [`engine::Graph`] owns nodes and collections, runs rules, cascades
/// derived state and saves aggregates.
pub use graft_engine as engine;

/// Common imports for typical Graft usage.
///
/// ```rust
/// use graft::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use graft_core::{
        ChangeReason, CollectionId, FactoryOperation, NodeId, Property, PropertyDef, PropertyId,
        PropertyReader, PropertySet, PropertyValue, RuleId, RuleMessage, Severity, Value,
        ValueKind,
    };

    // Errors
    pub use graft_core::{GraphError, PersistError, RuleError, RuleFault, SaveError, SaveFailure};

    // Rules
    pub use graft_rules::{
        Dependency, FnRule, MaxLength, NodeView, Range, Required, Rule, RuleMode, RuleOutcome,
    };

    // Engine
    pub use graft_engine::{
        BatchScope, CancellationToken, ChangeEvent, ChangeKind, ConfigError, FactoryContext,
        Graph, GraphConfig, GraphMetrics, NodeState, NodeType, NodeTypeBuilder, SaveOutcome,
        SaveStep, SubscriptionId,
    };
}
