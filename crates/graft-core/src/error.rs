//! Error types for the Graft domain-object engine.
//!
//! Organized by subsystem: graph structure, rule registration, rule
//! execution, persistence handlers, and the save orchestrator.
//! Structural violations are returned to the caller of the violating
//! operation; rule faults are recovered locally and surfaced as
//! validation messages.

use std::time::Duration;

use thiserror::Error;

use crate::id::{CollectionId, NodeId, PropertyId, RuleId};
use crate::lifecycle::FactoryOperation;
use crate::message::RuleMessage;
use crate::value::ValueKind;

/// Errors from structural graph operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GraphError {
    /// Attaching `node` would make it reachable from two aggregate roots.
    #[error("node {node} belongs to aggregate {node_root}, cannot attach under aggregate {target_root}")]
    CrossAggregate {
        /// The node being attached.
        node: NodeId,
        /// The aggregate root the node currently belongs to.
        node_root: NodeId,
        /// The aggregate root of the attach target.
        target_root: NodeId,
    },
    /// The node handle is stale or was never allocated.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// The collection handle is stale or was never allocated.
    #[error("unknown collection {0}")]
    UnknownCollection(CollectionId),
    /// The property id is out of range for the node's type.
    #[error("node type '{type_name}' has no property {property}")]
    UnknownProperty {
        /// Name of the node type.
        type_name: String,
        /// The offending property id.
        property: PropertyId,
    },
    /// No property with this name exists on the node's type.
    #[error("node type '{type_name}' has no property named '{name}'")]
    UnknownPropertyName {
        /// Name of the node type.
        type_name: String,
        /// The requested name.
        name: String,
    },
    /// The value's kind does not match the property's declared kind.
    #[error("property '{property}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Property name.
        property: String,
        /// Declared kind.
        expected: ValueKind,
        /// Kind of the rejected value.
        found: ValueKind,
    },
    /// Attaching would make a node its own ancestor.
    #[error("attaching {node} under {parent} would create a cycle")]
    Cycle {
        /// The node being attached.
        node: NodeId,
        /// The requested parent.
        parent: NodeId,
    },
    /// The node is already an item of this collection.
    #[error("node {node} is already a member of collection {collection}")]
    AlreadyMember {
        /// The node.
        node: NodeId,
        /// The collection.
        collection: CollectionId,
    },
    /// The node has no parent to detach from.
    #[error("node {0} is not attached")]
    NotAttached(NodeId),
    /// The operation is only valid on an aggregate root.
    #[error("node {0} is a child object; use its parent container")]
    ChildObject(NodeId),
    /// No persistence handler is registered for the operation.
    #[error("node type '{type_name}' has no {operation} handler")]
    NoFactoryMethod {
        /// Name of the node type.
        type_name: String,
        /// The missing operation.
        operation: FactoryOperation,
    },
    /// A create or fetch handler failed.
    #[error("{operation} failed: {source}")]
    Persistence {
        /// The failing operation.
        operation: FactoryOperation,
        /// The handler error.
        #[source]
        source: PersistError,
    },
    /// `wait_for_pending` exceeded the configured timeout.
    #[error("pending rules did not settle within {waited:?}")]
    PendingTimeout {
        /// How long the caller waited.
        waited: Duration,
    },
    /// The asynchronous rule executor has shut down.
    #[error("rule executor is unavailable")]
    ExecutorUnavailable,
    /// Rule registration failed.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Errors from rule registration and rule-set validation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RuleError {
    /// A rule with this id is already registered on the pipeline.
    #[error("duplicate rule id '{0}'")]
    DuplicateRuleId(RuleId),
    /// The rule declares no trigger properties.
    #[error("rule '{0}' has no trigger properties")]
    NoTriggers(RuleId),
    /// The rule references a property the node type does not define.
    #[error("rule '{rule}' references undefined property {property}")]
    UndefinedProperty {
        /// The rule.
        rule: RuleId,
        /// The missing property.
        property: PropertyId,
    },
}

/// A rule body failed.
///
/// Never propagated as a hard failure: the pipeline records it as a
/// single error-severity message on the rule's first trigger property.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("rule fault: {message}")]
pub struct RuleFault {
    /// Description of the failure.
    pub message: String,
}

impl RuleFault {
    /// Create a fault from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build a fault from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "rule panicked".to_owned()
        };
        Self { message }
    }
}

/// Errors raised by external persistence handlers.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PersistError {
    /// The record does not exist in storage.
    #[error("record not found")]
    NotFound,
    /// Storage rejected the write because of a concurrent change.
    #[error("concurrency conflict: {reason}")]
    Conflict {
        /// Description of the conflict.
        reason: String,
    },
    /// Any other storage failure.
    #[error("storage failure: {reason}")]
    Storage {
        /// Description of the failure.
        reason: String,
    },
}

impl From<GraphError> for PersistError {
    /// Structural errors raised while a handler loads values.
    fn from(e: GraphError) -> Self {
        Self::Storage {
            reason: e.to_string(),
        }
    }
}

/// Coarse classification of a save rejection, for callers that branch
/// on the reason rather than the full error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SaveFailure {
    /// `save()` was called on a child node.
    IsChildObject,
    /// A required persistence handler is missing.
    NoFactoryMethod,
    /// The aggregate has error-severity messages.
    ValidationFailed,
    /// Nothing to save (strict mode only).
    NotModified,
    /// Cancellation was requested before persistence started.
    Canceled,
}

/// Errors from the save orchestrator.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SaveError {
    /// Children cannot save themselves; save the aggregate root.
    #[error("node {0} is a child object and cannot be saved directly")]
    IsChildObject(NodeId),
    /// A node in the save plan has no handler for its operation.
    #[error("node {node} (type '{type_name}') has no {operation} handler")]
    NoFactoryMethod {
        /// The node needing the handler.
        node: NodeId,
        /// Name of its type.
        type_name: String,
        /// The missing operation.
        operation: FactoryOperation,
    },
    /// The aggregate is invalid.
    #[error("node {node} is invalid ({} error message(s))", .errors.len())]
    ValidationFailed {
        /// The root that failed validation.
        node: NodeId,
        /// Every error-severity message in the aggregate.
        errors: Vec<RuleMessage>,
    },
    /// The aggregate has no changes.
    #[error("node {0} is not modified")]
    NotModified(NodeId),
    /// Cancellation was observed before persistence started.
    #[error("save operation canceled")]
    Canceled,
    /// A persistence handler failed mid-save.
    #[error("{operation} of node {node} failed: {source}")]
    Persistence {
        /// The node being persisted.
        node: NodeId,
        /// The failing operation.
        operation: FactoryOperation,
        /// The handler error.
        #[source]
        source: PersistError,
    },
    /// A structural error surfaced while saving.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl SaveError {
    /// The rejection reason, if this error is a precondition failure.
    pub fn reason(&self) -> Option<SaveFailure> {
        match self {
            Self::IsChildObject(_) => Some(SaveFailure::IsChildObject),
            Self::NoFactoryMethod { .. } => Some(SaveFailure::NoFactoryMethod),
            Self::ValidationFailed { .. } => Some(SaveFailure::ValidationFailed),
            Self::NotModified(_) => Some(SaveFailure::NotModified),
            Self::Canceled => Some(SaveFailure::Canceled),
            Self::Persistence { .. } | Self::Graph(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_error_reasons() {
        assert_eq!(
            SaveError::IsChildObject(NodeId::new(0, 0)).reason(),
            Some(SaveFailure::IsChildObject)
        );
        assert_eq!(SaveError::Canceled.reason(), Some(SaveFailure::Canceled));
        let persist = SaveError::Persistence {
            node: NodeId::new(1, 0),
            operation: FactoryOperation::Insert,
            source: PersistError::NotFound,
        };
        assert_eq!(persist.reason(), None);
    }

    #[test]
    fn fault_from_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(RuleFault::from_panic(payload.as_ref()).message, "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(RuleFault::from_panic(payload.as_ref()).message, "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(RuleFault::from_panic(payload.as_ref()).message, "rule panicked");
    }

    #[test]
    fn graph_error_display() {
        let err = GraphError::CrossAggregate {
            node: NodeId::new(2, 0),
            node_root: NodeId::new(1, 0),
            target_root: NodeId::new(5, 0),
        };
        assert_eq!(
            err.to_string(),
            "node n2v0 belongs to aggregate n1v0, cannot attach under aggregate n5v0"
        );
    }
}
