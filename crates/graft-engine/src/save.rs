//! The save orchestrator.
//!
//! A save is always issued against an aggregate root. The root's action
//! follows its lifecycle flags:
//!
//! | `is_new` | `is_deleted` | action |
//! |----------|--------------|--------|
//! | true     | any          | Insert |
//! | false    | true         | Delete |
//! | false    | false        | Update, if modified |
//!
//! Preconditions are checked in order (child, handler, pending rules,
//! validity, modified), then the whole plan for the aggregate is built
//! and every handler in it verified before the cancellation checkpoint.
//! Once the first handler runs the plan runs to completion or to the
//! first handler error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use graft_core::{FactoryOperation, NodeId, RuleMessage, SaveError};

use crate::graph::Graph;

/// Cooperative cancellation for [`Graph::save`].
///
/// Observed once, immediately before the first persistence handler
/// runs. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not canceled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One persistence call in a save plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveStep {
    /// The node persisted.
    pub node: NodeId,
    /// Insert, Update or Delete.
    pub operation: FactoryOperation,
}

/// Result of a successful [`Graph::save`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    /// The saved root.
    pub root: NodeId,
    /// Persistence calls issued, in order. Empty when nothing was
    /// modified.
    pub plan: Vec<SaveStep>,
}

impl SaveOutcome {
    /// Whether any persistence call was issued.
    pub fn persisted(&self) -> bool {
        !self.plan.is_empty()
    }
}

impl Graph {
    /// Persist the aggregate rooted at `id`.
    ///
    /// Waits for in-flight rules first. Inside a batch scope, deferred
    /// cascades are settled before the preconditions are checked. On
    /// success every persisted node has completed its factory operation
    /// and, unless the root was deleted, the aggregate is unmodified.
    ///
    /// # Errors
    ///
    /// [`SaveError::IsChildObject`], [`SaveError::NoFactoryMethod`],
    /// [`SaveError::ValidationFailed`], [`SaveError::NotModified`] (only
    /// with [`fail_on_not_modified`](crate::GraphConfig::fail_on_not_modified))
    /// and [`SaveError::Canceled`] leave the graph untouched.
    /// [`SaveError::Persistence`] stops the plan at the failing step;
    /// earlier steps stay applied.
    pub fn save(
        &mut self,
        id: NodeId,
        cancel: &CancellationToken,
    ) -> Result<SaveOutcome, SaveError> {
        let node = self.node(id)?;
        if node.is_child {
            return Err(SaveError::IsChildObject(id));
        }
        let deleting = node.is_deleted && !node.is_new;
        let action = root_action(node.is_new, node.is_deleted);
        self.require_handler(id, action)?;

        self.wait_for_pending(id)?;
        if self.in_batch() {
            self.flush_dirty();
        }

        if !deleting && !self.is_valid(id)? {
            let errors = self.aggregate_errors(id);
            tracing::debug!(node = %id, errors = errors.len(), "save rejected: invalid");
            return Err(SaveError::ValidationFailed { node: id, errors });
        }
        if !self.is_modified(id)? {
            if self.config.fail_on_not_modified {
                return Err(SaveError::NotModified(id));
            }
            tracing::debug!(node = %id, "save skipped: not modified");
            return Ok(SaveOutcome {
                root: id,
                plan: Vec::new(),
            });
        }

        let mut plan = Vec::new();
        self.plan_save(id, &mut plan);
        for step in &plan {
            self.require_handler(step.node, step.operation)?;
        }
        if cancel.is_canceled() {
            tracing::debug!(node = %id, "save canceled before persistence");
            return Err(SaveError::Canceled);
        }

        for step in &plan {
            let pending = self.is_pending_deletion(step.node);
            self.invoke_handler(step.node, step.operation, None)
                .map_err(|source| SaveError::Persistence {
                    node: step.node,
                    operation: step.operation,
                    source,
                })?;
            self.metrics.persistence_operations += 1;
            self.complete_factory_operation(step.node, step.operation)?;
            if pending {
                self.purge(step.node);
            }
        }
        if !deleting {
            self.mark_unmodified(id)?;
        }
        self.metrics.saves_completed += 1;
        tracing::debug!(node = %id, steps = plan.len(), "aggregate saved");
        Ok(SaveOutcome { root: id, plan })
    }

    fn require_handler(&self, id: NodeId, operation: FactoryOperation) -> Result<(), SaveError> {
        let ty = self.node_type(id)?;
        if ty.has_handler(operation) {
            return Ok(());
        }
        Err(SaveError::NoFactoryMethod {
            node: id,
            type_name: ty.name().to_owned(),
            operation,
        })
    }

    fn aggregate_errors(&self, id: NodeId) -> Vec<RuleMessage> {
        self.subtree(id)
            .into_iter()
            .filter_map(|n| self.error_messages(n).ok())
            .flatten()
            .collect()
    }

    /// Insert/Update for `id` first, then Deletes for its pending
    /// deletions, then its modified live children.
    fn plan_save(&self, id: NodeId, plan: &mut Vec<SaveStep>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.is_deleted && !node.is_new {
            self.plan_delete(id, plan);
            return;
        }
        if node.is_new {
            plan.push(SaveStep {
                node: id,
                operation: FactoryOperation::Insert,
            });
        } else if node.is_self_modified() {
            plan.push(SaveStep {
                node: id,
                operation: FactoryOperation::Update,
            });
        }
        for removed in self.pending_deletions(id) {
            self.plan_delete(removed, plan);
        }
        for child in self.live_children(id) {
            if self.nodes.get(child).is_some_and(|c| c.state.modified) {
                self.plan_save(child, plan);
            }
        }
    }

    /// Delete descendants before `id`. Never-persisted nodes need no
    /// call.
    fn plan_delete(&self, id: NodeId, plan: &mut Vec<SaveStep>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for child in self
            .live_children(id)
            .into_iter()
            .chain(self.pending_deletions(id))
        {
            self.plan_delete(child, plan);
        }
        if !node.is_new {
            plan.push(SaveStep {
                node: id,
                operation: FactoryOperation::Delete,
            });
        }
    }
}

fn root_action(is_new: bool, is_deleted: bool) -> FactoryOperation {
    match (is_new, is_deleted) {
        (true, _) => FactoryOperation::Insert,
        (false, true) => FactoryOperation::Delete,
        (false, false) => FactoryOperation::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_action_table() {
        assert_eq!(root_action(true, false), FactoryOperation::Insert);
        assert_eq!(root_action(true, true), FactoryOperation::Insert);
        assert_eq!(root_action(false, true), FactoryOperation::Delete);
        assert_eq!(root_action(false, false), FactoryOperation::Update);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_canceled());
        token.cancel();
        assert!(clone.is_canceled());
    }

    #[test]
    fn empty_plan_is_not_persisted() {
        let outcome = SaveOutcome {
            root: NodeId::new(0, 0),
            plan: Vec::new(),
        };
        assert!(!outcome.persisted());
    }
}
