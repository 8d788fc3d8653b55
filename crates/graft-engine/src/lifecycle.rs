//! Lifecycle flags and the create/fetch factory entry points.
//!
//! | operation | `is_new` | `is_deleted` | modification state |
//! |-----------|----------|--------------|--------------------|
//! | Create    | true     | false        | marked modified    |
//! | Fetch     | false    | false        | cleared, deep      |
//! | Insert    | false    | false        | cleared, self only |
//! | Update    | false    | false        | cleared, self only |
//! | Delete    | true     | false        | cleared, self only |

use std::sync::Arc;

use graft_core::{CollectionId, FactoryOperation, GraphError, NodeId, PersistError, Value};

use crate::factory::FactoryContext;
use crate::graph::Graph;
use crate::notify::{ChangeEvent, ChangeKind};
use crate::schema::NodeType;

impl Graph {
    /// Flag the node itself as modified.
    pub fn mark_modified(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if !node.marked_modified {
            node.marked_modified = true;
            self.cascade(id);
        }
        Ok(())
    }

    /// Clear modification state on `id` and every live descendant.
    ///
    /// New and deleted flags are left alone, so a new node stays
    /// modified. Calling it twice is the same as calling it once.
    pub fn mark_unmodified(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.node(id)?;
        let nodes = self.subtree(id);
        for n in &nodes {
            if let Some(node) = self.nodes.get_mut(*n) {
                node.clean_self();
            }
        }
        self.settle(&nodes);
        Ok(())
    }

    /// Flag the node as never persisted.
    pub fn mark_new(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let was_new = std::mem::replace(&mut node.is_new, true);
        let was_deleted = std::mem::replace(&mut node.is_deleted, false);
        self.flags_changed(id, !was_new, was_deleted);
        Ok(())
    }

    /// Flag the node as persisted. The deleted flag is left alone.
    pub fn mark_old(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let was_new = std::mem::replace(&mut node.is_new, false);
        self.flags_changed(id, was_new, false);
        Ok(())
    }

    /// Mark an aggregate root for deletion on its next save.
    ///
    /// Children are deleted by removing them from their container;
    /// calling this on a child fails with [`GraphError::ChildObject`].
    pub fn delete(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.set_deleted(id, true)
    }

    /// Revert [`delete`](Self::delete).
    pub fn undelete(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.set_deleted(id, false)
    }

    fn set_deleted(&mut self, id: NodeId, deleted: bool) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if node.is_child || node.parent.is_some() {
            return Err(GraphError::ChildObject(id));
        }
        let was = std::mem::replace(&mut node.is_deleted, deleted);
        self.flags_changed(id, false, was != deleted);
        Ok(())
    }

    fn flags_changed(&mut self, id: NodeId, new_changed: bool, deleted_changed: bool) {
        if new_changed {
            self.emit(ChangeEvent::new(id, ChangeKind::IsNew));
        }
        if deleted_changed {
            self.emit(ChangeEvent::new(id, ChangeKind::IsDeleted));
        }
        if new_changed || deleted_changed {
            self.cascade(id);
        }
    }

    /// Report that a persistence round-trip for `id` finished and apply
    /// the matching lifecycle transition.
    pub fn complete_factory_operation(
        &mut self,
        id: NodeId,
        operation: FactoryOperation,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let (was_new, was_deleted) = (node.is_new, node.is_deleted);
        match operation {
            FactoryOperation::Create => {
                node.is_new = true;
                node.is_deleted = false;
                node.marked_modified = true;
            }
            FactoryOperation::Fetch => {
                node.is_new = false;
                node.is_deleted = false;
            }
            FactoryOperation::Insert | FactoryOperation::Update => {
                node.is_new = false;
                node.is_deleted = false;
                node.clean_self();
            }
            FactoryOperation::Delete => {
                node.is_new = true;
                node.is_deleted = false;
                node.clean_self();
            }
        }
        let (is_new, is_deleted) = (node.is_new, node.is_deleted);
        tracing::trace!(node = %id, %operation, "factory operation completed");
        self.flags_changed(id, was_new != is_new, was_deleted != is_deleted);
        match operation {
            FactoryOperation::Fetch => self.mark_unmodified(id),
            _ => {
                self.cascade(id);
                Ok(())
            }
        }
    }

    /// Run the type's handler for `operation` against `id`, if one is
    /// registered. Loaded values are announced but trigger no rules.
    pub(crate) fn invoke_handler(
        &mut self,
        id: NodeId,
        operation: FactoryOperation,
        criteria: Option<&Value>,
    ) -> Result<(), PersistError> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(());
        };
        let ty = Arc::clone(&node.ty);
        let Some(handler) = ty.handler(operation) else {
            return Ok(());
        };
        let mut ctx = FactoryContext::new(id, operation, &ty, &mut node.cells, criteria);
        let result = (handler.as_ref())(&mut ctx);
        let loaded = ctx.into_loaded();
        for property in &loaded {
            self.emit(ChangeEvent::new(id, ChangeKind::Value(property)));
        }
        if let Err(e) = &result {
            tracing::warn!(node = %id, %operation, error = %e, "persistence handler failed");
        }
        result
    }

    /// Create a new root of type `ty`.
    ///
    /// Runs the Create handler if the type has one, completes Create,
    /// then runs every rule so validity reflects the defaults.
    pub fn create(&mut self, ty: &Arc<NodeType>) -> Result<NodeId, GraphError> {
        let id = self.new_node(ty)?;
        if let Err(source) = self.invoke_handler(id, FactoryOperation::Create, None) {
            self.free_subtree(id);
            return Err(GraphError::Persistence {
                operation: FactoryOperation::Create,
                source,
            });
        }
        self.complete_factory_operation(id, FactoryOperation::Create)?;
        self.run_rules(id, None)?;
        tracing::debug!(node = %id, node_type = %ty.name(), "node created");
        Ok(id)
    }

    /// Load an existing root of type `ty` through its Fetch handler.
    ///
    /// Values are loaded inside a batch scope without marking anything
    /// modified. Unless
    /// [`check_rules_on_fetch`](crate::GraphConfig::check_rules_on_fetch)
    /// is off, every rule then runs before Fetch completes, so values
    /// derived from the loaded data do not leave the node modified.
    pub fn fetch(
        &mut self,
        ty: &Arc<NodeType>,
        criteria: impl Into<Value>,
    ) -> Result<NodeId, GraphError> {
        if !ty.has_handler(FactoryOperation::Fetch) {
            return Err(GraphError::NoFactoryMethod {
                type_name: ty.name().to_owned(),
                operation: FactoryOperation::Fetch,
            });
        }
        let criteria = criteria.into();
        let id = self.new_node(ty)?;
        {
            let mut scope = self.batch();
            if let Err(source) = scope.invoke_handler(id, FactoryOperation::Fetch, Some(&criteria)) {
                scope.free_subtree(id);
                scope.dirty.shift_remove(&id);
                scope.queued.retain(|e| e.node != id);
                return Err(GraphError::Persistence {
                    operation: FactoryOperation::Fetch,
                    source,
                });
            }
            // Rule writes are cleaned together with the loads.
            if scope.config.check_rules_on_fetch {
                scope.run_rules(id, None)?;
            }
            scope.complete_factory_operation(id, FactoryOperation::Fetch)?;
        }
        tracing::debug!(node = %id, node_type = %ty.name(), "node fetched");
        Ok(id)
    }

    /// Fetch a node and append it to `collection` as an existing item.
    ///
    /// Unlike [`add`](Self::add), the owner is not marked modified.
    pub fn fetch_into(
        &mut self,
        collection: CollectionId,
        ty: &Arc<NodeType>,
        criteria: impl Into<Value>,
    ) -> Result<NodeId, GraphError> {
        let owner = self.collection(collection)?.owner;
        let id = self.fetch(ty, criteria)?;
        if let Err(e) = self.attach_under(id, owner, Some(collection)) {
            self.free_subtree(id);
            return Err(e);
        }
        Ok(id)
    }
}
