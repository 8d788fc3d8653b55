//! Derived-state cascade and parent links.
//!
//! Every node caches its [`NodeState`]. Any event that can change a
//! node's validity, busy or modified state recomputes that node from its
//! own cells and its children's cached states, then walks up the parent
//! links while the recomputed triple differs from the cached one. The
//! walk stops at the root or at the first node whose triple did not
//! change.
//!
//! Parent links are ids only. A node's children are the field-slot
//! children it holds directly plus the items of the collections it owns;
//! removed-but-persisted nodes keep their parent link until their Delete
//! completes but no longer count towards validity or busy state.

use graft_core::{CollectionId, GraphError, NodeId};

use crate::cell::PropertyCell;
use crate::graph::Graph;
use crate::node::NodeState;
use crate::notify::{ChangeEvent, ChangeKind};

impl Graph {
    pub(crate) fn compute_state(&self, id: NodeId) -> Option<NodeState> {
        let node = self.nodes.get(id)?;
        let mut valid = !node.cells.iter().any(PropertyCell::has_errors);
        let mut busy = node.pipeline.is_busy() || node.cells.iter().any(PropertyCell::is_busy);
        let self_modified = node.is_self_modified();
        let mut modified = self_modified || !node.removed.is_empty();
        for cid in &node.collections {
            if self.collections.get(*cid).is_some_and(|c| !c.deleted.is_empty()) {
                modified = true;
            }
        }
        for child in self.live_children(id) {
            if let Some(c) = self.nodes.get(child) {
                valid &= c.state.valid;
                busy |= c.state.busy;
                modified |= c.state.modified;
            }
        }
        Some(NodeState {
            valid,
            busy,
            modified,
            self_modified,
            savable: modified && valid && !busy && !node.is_child,
        })
    }

    /// Recompute one node's cached state and notify. Returns the
    /// previous and new state.
    pub(crate) fn refresh(&mut self, id: NodeId) -> Option<(NodeState, NodeState)> {
        let next = self.compute_state(id)?;
        self.metrics.cascade_recomputations += 1;
        let node = self.nodes.get_mut(id)?;
        let prev = std::mem::replace(&mut node.state, next);
        self.emit_state_changes(id, &prev, &next);
        Some((prev, next))
    }

    /// Recompute `start` and propagate upward, or defer to the end of
    /// the current batch scope.
    pub(crate) fn cascade(&mut self, start: NodeId) {
        if self.batch_depth > 0 {
            self.dirty.insert(start);
            return;
        }
        self.cascade_now(start);
    }

    pub(crate) fn cascade_now(&mut self, start: NodeId) {
        let mut current = Some(start);
        while let Some(id) = current {
            let Some((prev, next)) = self.refresh(id) else {
                break;
            };
            let parent = self.nodes.get(id).and_then(|n| n.parent);
            if prev.triple() == next.triple() {
                if parent.is_some() {
                    self.metrics.cascade_short_circuits += 1;
                    tracing::trace!(node = %id, "cascade short-circuited");
                }
                break;
            }
            current = parent;
        }
    }

    /// Recompute every node in `nodes` (pre-order, `nodes[0]` the top)
    /// bottom-up, then cascade from the top.
    pub(crate) fn settle(&mut self, nodes: &[NodeId]) {
        let Some((&top, rest)) = nodes.split_first() else {
            return;
        };
        if self.batch_depth > 0 {
            self.dirty.extend(nodes.iter().copied());
            return;
        }
        for id in rest.iter().rev() {
            self.refresh(*id);
        }
        self.cascade_now(top);
    }

    // ── Structure queries ──────────────────────────────────────────

    /// Field-slot children plus items of owned collections.
    pub(crate) fn live_children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut out = node.children.clone();
        for cid in &node.collections {
            if let Some(c) = self.collections.get(*cid) {
                out.extend_from_slice(&c.items);
            }
        }
        out
    }

    /// Removed-but-persisted children awaiting Delete.
    pub(crate) fn pending_deletions(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut out = node.removed.clone();
        for cid in &node.collections {
            if let Some(c) = self.collections.get(*cid) {
                out.extend_from_slice(&c.deleted);
            }
        }
        out
    }

    /// `id` and its live descendants in pre-order.
    pub(crate) fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !self.nodes.contains(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.live_children(n).into_iter().rev());
        }
        out
    }

    pub(crate) fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(p) = current {
            depth += 1;
            current = self.nodes.get(p).and_then(|n| n.parent);
        }
        depth
    }

    fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.nodes.get(p).and_then(|n| n.parent);
        }
        false
    }

    /// The node's parent, if attached (or awaiting deletion).
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, GraphError> {
        Ok(self.node(id)?.parent)
    }

    /// The aggregate root above `id`; `None` if `id` is itself a root.
    pub fn root(&self, id: NodeId) -> Result<Option<NodeId>, GraphError> {
        let root = self.aggregate_root(id)?;
        Ok((root != id).then_some(root))
    }

    /// The aggregate root containing `id`, which may be `id` itself.
    pub fn aggregate_root(&self, id: NodeId) -> Result<NodeId, GraphError> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Field-slot children of `id`.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], GraphError> {
        Ok(&self.node(id)?.children)
    }

    /// Collections owned by `id`.
    pub fn collections_of(&self, id: NodeId) -> Result<&[CollectionId], GraphError> {
        Ok(&self.node(id)?.collections)
    }

    // ── Attach / detach ────────────────────────────────────────────

    /// Attach `child` beneath `parent` in a field slot.
    ///
    /// # Errors
    ///
    /// [`GraphError::Cycle`] if `parent` is `child` or one of its
    /// descendants; [`GraphError::CrossAggregate`] if `child` is already
    /// attached within a different aggregate. A child already attached
    /// within the same aggregate is moved.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) -> Result<(), GraphError> {
        if self.node(parent)?.children.contains(&child) {
            return Ok(());
        }
        self.attach_under(child, parent, None)
    }

    /// Detach a field-slot child or collection item.
    ///
    /// A new node is discarded outright. A persisted node is marked
    /// deleted and kept, with its parent link, in its container's
    /// pending deletions until a save issues its Delete.
    pub fn detach(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node(id)?;
        let Some(parent) = node.parent else {
            return Err(GraphError::NotAttached(id));
        };
        if let Some(cid) = node.container {
            return self.remove(cid, id);
        }
        if !self.node(parent)?.children.contains(&id) {
            return Err(GraphError::NotAttached(id));
        }
        self.retire(id, parent, None);
        Ok(())
    }

    /// Free an unattached aggregate and everything beneath it.
    pub fn discard(&mut self, id: NodeId) -> Result<(), GraphError> {
        if self.node(id)?.parent.is_some() {
            return Err(GraphError::ChildObject(id));
        }
        self.free_subtree(id);
        self.dirty.shift_remove(&id);
        Ok(())
    }

    pub(crate) fn attach_under(
        &mut self,
        id: NodeId,
        parent: NodeId,
        container: Option<CollectionId>,
    ) -> Result<(), GraphError> {
        let attached = self.node(id)?.parent.is_some();
        self.node(parent)?;
        if id == parent || self.is_ancestor(id, parent) {
            return Err(GraphError::Cycle { node: id, parent });
        }
        if attached {
            let node_root = self.aggregate_root(id)?;
            let target_root = self.aggregate_root(parent)?;
            if node_root != target_root {
                return Err(GraphError::CrossAggregate {
                    node: id,
                    node_root,
                    target_root,
                });
            }
        }

        let (old_parent, restored) = self.unlink(id);
        self.link(id, parent, container);
        if restored {
            if let Some(node) = self.nodes.get_mut(id) {
                node.is_deleted = false;
            }
            self.emit(ChangeEvent::new(id, ChangeKind::IsDeleted));
        }
        self.emit(ChangeEvent::new(id, ChangeKind::Parent));
        tracing::debug!(node = %id, parent = %parent, moved = old_parent.is_some(), restored, "node attached");

        self.cascade(id);
        if let Some(old) = old_parent.filter(|p| *p != parent) {
            self.cascade(old);
        }
        self.cascade(parent);
        Ok(())
    }

    /// Remove `id` from whatever holds it. Returns the old parent and
    /// whether the node was a pending deletion.
    fn unlink(&mut self, id: NodeId) -> (Option<NodeId>, bool) {
        let Some(node) = self.nodes.get_mut(id) else {
            return (None, false);
        };
        let parent = node.parent.take();
        let container = node.container.take();
        node.is_child = false;
        let mut pending = false;
        match (container, parent) {
            (Some(cid), _) => {
                if let Some(c) = self.collections.get_mut(cid) {
                    c.items.retain(|n| *n != id);
                    let before = c.deleted.len();
                    c.deleted.retain(|n| *n != id);
                    pending = before != c.deleted.len();
                }
            }
            (None, Some(pid)) => {
                if let Some(p) = self.nodes.get_mut(pid) {
                    p.children.retain(|n| *n != id);
                    let before = p.removed.len();
                    p.removed.retain(|n| *n != id);
                    pending = before != p.removed.len();
                }
            }
            (None, None) => {}
        }
        (parent, pending)
    }

    fn link(&mut self, id: NodeId, parent: NodeId, container: Option<CollectionId>) {
        match container {
            Some(cid) => {
                if let Some(c) = self.collections.get_mut(cid) {
                    c.items.push(id);
                }
            }
            None => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.push(id);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(parent);
            node.container = container;
            node.is_child = true;
        }
    }

    /// Detach semantics for a live child of `parent`.
    pub(crate) fn retire(&mut self, id: NodeId, parent: NodeId, container: Option<CollectionId>) {
        let is_new = self.nodes.get(id).is_some_and(|n| n.is_new);
        match container {
            Some(cid) => {
                if let Some(c) = self.collections.get_mut(cid) {
                    c.items.retain(|n| *n != id);
                    if !is_new {
                        c.deleted.push(id);
                    }
                }
            }
            None => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|n| *n != id);
                    if !is_new {
                        p.removed.push(id);
                    }
                }
            }
        }
        if is_new {
            self.free_subtree(id);
            tracing::debug!(node = %id, parent = %parent, "new node discarded on removal");
        } else {
            if let Some(node) = self.nodes.get_mut(id) {
                node.is_deleted = true;
            }
            self.emit(ChangeEvent::new(id, ChangeKind::IsDeleted));
            tracing::debug!(node = %id, parent = %parent, "node pending deletion");
            self.cascade(id);
        }
        self.cascade(parent);
    }

    /// Whether `id` sits in a container's pending deletions.
    pub(crate) fn is_pending_deletion(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        match (node.container, node.parent) {
            (Some(cid), _) => self
                .collections
                .get(cid)
                .is_some_and(|c| c.deleted.contains(&id)),
            (None, Some(pid)) => self.nodes.get(pid).is_some_and(|p| p.removed.contains(&id)),
            (None, None) => false,
        }
    }

    /// Unlink `id` from its container and free it with everything
    /// beneath it.
    pub(crate) fn purge(&mut self, id: NodeId) {
        let (parent, _) = self.unlink(id);
        self.free_subtree(id);
        if let Some(p) = parent {
            self.cascade(p);
        }
    }

    /// Free `id` and every node and collection beneath it, pending
    /// deletions included. The caller unlinks `id` first.
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let Some(node) = self.nodes.remove(n) else {
                continue;
            };
            stack.extend(node.children);
            stack.extend(node.removed);
            for cid in node.collections {
                if let Some(c) = self.collections.remove(cid) {
                    stack.extend(c.items);
                    stack.extend(c.deleted);
                }
            }
            tracing::trace!(node = %n, "node freed");
        }
    }
}
