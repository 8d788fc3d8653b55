//! Node and collection storage plus the derived-state snapshot.

use std::sync::Arc;

use graft_core::{CollectionId, NodeId, PropertyId, PropertySet};
use graft_rules::RulePipeline;

use crate::cell::PropertyCell;
use crate::schema::NodeType;

/// A node's derived state.
///
/// `valid`, `busy` and `modified` cascade to the parent; the remaining
/// flags are local and only drive notifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeState {
    /// No error-severity messages on the node or any live descendant.
    pub valid: bool,
    /// A cell is busy, a rule run is in flight, or a descendant is busy.
    pub busy: bool,
    /// The node, a live descendant, or a pending deletion is modified.
    pub modified: bool,
    /// A cell changed, or the node is new, deleted or explicitly marked.
    pub self_modified: bool,
    /// `modified && valid && !busy && !is_child`.
    pub savable: bool,
}

impl NodeState {
    /// The part of the state a parent's derived state depends on.
    pub fn triple(&self) -> (bool, bool, bool) {
        (self.valid, self.busy, self.modified)
    }
}

pub(crate) struct Node {
    pub(crate) ty: Arc<NodeType>,
    pub(crate) cells: Vec<PropertyCell>,
    pub(crate) pipeline: RulePipeline,
    pub(crate) parent: Option<NodeId>,
    /// Collection holding the node as an item or deleted item.
    pub(crate) container: Option<CollectionId>,
    pub(crate) is_child: bool,
    pub(crate) is_new: bool,
    pub(crate) is_deleted: bool,
    pub(crate) marked_modified: bool,
    /// Children held directly in a field slot.
    pub(crate) children: Vec<NodeId>,
    /// Field-slot children removed while persisted, awaiting Delete.
    pub(crate) removed: Vec<NodeId>,
    pub(crate) collections: Vec<CollectionId>,
    pub(crate) state: NodeState,
}

impl Node {
    pub(crate) fn new(ty: Arc<NodeType>, pipeline: RulePipeline) -> Self {
        let cells = ty.properties().iter().map(PropertyCell::new).collect();
        Self {
            ty,
            cells,
            pipeline,
            parent: None,
            container: None,
            is_child: false,
            is_new: true,
            is_deleted: false,
            marked_modified: false,
            children: Vec::new(),
            removed: Vec::new(),
            collections: Vec::new(),
            state: NodeState::default(),
        }
    }

    pub(crate) fn cell(&self, property: PropertyId) -> Option<&PropertyCell> {
        self.cells.get(property.0 as usize)
    }

    pub(crate) fn cell_mut(&mut self, property: PropertyId) -> Option<&mut PropertyCell> {
        self.cells.get_mut(property.0 as usize)
    }

    pub(crate) fn is_self_modified(&self) -> bool {
        self.is_new
            || self.is_deleted
            || self.marked_modified
            || self.cells.iter().any(PropertyCell::is_self_modified)
    }

    pub(crate) fn modified_properties(&self) -> PropertySet {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_self_modified())
            .map(|(i, _)| PropertyId(i as u32))
            .collect()
    }

    /// Clear own modification state. Returns whether anything was set.
    pub(crate) fn clean_self(&mut self) -> bool {
        let mut changed = std::mem::replace(&mut self.marked_modified, false);
        for cell in &mut self.cells {
            changed |= cell.mark_clean();
        }
        changed
    }
}

pub(crate) struct Collection {
    pub(crate) owner: NodeId,
    pub(crate) items: Vec<NodeId>,
    pub(crate) deleted: Vec<NodeId>,
}

impl Collection {
    pub(crate) fn new(owner: NodeId) -> Self {
        Self {
            owner,
            items: Vec::new(),
            deleted: Vec::new(),
        }
    }
}
