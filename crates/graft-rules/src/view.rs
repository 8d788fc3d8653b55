//! Snapshot of a node passed to rule bodies.

use graft_core::{NodeId, PropertyId, PropertyReader, PropertySet, Value};

/// An owned, read-only snapshot of one node's property values.
///
/// Taken on the owning context when a rule run starts. Because it owns
/// its data it can cross to an executor thread; the rule never observes
/// writes made after its run started, which keeps cross-property checks
/// consistent.
#[derive(Clone, Debug)]
pub struct NodeView {
    node: NodeId,
    values: Vec<Value>,
    changed: PropertySet,
}

impl NodeView {
    /// Build a view from the node's values in property-id order.
    pub fn new(node: NodeId, values: Vec<Value>, changed: PropertySet) -> Self {
        Self {
            node,
            values,
            changed,
        }
    }

    /// The node this snapshot was taken from.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The properties whose change started this run.
    pub fn changed(&self) -> &PropertySet {
        &self.changed
    }

    /// Number of properties in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no properties.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PropertyReader for NodeView {
    fn read(&self, property: PropertyId) -> Option<&Value> {
        self.values.get(property.0 as usize)
    }
}
