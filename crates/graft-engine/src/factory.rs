//! The context handed to persistence handlers.

use graft_core::{
    ChangeReason, FactoryOperation, GraphError, NodeId, Property, PropertyId, PropertyReader,
    PropertySet, PropertyValue, Value,
};

use crate::cell::PropertyCell;
use crate::schema::NodeType;

/// Access to one node's values during a create, fetch, insert, update
/// or delete handler.
///
/// Handlers read values through [`PropertyReader`] and write with
/// [`load`](Self::load), which bypasses rules, read-only flags and
/// modification tracking.
pub struct FactoryContext<'a> {
    node: NodeId,
    operation: FactoryOperation,
    ty: &'a NodeType,
    cells: &'a mut [PropertyCell],
    criteria: Option<&'a Value>,
    loaded: PropertySet,
}

impl<'a> FactoryContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        operation: FactoryOperation,
        ty: &'a NodeType,
        cells: &'a mut [PropertyCell],
        criteria: Option<&'a Value>,
    ) -> Self {
        Self {
            node,
            operation,
            ty,
            cells,
            criteria,
            loaded: PropertySet::empty(),
        }
    }

    /// The node being persisted.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The operation in progress.
    pub fn operation(&self) -> FactoryOperation {
        self.operation
    }

    /// The node's type.
    pub fn node_type(&self) -> &NodeType {
        self.ty
    }

    /// Fetch criteria; `None` for every operation except fetch.
    pub fn criteria(&self) -> Option<&Value> {
        self.criteria
    }

    /// Load a value through its typed key.
    pub fn load<T: PropertyValue>(
        &mut self,
        property: Property<T>,
        value: T,
    ) -> Result<(), GraphError> {
        self.load_value(property.id(), value.into_value())
    }

    /// Load a raw value, checking it against the declared kind.
    pub fn load_value(&mut self, property: PropertyId, value: Value) -> Result<(), GraphError> {
        self.ty.checked_def(property, &value)?;
        if let Some(cell) = self.cells.get_mut(property.0 as usize) {
            if cell.write(value, &ChangeReason::Load) {
                self.loaded.insert(property);
            }
        }
        Ok(())
    }

    pub(crate) fn into_loaded(self) -> PropertySet {
        self.loaded
    }
}

impl PropertyReader for FactoryContext<'_> {
    fn read(&self, property: PropertyId) -> Option<&Value> {
        self.cells.get(property.0 as usize).map(PropertyCell::value)
    }
}
