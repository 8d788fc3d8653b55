//! Core abstraction traits for property access.

use crate::id::PropertyId;
use crate::property::Property;
use crate::value::{PropertyValue, Value};

/// Read-only access to a node's property values.
///
/// Implemented by rule views and persistence contexts. Returns `None`
/// if the property does not exist on the node type.
pub trait PropertyReader {
    /// Read the raw value of a property.
    fn read(&self, property: PropertyId) -> Option<&Value>;

    /// Read a property through its typed key.
    ///
    /// Returns `None` if the property is missing or its value does not
    /// convert to `T`.
    fn get<T: PropertyValue>(&self, property: Property<T>) -> Option<T>
    where
        Self: Sized,
    {
        self.read(property.id()).and_then(T::from_value)
    }
}
