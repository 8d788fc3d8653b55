//! Name-keyed property access for binding layers.
//!
//! Inside the engine properties are addressed by [`PropertyId`] or a
//! typed [`Property`](graft_core::Property) key. UI and transport code
//! that only knows property names goes through these helpers.

use graft_core::{GraphError, NodeId, PropertyId, Value};

use crate::graph::Graph;

impl Graph {
    /// Resolve a property name on the node's type.
    pub fn property_by_name(&self, id: NodeId, name: &str) -> Result<PropertyId, GraphError> {
        let ty = self.node_type(id)?;
        ty.property_by_name(name)
            .ok_or_else(|| GraphError::UnknownPropertyName {
                type_name: ty.name().to_owned(),
                name: name.to_owned(),
            })
    }

    /// Value of the property called `name`.
    pub fn value_by_name(&self, id: NodeId, name: &str) -> Result<&Value, GraphError> {
        let property = self.property_by_name(id, name)?;
        self.value(id, property)
    }

    /// User edit of the property called `name`.
    pub fn set_value_by_name(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<bool, GraphError> {
        let property = self.property_by_name(id, name)?;
        self.set_value(id, property, value.into())
    }

    /// Names of the node's self-modified properties, in declaration
    /// order.
    pub fn modified_property_names(&self, id: NodeId) -> Result<Vec<&str>, GraphError> {
        let node = self.node(id)?;
        Ok(node
            .modified_properties()
            .iter()
            .filter_map(|p| node.ty.property(p))
            .map(|def| def.name.as_str())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::GraphConfig;
    use crate::schema::NodeType;

    #[test]
    fn names_resolve_through_the_type() {
        let mut g = Graph::new(GraphConfig {
            worker_count: Some(1),
            ..GraphConfig::default()
        })
        .unwrap();
        let mut b = NodeType::builder("Address");
        b.property::<String>("street");
        b.property::<String>("city");
        let ty = b.build().unwrap();
        let id = g.create(&ty).unwrap();

        assert!(g.set_value_by_name(id, "city", "Lyon").unwrap());
        assert_eq!(g.value_by_name(id, "city").unwrap(), &Value::Text("Lyon".into()));
        assert_eq!(g.modified_property_names(id).unwrap(), vec!["city"]);
        assert_eq!(
            g.property_by_name(id, "zip").unwrap_err(),
            GraphError::UnknownPropertyName {
                type_name: "Address".into(),
                name: "zip".into(),
            }
        );
    }
}
