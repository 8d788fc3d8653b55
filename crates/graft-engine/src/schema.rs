//! Node types: property definitions, rules and persistence handlers.
//!
//! A [`NodeType`] is built once with [`NodeTypeBuilder`] and shared
//! (`Arc`) by every node of that type. Building validates the rule set
//! against the declared properties, so a graph never allocates a node
//! whose rules reference a missing property.

use std::fmt;
use std::sync::Arc;

use graft_core::{
    FactoryOperation, GraphError, PersistError, Property, PropertyDef, PropertyId, PropertySet,
    PropertyValue, Value,
};
use graft_rules::{validate_rules, Rule};

use crate::config::ConfigError;
use crate::factory::FactoryContext;

/// A persistence handler supplied by external code.
pub type FactoryHandler =
    Arc<dyn Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync>;

const OPERATIONS: usize = 5;

fn slot(operation: FactoryOperation) -> usize {
    match operation {
        FactoryOperation::Create => 0,
        FactoryOperation::Fetch => 1,
        FactoryOperation::Insert => 2,
        FactoryOperation::Update => 3,
        FactoryOperation::Delete => 4,
    }
}

/// Schema shared by every node of one type.
pub struct NodeType {
    name: String,
    properties: Vec<PropertyDef>,
    rules: Vec<Arc<dyn Rule>>,
    handlers: [Option<FactoryHandler>; OPERATIONS],
}

impl NodeType {
    /// Start defining a node type.
    pub fn builder(name: impl Into<String>) -> NodeTypeBuilder {
        NodeTypeBuilder {
            name: name.into(),
            properties: Vec::new(),
            rules: Vec::new(),
            handlers: Default::default(),
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property definitions in id order.
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Number of properties.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Definition of one property.
    pub fn property(&self, id: PropertyId) -> Option<&PropertyDef> {
        self.properties.get(id.0 as usize)
    }

    /// Look a property up by name.
    pub fn property_by_name(&self, name: &str) -> Option<PropertyId> {
        self.properties
            .iter()
            .position(|p| p.name == name)
            .map(|i| PropertyId(i as u32))
    }

    /// Every property id of this type.
    pub fn all_properties(&self) -> PropertySet {
        PropertySet::full(self.properties.len())
    }

    /// Registered rules in declaration order.
    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// The handler for `operation`, if one was supplied.
    pub fn handler(&self, operation: FactoryOperation) -> Option<&FactoryHandler> {
        self.handlers[slot(operation)].as_ref()
    }

    /// Whether a handler for `operation` was supplied.
    pub fn has_handler(&self, operation: FactoryOperation) -> bool {
        self.handler(operation).is_some()
    }

    pub(crate) fn checked_def(
        &self,
        property: PropertyId,
        value: &Value,
    ) -> Result<&PropertyDef, GraphError> {
        let def = self
            .property(property)
            .ok_or_else(|| GraphError::UnknownProperty {
                type_name: self.name.clone(),
                property,
            })?;
        match value.kind() {
            Some(found) if found != def.kind => Err(GraphError::TypeMismatch {
                property: def.name.clone(),
                expected: def.kind,
                found,
            }),
            _ => Ok(def),
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<String> = [
            FactoryOperation::Create,
            FactoryOperation::Fetch,
            FactoryOperation::Insert,
            FactoryOperation::Update,
            FactoryOperation::Delete,
        ]
        .into_iter()
        .filter(|op| self.has_handler(*op))
        .map(|op| op.to_string())
        .collect();
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("rules", &self.rules.len())
            .field("handlers", &handlers)
            .finish()
    }
}

/// Builder for [`NodeType`].
///
/// Properties receive ids in declaration order. Typed keys returned by
/// [`property`](Self::property) can be stored next to the type:
///
/// ```
/// use graft_core::PropertyDef;
/// use graft_engine::NodeType;
/// use graft_rules::Required;
///
/// let mut builder = NodeType::builder("Customer");
/// let name = builder.property::<String>("name");
/// let credit = builder.property_def::<f64>(PropertyDef::new("credit", graft_core::ValueKind::Float)
///     .with_default(0.0));
/// builder.rule(Required::new(name, "name is required"));
/// let customer = builder.build().unwrap();
/// assert_eq!(customer.property_by_name("credit"), Some(credit.id()));
/// ```
pub struct NodeTypeBuilder {
    name: String,
    properties: Vec<PropertyDef>,
    rules: Vec<Arc<dyn Rule>>,
    handlers: [Option<FactoryHandler>; OPERATIONS],
}

impl NodeTypeBuilder {
    /// Declare a writable property with a null default.
    pub fn property<T: PropertyValue>(&mut self, name: impl Into<String>) -> Property<T> {
        self.property_def(PropertyDef::new(name, T::KIND))
    }

    /// Declare a property from a full definition. The definition's kind
    /// is replaced by `T`'s.
    pub fn property_def<T: PropertyValue>(&mut self, mut def: PropertyDef) -> Property<T> {
        def.kind = T::KIND;
        Property::new(self.raw_property(def))
    }

    /// Declare an untyped property.
    pub fn raw_property(&mut self, def: PropertyDef) -> PropertyId {
        let id = PropertyId(self.properties.len() as u32);
        self.properties.push(def);
        id
    }

    /// Register a rule.
    pub fn rule(&mut self, rule: impl Rule) -> &mut Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Register a shared rule.
    pub fn shared_rule(&mut self, rule: Arc<dyn Rule>) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Supply the handler for `operation`, replacing any earlier one.
    pub fn handler<F>(&mut self, operation: FactoryOperation, handler: F) -> &mut Self
    where
        F: Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync + 'static,
    {
        self.handlers[slot(operation)] = Some(Arc::new(handler));
        self
    }

    /// Supply the create handler.
    pub fn on_create<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync + 'static,
    {
        self.handler(FactoryOperation::Create, handler)
    }

    /// Supply the fetch handler.
    pub fn on_fetch<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync + 'static,
    {
        self.handler(FactoryOperation::Fetch, handler)
    }

    /// Supply the insert handler.
    pub fn on_insert<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync + 'static,
    {
        self.handler(FactoryOperation::Insert, handler)
    }

    /// Supply the update handler.
    pub fn on_update<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync + 'static,
    {
        self.handler(FactoryOperation::Update, handler)
    }

    /// Supply the delete handler.
    pub fn on_delete<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut FactoryContext<'_>) -> Result<(), PersistError> + Send + Sync + 'static,
    {
        self.handler(FactoryOperation::Delete, handler)
    }

    /// Validate and freeze the type.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateProperty`] for a repeated property name,
    /// [`ConfigError::InvalidDefault`] for a default that does not fit
    /// its kind, and [`ConfigError::Rules`] when the rule set fails
    /// [`validate_rules`].
    pub fn build(self) -> Result<Arc<NodeType>, ConfigError> {
        for (i, def) in self.properties.iter().enumerate() {
            if self.properties[..i].iter().any(|p| p.name == def.name) {
                return Err(ConfigError::DuplicateProperty {
                    type_name: self.name.clone(),
                    property: def.name.clone(),
                });
            }
            if !def.default.fits(def.kind) {
                return Err(ConfigError::InvalidDefault {
                    property: def.name.clone(),
                    expected: def.kind,
                    default: def.default.clone(),
                });
            }
        }
        validate_rules(&self.rules, &PropertySet::full(self.properties.len()))?;
        tracing::debug!(
            node_type = %self.name,
            properties = self.properties.len(),
            rules = self.rules.len(),
            "node type built"
        );
        Ok(Arc::new(NodeType {
            name: self.name,
            properties: self.properties,
            rules: self.rules,
            handlers: self.handlers,
        }))
    }
}
