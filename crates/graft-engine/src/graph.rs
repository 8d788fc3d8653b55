//! The [`Graph`]: node and collection arenas plus the owning context
//! that applies every mutation.
//!
//! All node state lives here and is only mutated through `&mut Graph`.
//! Asynchronous rule bodies run on executor threads against owned
//! snapshots; their outcomes are applied back on the owning context by
//! [`Graph::pump`] or [`Graph::wait_for_pending`]. The rest of the
//! `impl Graph` surface is split by concern:
//!
//! - [`rules`](crate::rules): scheduling, async runs, supersession
//! - [`cascade`](crate::cascade): derived state, parent links, attach/detach
//! - [`collection`](crate::collection): collection containers
//! - [`lifecycle`](crate::lifecycle): lifecycle flags, create and fetch
//! - [`save`](crate::save): the save orchestrator
//! - [`batch`](crate::batch): deferred cascade scopes
//! - [`notify`](crate::notify): change subscriptions
//! - [`binding`](crate::binding): name-keyed access

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use graft_arena::Arena;
use graft_core::{
    ChangeReason, CollectionId, GraphError, NodeId, Property, PropertyId, PropertySet,
    PropertyValue, RuleMessage, Value,
};
use graft_rules::{NodeView, RulePipeline};

use crate::cell::PropertyCell;
use crate::config::{ConfigError, GraphConfig};
use crate::executor::RuleExecutor;
use crate::metrics::GraphMetrics;
use crate::node::{Collection, Node, NodeState};
use crate::notify::{ChangeEvent, ChangeKind, Subscriber, SubscriptionId};
use crate::schema::NodeType;

/// An arena of aggregate graphs and the context that owns them.
///
/// ```
/// use graft_engine::{Graph, GraphConfig, NodeType};
/// use graft_rules::Required;
///
/// let mut builder = NodeType::builder("Customer");
/// let name = builder.property::<String>("name");
/// builder.rule(Required::new(name, "name is required"));
/// let customer = builder.build().unwrap();
///
/// let mut graph = Graph::new(GraphConfig::default()).unwrap();
/// let node = graph.create(&customer).unwrap();
/// assert!(!graph.is_valid(node).unwrap());
/// graph.set(node, name, "Ada".to_owned()).unwrap();
/// assert!(graph.is_valid(node).unwrap());
/// assert!(graph.is_savable(node).unwrap());
/// ```
pub struct Graph {
    pub(crate) config: GraphConfig,
    pub(crate) nodes: Arena<NodeId, Node>,
    pub(crate) collections: Arena<CollectionId, Collection>,
    pub(crate) executor: RuleExecutor,
    pub(crate) subscribers: IndexMap<SubscriptionId, Box<Subscriber>>,
    pub(crate) next_subscription: u64,
    pub(crate) batch_depth: usize,
    pub(crate) dirty: IndexSet<NodeId>,
    pub(crate) queued: IndexSet<ChangeEvent>,
    pub(crate) metrics: GraphMetrics,
}

impl Graph {
    /// Validate `config` and start the rule executor.
    pub fn new(config: GraphConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let executor = RuleExecutor::spawn(config.resolved_worker_count())?;
        Ok(Self {
            config,
            nodes: Arena::new(),
            collections: Arena::new(),
            executor,
            subscribers: IndexMap::new(),
            next_subscription: 0,
            batch_depth: 0,
            dirty: IndexSet::new(),
            queued: IndexSet::new(),
            metrics: GraphMetrics::default(),
        })
    }

    /// The configuration the graph was built with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &GraphMetrics {
        &self.metrics
    }

    /// Number of live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Allocate an unattached, new node of type `ty`.
    ///
    /// No handler runs and no rule is executed; see
    /// [`create`](Self::create) for the full factory path.
    pub fn new_node(&mut self, ty: &Arc<NodeType>) -> Result<NodeId, GraphError> {
        let mut pipeline = RulePipeline::new();
        for rule in ty.rules() {
            pipeline.register(Arc::clone(rule))?;
        }
        let id = self.nodes.insert(Node::new(Arc::clone(ty), pipeline));
        if let Some(state) = self.compute_state(id) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = state;
            }
        }
        tracing::trace!(node = %id, node_type = %ty.name(), "node allocated");
        Ok(id)
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(id).ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn collection(&self, id: CollectionId) -> Result<&Collection, GraphError> {
        self.collections
            .get(id)
            .ok_or(GraphError::UnknownCollection(id))
    }

    // ── Property access ────────────────────────────────────────────

    /// The node's type.
    pub fn node_type(&self, id: NodeId) -> Result<&Arc<NodeType>, GraphError> {
        Ok(&self.node(id)?.ty)
    }

    /// One property's cell: value, messages, busy, read-only and
    /// self-modified state.
    pub fn cell(
        &self,
        id: NodeId,
        property: impl Into<PropertyId>,
    ) -> Result<&PropertyCell, GraphError> {
        let property = property.into();
        let node = self.node(id)?;
        node.cell(property)
            .ok_or_else(|| GraphError::UnknownProperty {
                type_name: node.ty.name().to_owned(),
                property,
            })
    }

    /// Raw value of a property.
    pub fn value(&self, id: NodeId, property: impl Into<PropertyId>) -> Result<&Value, GraphError> {
        self.cell(id, property).map(PropertyCell::value)
    }

    /// Typed value of a property. `None` when the value does not convert
    /// to `T` (e.g. null read through a non-`Option` key).
    pub fn get<T: PropertyValue>(
        &self,
        id: NodeId,
        property: Property<T>,
    ) -> Result<Option<T>, GraphError> {
        self.value(id, property).map(T::from_value)
    }

    /// Typed user edit. See [`set_value`](Self::set_value).
    pub fn set<T: PropertyValue>(
        &mut self,
        id: NodeId,
        property: Property<T>,
        value: T,
    ) -> Result<bool, GraphError> {
        self.set_value(id, property.id(), value.into_value())
    }

    /// User edit of a property. Returns whether the value changed.
    ///
    /// A read-only cell or an equal value is a silent no-op. Otherwise
    /// the cell becomes self-modified, the change cascades, and every
    /// rule triggered by the property runs: synchronous rules before
    /// this returns, asynchronous rules started.
    pub fn set_value(
        &mut self,
        id: NodeId,
        property: PropertyId,
        value: Value,
    ) -> Result<bool, GraphError> {
        let changed = self.write_cell(id, property, value, &ChangeReason::User)?;
        if changed {
            self.cascade(id);
            let trigger: PropertySet = [property].into_iter().collect();
            self.run_rules_for(id, &trigger, None, 0)?;
        }
        Ok(changed)
    }

    pub(crate) fn write_cell(
        &mut self,
        id: NodeId,
        property: PropertyId,
        value: Value,
        reason: &ChangeReason,
    ) -> Result<bool, GraphError> {
        let node = self.node_mut(id)?;
        node.ty.checked_def(property, &value)?;
        let changed = node
            .cell_mut(property)
            .is_some_and(|cell| cell.write(value, reason));
        if changed {
            self.emit(ChangeEvent::new(id, ChangeKind::Value(property)));
        }
        Ok(changed)
    }

    /// Toggle a property's read-only flag. Returns whether it changed.
    pub fn set_read_only(
        &mut self,
        id: NodeId,
        property: impl Into<PropertyId>,
        read_only: bool,
    ) -> Result<bool, GraphError> {
        let property = property.into();
        self.cell(id, property)?;
        let changed = self
            .node_mut(id)?
            .cell_mut(property)
            .is_some_and(|cell| cell.set_read_only(read_only));
        if changed {
            self.emit(ChangeEvent::new(id, ChangeKind::ReadOnly(property)));
        }
        Ok(changed)
    }

    /// Every message on the node's own cells, in property order.
    pub fn messages(&self, id: NodeId) -> Result<Vec<RuleMessage>, GraphError> {
        Ok(self
            .node(id)?
            .cells
            .iter()
            .flat_map(PropertyCell::messages)
            .cloned()
            .collect())
    }

    /// Error-severity messages on the node's own cells.
    pub fn error_messages(&self, id: NodeId) -> Result<Vec<RuleMessage>, GraphError> {
        let mut messages = self.messages(id)?;
        messages.retain(RuleMessage::is_error);
        Ok(messages)
    }

    /// Properties whose cells are self-modified.
    pub fn modified_properties(&self, id: NodeId) -> Result<PropertySet, GraphError> {
        Ok(self.node(id)?.modified_properties())
    }

    pub(crate) fn view(&self, id: NodeId, changed: PropertySet) -> Result<NodeView, GraphError> {
        let node = self.node(id)?;
        let values = node.cells.iter().map(|c| c.value().clone()).collect();
        Ok(NodeView::new(id, values, changed))
    }

    // ── Derived state ──────────────────────────────────────────────

    /// The node's cached derived state.
    ///
    /// Inside a batch scope this reflects the state before the scope
    /// opened, until the scope closes.
    pub fn state(&self, id: NodeId) -> Result<NodeState, GraphError> {
        Ok(self.node(id)?.state)
    }

    /// No error-severity messages on the node or any live descendant.
    pub fn is_valid(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.state(id)?.valid)
    }

    /// A cell, a rule run, or a live descendant is busy.
    pub fn is_busy(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.state(id)?.busy)
    }

    /// The node or a live descendant is modified, or a removal awaits
    /// deletion.
    pub fn is_modified(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.state(id)?.modified)
    }

    /// A cell changed, or the node is new, deleted or marked modified.
    pub fn is_self_modified(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.state(id)?.self_modified)
    }

    /// Modified, valid, not busy, and not a child.
    pub fn is_savable(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.state(id)?.savable)
    }

    /// Never persisted (or deleted from storage).
    pub fn is_new(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(id)?.is_new)
    }

    /// Marked for deletion.
    pub fn is_deleted(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(id)?.is_deleted)
    }

    /// Attached beneath another node.
    pub fn is_child(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.node(id)?.is_child)
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("collections", &self.collections.len())
            .field("workers", &self.executor.worker_count())
            .field("subscribers", &self.subscribers.len())
            .field("batch_depth", &self.batch_depth)
            .finish_non_exhaustive()
    }
}
