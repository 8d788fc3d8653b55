//! Collection containers.
//!
//! A collection is owned by one node and holds an ordered list of items
//! plus the items removed while persisted (`deleted_items`), which a
//! save still has to issue Delete for. Items count as live children of
//! the owner for validity, busy and modified state.

use graft_core::{CollectionId, GraphError, NodeId};

use crate::graph::Graph;
use crate::node::Collection;

impl Graph {
    /// Create an empty collection owned by `owner`.
    pub fn new_collection(&mut self, owner: NodeId) -> Result<CollectionId, GraphError> {
        self.node(owner)?;
        let cid = self.collections.insert(Collection::new(owner));
        self.node_mut(owner)?.collections.push(cid);
        tracing::trace!(collection = %cid, owner = %owner, "collection created");
        Ok(cid)
    }

    /// Append `id` to the collection, attaching it beneath the owner.
    ///
    /// Adding marks the owner modified. Re-adding an item removed from
    /// this collection restores it and clears its deleted flag.
    ///
    /// # Errors
    ///
    /// [`GraphError::AlreadyMember`] if `id` is already an item;
    /// [`GraphError::CrossAggregate`] if `id` belongs to another
    /// aggregate. On error the graph is unchanged.
    pub fn add(&mut self, collection: CollectionId, id: NodeId) -> Result<(), GraphError> {
        let owner = self.collection(collection)?.owner;
        if self.collection(collection)?.items.contains(&id) {
            return Err(GraphError::AlreadyMember { node: id, collection });
        }
        self.attach_under(id, owner, Some(collection))?;
        let node = self.node_mut(owner)?;
        node.marked_modified = true;
        self.cascade(owner);
        tracing::debug!(collection = %collection, node = %id, "item added");
        Ok(())
    }

    /// Remove `id` from the collection.
    ///
    /// A new item is discarded. A persisted item moves to
    /// [`deleted_items`](Self::deleted_items), marked deleted, until a
    /// save of the aggregate issues its Delete.
    pub fn remove(&mut self, collection: CollectionId, id: NodeId) -> Result<(), GraphError> {
        let owner = self.collection(collection)?.owner;
        if !self.collection(collection)?.items.contains(&id) {
            return Err(GraphError::NotAttached(id));
        }
        self.retire(id, owner, Some(collection));
        Ok(())
    }

    /// The item at `index`, in insertion order.
    pub fn item(&self, collection: CollectionId, index: usize) -> Result<Option<NodeId>, GraphError> {
        Ok(self.collection(collection)?.items.get(index).copied())
    }

    /// Items in insertion order. The iterator can be recreated at will
    /// and borrows the graph.
    pub fn items(
        &self,
        collection: CollectionId,
    ) -> Result<impl Iterator<Item = NodeId> + '_, GraphError> {
        Ok(self.collection(collection)?.items.iter().copied())
    }

    /// Number of live items.
    pub fn collection_len(&self, collection: CollectionId) -> Result<usize, GraphError> {
        Ok(self.collection(collection)?.items.len())
    }

    /// Items removed while persisted, awaiting Delete.
    pub fn deleted_items(&self, collection: CollectionId) -> Result<&[NodeId], GraphError> {
        Ok(&self.collection(collection)?.deleted)
    }

    /// The node owning the collection.
    pub fn collection_owner(&self, collection: CollectionId) -> Result<NodeId, GraphError> {
        Ok(self.collection(collection)?.owner)
    }

    /// Position of `id` among the live items.
    pub fn index_of(&self, collection: CollectionId, id: NodeId) -> Result<Option<usize>, GraphError> {
        Ok(self
            .collection(collection)?
            .items
            .iter()
            .position(|n| *n == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use graft_core::PropertyId;
    use graft_rules::Required;

    use crate::config::GraphConfig;
    use crate::schema::NodeType;

    fn setup() -> (Graph, Arc<NodeType>, Arc<NodeType>) {
        let graph = Graph::new(GraphConfig {
            worker_count: Some(1),
            ..GraphConfig::default()
        })
        .unwrap();
        let order = NodeType::builder("Order").build().unwrap();
        let mut line = NodeType::builder("Line");
        let sku = line.property::<String>("sku");
        line.rule(Required::new(sku, "sku is required"));
        (graph, order, line.build().unwrap())
    }

    #[test]
    fn items_iterate_in_insertion_order() {
        let (mut g, order, line) = setup();
        let root = g.create(&order).unwrap();
        let lines = g.new_collection(root).unwrap();
        let a = g.create(&line).unwrap();
        let b = g.create(&line).unwrap();
        g.add(lines, a).unwrap();
        g.add(lines, b).unwrap();
        assert_eq!(g.items(lines).unwrap().collect::<Vec<_>>(), vec![a, b]);
        // Restartable.
        assert_eq!(g.items(lines).unwrap().count(), 2);
        assert_eq!(g.item(lines, 1).unwrap(), Some(b));
        assert_eq!(g.item(lines, 2).unwrap(), None);
        assert_eq!(g.index_of(lines, b).unwrap(), Some(1));
        assert_eq!(g.collection_owner(lines).unwrap(), root);
        assert_eq!(g.aggregate_root(b).unwrap(), root);
    }

    #[test]
    fn add_twice_is_rejected() {
        let (mut g, order, line) = setup();
        let root = g.create(&order).unwrap();
        let lines = g.new_collection(root).unwrap();
        let a = g.create(&line).unwrap();
        g.add(lines, a).unwrap();
        assert_eq!(
            g.add(lines, a).unwrap_err(),
            GraphError::AlreadyMember { node: a, collection: lines }
        );
        assert_eq!(g.collection_len(lines).unwrap(), 1);
    }

    #[test]
    fn add_marks_owner_modified() {
        let (mut g, order, line) = setup();
        let root = g.create(&order).unwrap();
        let lines = g.new_collection(root).unwrap();
        g.mark_old(root).unwrap();
        g.mark_unmodified(root).unwrap();
        assert!(!g.is_modified(root).unwrap());

        let a = g.create(&line).unwrap();
        g.set_value(a, PropertyId(0), "A-1".into()).unwrap();
        g.mark_old(a).unwrap();
        g.mark_unmodified(a).unwrap();
        g.add(lines, a).unwrap();
        assert!(g.is_self_modified(root).unwrap());
        assert!(g.is_modified(root).unwrap());
        assert!(!g.is_self_modified(a).unwrap());
    }

    #[test]
    fn remove_persisted_item_then_re_add_restores_it() {
        let (mut g, order, line) = setup();
        let root = g.create(&order).unwrap();
        let lines = g.new_collection(root).unwrap();
        let a = g.create(&line).unwrap();
        g.mark_old(a).unwrap();
        g.add(lines, a).unwrap();

        g.remove(lines, a).unwrap();
        assert_eq!(g.collection_len(lines).unwrap(), 0);
        assert_eq!(g.deleted_items(lines).unwrap(), &[a]);
        assert!(g.is_deleted(a).unwrap());
        assert_eq!(g.remove(lines, a).unwrap_err(), GraphError::NotAttached(a));

        g.add(lines, a).unwrap();
        assert!(g.deleted_items(lines).unwrap().is_empty());
        assert!(!g.is_deleted(a).unwrap());
        assert_eq!(g.items(lines).unwrap().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn remove_new_item_discards_it() {
        let (mut g, order, line) = setup();
        let root = g.create(&order).unwrap();
        let lines = g.new_collection(root).unwrap();
        let a = g.create(&line).unwrap();
        g.add(lines, a).unwrap();
        assert!(!g.is_valid(root).unwrap());
        g.remove(lines, a).unwrap();
        assert!(!g.contains(a));
        assert!(g.deleted_items(lines).unwrap().is_empty());
        assert!(g.is_valid(root).unwrap());
    }

    #[test]
    fn item_of_other_aggregate_is_rejected_unchanged() {
        let (mut g, order, line) = setup();
        let first = g.create(&order).unwrap();
        let second = g.create(&order).unwrap();
        let first_lines = g.new_collection(first).unwrap();
        let second_lines = g.new_collection(second).unwrap();
        let a = g.create(&line).unwrap();
        g.add(first_lines, a).unwrap();

        let err = g.add(second_lines, a).unwrap_err();
        assert_eq!(
            err,
            GraphError::CrossAggregate {
                node: a,
                node_root: first,
                target_root: second,
            }
        );
        assert_eq!(g.collection_len(second_lines).unwrap(), 0);
        assert_eq!(g.items(first_lines).unwrap().collect::<Vec<_>>(), vec![a]);
        assert_eq!(g.parent(a).unwrap(), Some(first));
    }
}
