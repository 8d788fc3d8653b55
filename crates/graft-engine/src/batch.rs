//! Deferred cascade scopes.
//!
//! While a [`BatchScope`] is open, cascade requests only record the
//! node as dirty and change events are queued with duplicates dropped.
//! Closing the outermost scope recomputes every dirty node deepest
//! first, propagates upward once, and then delivers the queued events.
//! The scope closes on drop, so early returns and `?` still flush.

use std::ops::{Deref, DerefMut};

use crate::graph::Graph;

/// A batch scope over a [`Graph`]. Dereferences to the graph.
///
/// ```
/// use graft_engine::{Graph, GraphConfig, NodeType};
///
/// let ty = NodeType::builder("Tag").build().unwrap();
/// let mut graph = Graph::new(GraphConfig::default()).unwrap();
/// {
///     let mut scope = graph.batch();
///     for _ in 0..3 {
///         scope.create(&ty).unwrap();
///     }
///     assert!(scope.in_batch());
/// }
/// assert!(!graph.in_batch());
/// assert_eq!(graph.node_count(), 3);
/// ```
pub struct BatchScope<'g> {
    graph: &'g mut Graph,
}

impl Graph {
    /// Open a batch scope. Scopes nest; only the outermost flushes.
    pub fn batch(&mut self) -> BatchScope<'_> {
        self.batch_depth += 1;
        tracing::trace!(depth = self.batch_depth, "batch opened");
        BatchScope { graph: self }
    }

    /// Whether a batch scope is open.
    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    fn end_batch(&mut self) {
        if self.batch_depth > 1 {
            self.batch_depth -= 1;
            return;
        }
        // Still at depth 1: events raised while settling are queued and
        // deduplicated with the rest.
        let settled = self.flush_dirty();
        self.batch_depth = 0;

        let queued: Vec<_> = self.queued.drain(..).collect();
        let delivered = queued.len();
        for event in &queued {
            self.deliver(event);
        }
        tracing::debug!(settled, delivered, "batch closed");
    }
}

impl Graph {
    /// Recompute every node whose cascade was deferred, deepest first.
    /// Queued events stay queued. Returns the number of nodes settled.
    pub(crate) fn flush_dirty(&mut self) -> usize {
        let mut dirty: Vec<_> = self.dirty.drain(..).collect();
        dirty.retain(|id| self.nodes.contains(*id));
        dirty.sort_by_key(|id| std::cmp::Reverse(self.depth(*id)));
        let settled = dirty.len();
        for id in dirty {
            self.cascade_now(id);
        }
        settled
    }
}

impl Deref for BatchScope<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        self.graph
    }
}

impl DerefMut for BatchScope<'_> {
    fn deref_mut(&mut self) -> &mut Graph {
        self.graph
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        self.graph.end_batch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use graft_core::PropertyId;
    use graft_rules::Required;

    use crate::config::GraphConfig;
    use crate::notify::{ChangeEvent, ChangeKind};
    use crate::schema::NodeType;

    fn graph() -> Graph {
        Graph::new(GraphConfig {
            worker_count: Some(1),
            ..GraphConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn state_settles_when_scope_closes() {
        let mut g = graph();
        let mut b = NodeType::builder("Item");
        let name = b.property::<String>("name");
        b.rule(Required::new(name, "required"));
        let ty = b.build().unwrap();
        let id = g.create(&ty).unwrap();
        assert!(!g.is_valid(id).unwrap());
        {
            let mut scope = g.batch();
            scope.set(id, name, "x".to_owned()).unwrap();
            // Cached state is stale inside the scope.
            assert!(!scope.is_valid(id).unwrap());
        }
        assert!(g.is_valid(id).unwrap());
    }

    #[test]
    fn events_are_deduplicated_and_deferred() {
        let mut g = graph();
        let mut b = NodeType::builder("Item");
        b.property::<i64>("count");
        let ty = b.build().unwrap();
        let id = g.create(&ty).unwrap();

        let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::default();
        let sink = Arc::clone(&seen);
        g.subscribe(move |e| sink.lock().unwrap().push(*e));
        {
            let mut scope = g.batch();
            for i in 1..=5_i64 {
                scope.set_value(id, PropertyId(0), i.into()).unwrap();
            }
            {
                let mut inner = scope.batch();
                inner.set_value(id, PropertyId(0), 6_i64.into()).unwrap();
            }
            assert!(seen.lock().unwrap().is_empty());
        }
        let seen = seen.lock().unwrap();
        let values = seen
            .iter()
            .filter(|e| e.kind == ChangeKind::Value(PropertyId(0)))
            .count();
        assert_eq!(values, 1);
    }
}
