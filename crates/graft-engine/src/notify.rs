//! Change notifications.
//!
//! Subscribers receive a [`ChangeEvent`] whenever a cell's or a node's
//! observable state changes. Inside a [batch scope](crate::BatchScope)
//! events are queued, deduplicated, and delivered once when the
//! outermost scope closes. Subscriptions live until
//! [`Graph::unsubscribe`] is called.

use std::fmt;

use graft_core::{NodeId, PropertyId};

use crate::graph::Graph;
use crate::node::NodeState;

/// What changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A property value.
    Value(PropertyId),
    /// A property's messages.
    Messages(PropertyId),
    /// A property's busy flag.
    Busy(PropertyId),
    /// A property's read-only flag.
    ReadOnly(PropertyId),
    /// The node's validity.
    IsValid,
    /// The node's busy state.
    IsBusy,
    /// The node's modified state.
    IsModified,
    /// The node's self-modified state.
    IsSelfModified,
    /// The node's savable state.
    IsSavable,
    /// The node's new flag.
    IsNew,
    /// The node's deleted flag.
    IsDeleted,
    /// The node's parent link.
    Parent,
}

impl ChangeKind {
    /// The property concerned, for cell-level changes.
    pub fn property(&self) -> Option<PropertyId> {
        match self {
            Self::Value(p) | Self::Messages(p) | Self::Busy(p) | Self::ReadOnly(p) => Some(*p),
            _ => None,
        }
    }

    /// State name as exposed at the binding boundary.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Messages(_) => "messages",
            Self::Busy(_) => "isBusy",
            Self::ReadOnly(_) => "isReadOnly",
            Self::IsValid => "isValid",
            Self::IsBusy => "isBusy",
            Self::IsModified => "isModified",
            Self::IsSelfModified => "isSelfModified",
            Self::IsSavable => "isSavable",
            Self::IsNew => "isNew",
            Self::IsDeleted => "isDeleted",
            Self::Parent => "parent",
        }
    }
}

/// A change on one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// The node that changed.
    pub node: NodeId,
    /// What changed.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Create an event.
    pub fn new(node: NodeId, kind: ChangeKind) -> Self {
        Self { node, kind }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.property() {
            Some(p) => write!(f, "{} {} of property {}", self.node, self.kind.name(), p),
            None => write!(f, "{} {}", self.node, self.kind.name()),
        }
    }
}

/// Handle returned by [`Graph::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub(crate) type Subscriber = dyn FnMut(&ChangeEvent) + Send;

impl Graph {
    /// Register a change callback.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.insert(id, Box::new(callback));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.shift_remove(&id).is_some()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn emit(&mut self, event: ChangeEvent) {
        if self.batch_depth > 0 {
            self.queued.insert(event);
        } else {
            self.deliver(&event);
        }
    }

    pub(crate) fn deliver(&mut self, event: &ChangeEvent) {
        for subscriber in self.subscribers.values_mut() {
            subscriber(event);
        }
        self.metrics.notifications_delivered += self.subscribers.len() as u64;
    }

    pub(crate) fn emit_state_changes(&mut self, node: NodeId, prev: &NodeState, next: &NodeState) {
        let flags = [
            (prev.valid != next.valid, ChangeKind::IsValid),
            (prev.busy != next.busy, ChangeKind::IsBusy),
            (prev.modified != next.modified, ChangeKind::IsModified),
            (prev.self_modified != next.self_modified, ChangeKind::IsSelfModified),
            (prev.savable != next.savable, ChangeKind::IsSavable),
        ];
        for (changed, kind) in flags {
            if changed {
                self.emit(ChangeEvent::new(node, kind));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_display_names_property() {
        let node = NodeId::new(2, 0);
        let e = ChangeEvent::new(node, ChangeKind::Messages(PropertyId(1)));
        assert_eq!(e.to_string(), "n2v0 messages of property 1");
        let e = ChangeEvent::new(node, ChangeKind::IsValid);
        assert_eq!(e.to_string(), "n2v0 isValid");
        assert_eq!(e.kind.property(), None);
    }
}
