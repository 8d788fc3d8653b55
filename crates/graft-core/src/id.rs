//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a node (entity) within a graph.
///
/// Encodes an arena slot index plus the slot generation at allocation
/// time, so a handle to a freed node never resolves to a node that later
/// reuses the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    /// Arena slot index.
    pub index: u32,
    /// Slot generation when the node was allocated.
    pub generation: u32,
}

impl NodeId {
    /// Construct a node id from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

/// Identifies a collection container within a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId {
    /// Arena slot index.
    pub index: u32,
    /// Slot generation when the collection was allocated.
    pub generation: u32,
}

impl CollectionId {
    /// Construct a collection id from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}v{}", self.index, self.generation)
    }
}

/// Identifies a property within a node type.
///
/// `PropertyId(n)` corresponds to the n-th property registered on the
/// node type's schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Stable identifier of a rule.
///
/// Messages produced by a rule are grouped under its id, so a rerun
/// replaces only that rule's previous messages. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(Arc<str>);

impl RuleId {
    /// Create a rule id from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

impl From<String> for RuleId {
    fn from(v: String) -> Self {
        Self(Arc::from(v))
    }
}

/// Counter for unique [`ExecutionToken`] allocation.
static EXECUTION_TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one run of one rule on one triggering change.
///
/// Allocated from a monotonic atomic counter, so tokens are unique
/// process-wide and a later token always compares greater than an
/// earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionToken(u64);

impl ExecutionToken {
    /// Allocate a fresh, unique token. Thread-safe.
    pub fn next() -> Self {
        Self(EXECUTION_TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
