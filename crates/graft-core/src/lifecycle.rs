//! Lifecycle enums shared by the rule pipeline and the persistence layer.

use std::fmt;

use crate::id::RuleId;

/// A persistence round-trip reported back to a node.
///
/// External persistence code completes exactly one of these per call,
/// and the node applies the matching lifecycle transition:
///
/// | operation | `is_new` after | `is_deleted` after | modification state |
/// |-----------|----------------|--------------------|--------------------|
/// | `Create`  | `true`         | `false`            | self-modified      |
/// | `Fetch`   | `false`        | `false`            | cleared (deep)     |
/// | `Insert`  | `false`        | `false`            | cleared (self)     |
/// | `Update`  | `false`        | `false`            | cleared (self)     |
/// | `Delete`  | `true`         | `false`            | cleared (self)     |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FactoryOperation {
    /// A new instance was initialised.
    Create,
    /// An existing instance was loaded from storage.
    Fetch,
    /// A new instance was written to storage.
    Insert,
    /// An existing instance was rewritten in storage.
    Update,
    /// An existing instance was removed from storage.
    Delete,
}

impl fmt::Display for FactoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Fetch => "fetch",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Why a property value changed.
///
/// Lets the pipeline avoid re-triggering a rule on its own writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeReason {
    /// An external caller edited the value.
    User,
    /// A rule outcome wrote the value.
    Rule(RuleId),
    /// Persistence code loaded the value (no rules, no modification).
    Load,
}

impl ChangeReason {
    /// The writing rule, if the change was rule-driven.
    pub fn rule(&self) -> Option<&RuleId> {
        match self {
            Self::Rule(id) => Some(id),
            _ => None,
        }
    }
}
