//! Rule messages and their severity.

use std::fmt;

use crate::id::{PropertyId, RuleId};

/// Severity of a rule message.
///
/// Only [`Severity::Error`] affects validity; warnings and information
/// are surfaced to callers but never block a save.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Blocks validity.
    Error,
    /// Advisory.
    Warning,
    /// Informational.
    Information,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "information",
        };
        f.write_str(name)
    }
}

/// A message produced by a rule against one property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleMessage {
    /// The rule that produced the message.
    pub rule: RuleId,
    /// The property the message is attached to.
    pub property: PropertyId,
    /// Message severity.
    pub severity: Severity,
    /// Human-readable text.
    pub text: String,
}

impl RuleMessage {
    /// Whether this message blocks validity.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for RuleMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (rule '{}', property {})",
            self.severity, self.text, self.rule, self.property
        )
    }
}
