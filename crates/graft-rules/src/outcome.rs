//! The [`RuleOutcome`] a rule run produces.

use graft_core::{Property, PropertyId, PropertySet, PropertyValue, Severity, Value};

/// One message reported by a rule run.
#[derive(Clone, Debug, PartialEq)]
pub struct OutcomeMessage {
    /// Property the message attaches to.
    pub property: PropertyId,
    /// Severity.
    pub severity: Severity,
    /// Text.
    pub text: String,
}

/// Everything a rule run wants applied to its node.
///
/// Applying an outcome replaces the rule's previous messages on every
/// property (an empty outcome clears them), writes derived values, and
/// schedules the rules of any properties listed in `rerun`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleOutcome {
    messages: Vec<OutcomeMessage>,
    writes: Vec<(PropertyId, Value)>,
    rerun: PropertySet,
}

impl RuleOutcome {
    /// An outcome with no messages and no writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message of any severity.
    pub fn message(
        mut self,
        property: impl Into<PropertyId>,
        severity: Severity,
        text: impl Into<String>,
    ) -> Self {
        self.messages.push(OutcomeMessage {
            property: property.into(),
            severity,
            text: text.into(),
        });
        self
    }

    /// Add an error message.
    pub fn error(self, property: impl Into<PropertyId>, text: impl Into<String>) -> Self {
        self.message(property, Severity::Error, text)
    }

    /// Add a warning message.
    pub fn warning(self, property: impl Into<PropertyId>, text: impl Into<String>) -> Self {
        self.message(property, Severity::Warning, text)
    }

    /// Add an information message.
    pub fn information(self, property: impl Into<PropertyId>, text: impl Into<String>) -> Self {
        self.message(property, Severity::Information, text)
    }

    /// Write a derived value through a typed key.
    pub fn set<T: PropertyValue>(mut self, property: Property<T>, value: T) -> Self {
        self.writes.push((property.id(), value.into_value()));
        self
    }

    /// Write a raw derived value.
    pub fn write(mut self, property: PropertyId, value: Value) -> Self {
        self.writes.push((property, value));
        self
    }

    /// Also run the rules triggered by `property` once this outcome is applied.
    pub fn rerun(mut self, property: impl Into<PropertyId>) -> Self {
        self.rerun.insert(property.into());
        self
    }

    /// Messages in the order they were added.
    pub fn messages(&self) -> &[OutcomeMessage] {
        &self.messages
    }

    /// Writes in the order they were added.
    pub fn writes(&self) -> &[(PropertyId, Value)] {
        &self.writes
    }

    /// Properties whose rules should run after this outcome is applied.
    pub fn reruns(&self) -> &PropertySet {
        &self.rerun
    }

    /// Every property this outcome messages or writes.
    pub fn touched(&self) -> PropertySet {
        self.messages
            .iter()
            .map(|m| m.property)
            .chain(self.writes.iter().map(|(p, _)| *p))
            .collect()
    }

    /// Whether the outcome carries an error-severity message.
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: Property<String> = Property::new(PropertyId(0));
    const TOTAL: Property<f64> = Property::new(PropertyId(2));

    #[test]
    fn builder_accumulates_in_order() {
        let outcome = RuleOutcome::new()
            .error(NAME, "required")
            .warning(PropertyId(1), "short")
            .set(TOTAL, 12.5)
            .rerun(PropertyId(3));
        assert_eq!(outcome.messages().len(), 2);
        assert_eq!(outcome.messages()[0].severity, Severity::Error);
        assert_eq!(outcome.writes(), &[(PropertyId(2), Value::Float(12.5))]);
        assert!(outcome.reruns().contains(PropertyId(3)));
        assert!(outcome.has_errors());
        let touched: Vec<u32> = outcome.touched().iter().map(|p| p.0).collect();
        assert_eq!(touched, vec![0, 1, 2]);
    }

    #[test]
    fn empty_outcome_has_no_errors() {
        let outcome = RuleOutcome::new().information(NAME, "looks good");
        assert!(!outcome.has_errors());
    }
}
