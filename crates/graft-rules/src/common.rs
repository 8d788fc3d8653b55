//! Reusable rules.
//!
//! - [`Required`]: the property must hold a non-blank value.
//! - [`MaxLength`]: text must not exceed a character count.
//! - [`Range`]: a numeric value must lie within inclusive bounds.
//! - [`Dependency`]: a change to one property re-runs the rules of others.
//! - [`FnRule`]: a closure-backed rule, synchronous or asynchronous.

use std::fmt;

use graft_core::{PropertyId, PropertyReader, PropertySet, RuleFault, RuleId};

use crate::outcome::RuleOutcome;
use crate::rule::{Rule, RuleMode};
use crate::view::NodeView;

/// The property must hold a non-blank value.
pub struct Required {
    id: RuleId,
    property: PropertyId,
    message: String,
}

impl Required {
    /// Require `property`, reporting `message` when it is blank.
    pub fn new(property: impl Into<PropertyId>, message: impl Into<String>) -> Self {
        let property = property.into();
        Self {
            id: RuleId::new(format!("required:{}", property.0)),
            property,
            message: message.into(),
        }
    }

    /// Override the generated rule id.
    pub fn with_id(mut self, id: impl Into<RuleId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Rule for Required {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn triggers(&self) -> PropertySet {
        [self.property].into_iter().collect()
    }

    fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault> {
        let blank = view.read(self.property).is_none_or(|v| v.is_blank());
        if blank {
            Ok(RuleOutcome::new().error(self.property, self.message.clone()))
        } else {
            Ok(RuleOutcome::new())
        }
    }
}

/// Text must not exceed `max` characters. Null passes.
pub struct MaxLength {
    id: RuleId,
    property: PropertyId,
    max: usize,
}

impl MaxLength {
    /// Limit `property` to `max` characters.
    pub fn new(property: impl Into<PropertyId>, max: usize) -> Self {
        let property = property.into();
        Self {
            id: RuleId::new(format!("max_length:{}", property.0)),
            property,
            max,
        }
    }
}

impl Rule for MaxLength {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn triggers(&self) -> PropertySet {
        [self.property].into_iter().collect()
    }

    fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault> {
        let len = view
            .read(self.property)
            .and_then(|v| v.as_str())
            .map_or(0, |s| s.chars().count());
        if len > self.max {
            Ok(RuleOutcome::new().error(
                self.property,
                format!("must be at most {} characters", self.max),
            ))
        } else {
            Ok(RuleOutcome::new())
        }
    }
}

/// A numeric value must lie within `[min, max]`. Null passes.
pub struct Range {
    id: RuleId,
    property: PropertyId,
    min: f64,
    max: f64,
}

impl Range {
    /// Constrain `property` to the inclusive range `[min, max]`.
    pub fn new(property: impl Into<PropertyId>, min: f64, max: f64) -> Self {
        let property = property.into();
        Self {
            id: RuleId::new(format!("range:{}", property.0)),
            property,
            min,
            max,
        }
    }
}

impl Rule for Range {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn triggers(&self) -> PropertySet {
        [self.property].into_iter().collect()
    }

    fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault> {
        match view.read(self.property).and_then(|v| v.as_f64()) {
            Some(v) if v < self.min || v > self.max || v.is_nan() => Ok(RuleOutcome::new()
                .error(
                    self.property,
                    format!("must be between {} and {}", self.min, self.max),
                )),
            _ => Ok(RuleOutcome::new()),
        }
    }
}

/// When `source` changes, the rules of each dependent property run too.
///
/// Used for cross-property checks registered on a different property,
/// e.g. re-validating an end date when the start date changes.
pub struct Dependency {
    id: RuleId,
    source: PropertyId,
    dependents: PropertySet,
}

impl Dependency {
    /// Re-run the rules of `dependents` whenever `source` changes.
    pub fn new(
        source: impl Into<PropertyId>,
        dependents: impl IntoIterator<Item = PropertyId>,
    ) -> Self {
        let source = source.into();
        Self {
            id: RuleId::new(format!("dependency:{}", source.0)),
            source,
            dependents: dependents.into_iter().collect(),
        }
    }
}

impl Rule for Dependency {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn triggers(&self) -> PropertySet {
        [self.source].into_iter().collect()
    }

    fn affects(&self) -> PropertySet {
        self.dependents.clone()
    }

    fn execute(&self, _view: &NodeView) -> Result<RuleOutcome, RuleFault> {
        Ok(self
            .dependents
            .iter()
            .fold(RuleOutcome::new(), |outcome, p| outcome.rerun(p)))
    }
}

type RuleFn = dyn Fn(&NodeView) -> Result<RuleOutcome, RuleFault> + Send + Sync;

/// A rule backed by a closure.
///
/// ```
/// use graft_core::{PropertyId, PropertyReader};
/// use graft_rules::{FnRule, Rule, RuleMode, RuleOutcome};
///
/// let rule = FnRule::new("positive_total", [PropertyId(2)], |view| {
///     let total = view.read(PropertyId(2)).and_then(|v| v.as_f64()).unwrap_or(0.0);
///     if total < 0.0 {
///         Ok(RuleOutcome::new().error(PropertyId(2), "total must be positive"))
///     } else {
///         Ok(RuleOutcome::new())
///     }
/// })
/// .asynchronous();
/// assert_eq!(rule.mode(), RuleMode::Async);
/// ```
pub struct FnRule {
    id: RuleId,
    triggers: PropertySet,
    affects: PropertySet,
    priority: i32,
    mode: RuleMode,
    reentrant: bool,
    body: Box<RuleFn>,
}

impl FnRule {
    /// A synchronous rule with priority 0.
    pub fn new<F>(
        id: impl Into<RuleId>,
        triggers: impl IntoIterator<Item = PropertyId>,
        body: F,
    ) -> Self
    where
        F: Fn(&NodeView) -> Result<RuleOutcome, RuleFault> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            triggers: triggers.into_iter().collect(),
            affects: PropertySet::empty(),
            priority: 0,
            mode: RuleMode::Sync,
            reentrant: false,
            body: Box::new(body),
        }
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Declare properties the closure messages or writes.
    pub fn affecting(mut self, properties: impl IntoIterator<Item = PropertyId>) -> Self {
        self.affects = properties.into_iter().collect();
        self
    }

    /// Run on the asynchronous executor.
    pub fn asynchronous(mut self) -> Self {
        self.mode = RuleMode::Async;
        self
    }

    /// Allow the rule's own writes to re-trigger it.
    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }
}

impl fmt::Debug for FnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule")
            .field("id", &self.id)
            .field("triggers", &self.triggers)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Rule for FnRule {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn triggers(&self) -> PropertySet {
        self.triggers.clone()
    }

    fn affects(&self) -> PropertySet {
        self.affects.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn mode(&self) -> RuleMode {
        self.mode
    }

    fn reentrant(&self) -> bool {
        self.reentrant
    }

    fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault> {
        (self.body)(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{NodeId, Value};

    fn view(values: Vec<Value>) -> NodeView {
        NodeView::new(NodeId::new(0, 0), values, PropertySet::empty())
    }

    #[test]
    fn required_flags_blank_values() {
        let rule = Required::new(PropertyId(0), "name is required");
        assert!(rule.execute(&view(vec![Value::Null])).unwrap().has_errors());
        assert!(rule.execute(&view(vec![Value::from("  ")])).unwrap().has_errors());
        assert!(!rule.execute(&view(vec![Value::from("Ada")])).unwrap().has_errors());
        assert_eq!(rule.id().as_str(), "required:0");
    }

    #[test]
    fn max_length_counts_chars() {
        let rule = MaxLength::new(PropertyId(0), 3);
        assert!(!rule.execute(&view(vec![Value::from("äöü")])).unwrap().has_errors());
        assert!(rule.execute(&view(vec![Value::from("abcd")])).unwrap().has_errors());
        assert!(!rule.execute(&view(vec![Value::Null])).unwrap().has_errors());
    }

    #[test]
    fn range_is_inclusive() {
        let rule = Range::new(PropertyId(0), 1.0, 10.0);
        assert!(!rule.execute(&view(vec![Value::Int(1)])).unwrap().has_errors());
        assert!(!rule.execute(&view(vec![Value::Float(10.0)])).unwrap().has_errors());
        assert!(rule.execute(&view(vec![Value::Int(0)])).unwrap().has_errors());
        assert!(rule.execute(&view(vec![Value::Float(f64::NAN)])).unwrap().has_errors());
    }

    #[test]
    fn dependency_requests_reruns() {
        let rule = Dependency::new(PropertyId(0), [PropertyId(1), PropertyId(2)]);
        let outcome = rule.execute(&view(vec![Value::Null; 3])).unwrap();
        let expected: PropertySet = [PropertyId(1), PropertyId(2)].into_iter().collect();
        assert_eq!(outcome.reruns(), &expected);
        assert!(outcome.messages().is_empty());
    }

    #[test]
    fn fn_rule_builder() {
        let rule = FnRule::new("x", [PropertyId(1)], |_| Ok(RuleOutcome::new()))
            .priority(3)
            .reentrant()
            .affecting([PropertyId(2)]);
        assert_eq!(Rule::priority(&rule), 3);
        assert!(Rule::reentrant(&rule));
        assert_eq!(rule.mode(), RuleMode::Sync);
        assert!(rule.affects().contains(PropertyId(2)));
    }
}
