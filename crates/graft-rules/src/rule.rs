//! The [`Rule`] trait and [`RuleMode`] enum.
//!
//! Rules are stateless business or validation checks registered against
//! a set of trigger properties. They declare their triggers once at
//! registration, enabling the pipeline to select the affected rules for
//! each change without consulting the rule bodies.

use graft_core::{PropertySet, RuleFault, RuleId};

use crate::outcome::RuleOutcome;
use crate::view::NodeView;

/// How the pipeline runs a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleMode {
    /// Runs to completion on the calling context before `trigger` returns.
    Sync,

    /// Runs on a worker thread. Its trigger properties are marked busy
    /// until the run completes; the outcome is applied back on the
    /// owning context.
    Async,
}

/// A business or validation rule.
///
/// # Contract
///
/// - `execute()` reads only the supplied [`NodeView`] and reports every
///   effect through the returned [`RuleOutcome`]; it never mutates the
///   graph directly.
/// - `id()`, `triggers()`, `priority()` and `mode()` are read once at
///   registration.
/// - Rules are shared across threads (`Send + Sync`), since asynchronous
///   runs execute on executor workers.
///
/// # Examples
///
/// A minimal rule rejecting negative quantities:
///
/// ```
/// use graft_core::{Property, PropertyId, PropertyReader, PropertySet, RuleFault, RuleId};
/// use graft_rules::{NodeView, Rule, RuleOutcome};
///
/// const QTY: Property<Option<i64>> = Property::new(PropertyId(0));
///
/// struct NonNegative {
///     id: RuleId,
/// }
///
/// impl Rule for NonNegative {
///     fn id(&self) -> &RuleId { &self.id }
///
///     fn triggers(&self) -> PropertySet { [QTY.id()].into_iter().collect() }
///
///     fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault> {
///         match view.get(QTY).flatten() {
///             Some(q) if q < 0 => Ok(RuleOutcome::new().error(QTY, "quantity must not be negative")),
///             _ => Ok(RuleOutcome::new()),
///         }
///     }
/// }
///
/// let rule = NonNegative { id: RuleId::from("non_negative") };
/// assert_eq!(rule.id().as_str(), "non_negative");
/// ```
pub trait Rule: Send + Sync + 'static {
    /// Stable identifier. Messages are grouped under it.
    fn id(&self) -> &RuleId;

    /// Properties whose change schedules this rule.
    ///
    /// Must be non-empty. The lowest id is the rule's primary property,
    /// which receives the error message if the rule faults.
    fn triggers(&self) -> PropertySet;

    /// Properties the rule may message or write besides its triggers.
    ///
    /// Checked against the node type at registration. Default: empty.
    fn affects(&self) -> PropertySet {
        PropertySet::empty()
    }

    /// Execution priority; lower values run first. Ties run in
    /// registration order. Default: 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Synchronous or asynchronous execution. Default: [`RuleMode::Sync`].
    fn mode(&self) -> RuleMode {
        RuleMode::Sync
    }

    /// Whether the rule's own writes may re-trigger it. Default: `false`.
    fn reentrant(&self) -> bool {
        false
    }

    /// Evaluate the rule against a snapshot of the node.
    fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault>;
}
