//! Fault containment for rule bodies.
//!
//! A rule that returns [`RuleFault`] or panics must not take down the
//! pipeline or its sibling runs. [`execute_guarded`] converts both into
//! a single error message on the rule's primary property.

use std::panic::{self, AssertUnwindSafe};

use graft_core::RuleFault;

use crate::outcome::RuleOutcome;
use crate::rule::Rule;
use crate::view::NodeView;

/// Run `rule` against `view`, catching returned faults and panics.
///
/// Returns the rule's outcome on success, or an outcome carrying exactly
/// one error message on the rule's first trigger property together with
/// the fault that caused it.
pub fn execute_guarded(
    rule: &dyn Rule,
    view: &NodeView,
) -> Result<RuleOutcome, (RuleOutcome, RuleFault)> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| rule.execute(view)))
        .unwrap_or_else(|payload| Err(RuleFault::from_panic(payload.as_ref())));
    match result {
        Ok(outcome) => Ok(outcome),
        Err(fault) => {
            tracing::warn!(rule = %rule.id(), node = %view.node(), %fault, "rule faulted");
            Err((fault_outcome(rule, &fault), fault))
        }
    }
}

fn fault_outcome(rule: &dyn Rule, fault: &RuleFault) -> RuleOutcome {
    match rule.triggers().first() {
        Some(primary) => RuleOutcome::new().error(primary, fault.message.clone()),
        None => RuleOutcome::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{NodeId, PropertyId, PropertySet, RuleId, Severity, Value};

    struct Faulty {
        id: RuleId,
        panic: bool,
    }

    impl Rule for Faulty {
        fn id(&self) -> &RuleId {
            &self.id
        }
        fn triggers(&self) -> PropertySet {
            [PropertyId(2), PropertyId(1)].into_iter().collect()
        }
        fn execute(&self, _view: &NodeView) -> Result<RuleOutcome, RuleFault> {
            if self.panic {
                panic!("lookup service exploded");
            }
            Err(RuleFault::new("lookup service unavailable"))
        }
    }

    fn view() -> NodeView {
        NodeView::new(NodeId::new(0, 0), vec![Value::Null; 3], PropertySet::empty())
    }

    #[test]
    fn returned_fault_becomes_single_error_on_primary() {
        let rule = Faulty {
            id: RuleId::from("faulty"),
            panic: false,
        };
        let (outcome, fault) = execute_guarded(&rule, &view()).unwrap_err();
        assert_eq!(fault.message, "lookup service unavailable");
        assert_eq!(outcome.messages().len(), 1);
        assert_eq!(outcome.messages()[0].property, PropertyId(1));
        assert_eq!(outcome.messages()[0].severity, Severity::Error);
    }

    #[test]
    fn panic_is_caught() {
        let rule = Faulty {
            id: RuleId::from("panicky"),
            panic: true,
        };
        let (outcome, fault) = execute_guarded(&rule, &view()).unwrap_err();
        assert_eq!(fault.message, "lookup service exploded");
        assert!(outcome.has_errors());
    }
}
