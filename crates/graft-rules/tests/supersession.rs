//! Supersession across arbitrary interleavings of runs and completions.

use std::sync::Arc;

use graft_core::{PropertyId, RuleId};
use graft_rules::{execute_guarded, FnRule, NodeView, Rule, RuleOutcome, RulePipeline};
use proptest::prelude::*;

fn pipeline(rule_count: usize) -> (RulePipeline, Vec<RuleId>) {
    let mut pipeline = RulePipeline::new();
    let mut ids = Vec::new();
    for i in 0..rule_count {
        let id = RuleId::new(format!("rule-{i}"));
        let rule = FnRule::new(id.clone(), [PropertyId(i as u32)], |_| Ok(RuleOutcome::new()))
            .asynchronous();
        pipeline.register(Arc::new(rule)).unwrap();
        ids.push(id);
    }
    (pipeline, ids)
}

#[derive(Clone, Debug)]
enum Op {
    Begin(usize),
    Complete(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            (0usize..3).prop_map(Op::Begin),
            (0usize..16).prop_map(Op::Complete),
        ],
        1..40,
    )
}

proptest! {
    #[test]
    fn only_the_latest_run_of_each_rule_applies(ops in arb_ops()) {
        let (mut pipeline, ids) = pipeline(3);
        let mut issued = Vec::new();
        let mut current = vec![None; ids.len()];

        for op in ops {
            match op {
                Op::Begin(rule) => {
                    let busy = [PropertyId(rule as u32)].into_iter().collect();
                    let begin = pipeline.begin(&ids[rule], busy);
                    prop_assert_eq!(begin.superseded, current[rule]);
                    current[rule] = Some(begin.token);
                    issued.push(begin.token);
                }
                Op::Complete(i) => {
                    let Some(&token) = issued.get(i) else { continue };
                    if let Some(done) = pipeline.complete(token) {
                        let rule = ids.iter().position(|id| *id == done.rule).unwrap();
                        prop_assert_eq!(!done.stale, current[rule] == Some(token));
                        if !done.stale {
                            current[rule] = None;
                        }
                    }
                }
            }
        }

        // Every run still current is the last one begun for its rule.
        for token in pipeline.in_flight_tokens() {
            prop_assert_eq!(pipeline.is_current(token), current.contains(&Some(token)));
        }
    }
}

#[test]
fn guarded_execution_reports_faults_on_first_trigger() {
    let rule = FnRule::new("boom", [PropertyId(3), PropertyId(1)], |_| panic!("bad input"));
    let view = NodeView::new(graft_core::NodeId::new(0, 0), Vec::new(), Default::default());
    let (outcome, fault) = execute_guarded(&rule, &view).unwrap_err();
    assert_eq!(fault.message, "bad input");
    assert_eq!(outcome.messages().len(), 1);
    assert_eq!(outcome.messages()[0].property, PropertyId(1));
    assert_eq!(rule.id().as_str(), "boom");
}
