//! Rule registration, scheduling order, and in-flight execution tracking.
//!
//! Every node owns one [`RulePipeline`]. The pipeline does not run rules
//! itself: the graph asks it which rules a change schedules (in priority
//! order), registers each asynchronous run with [`RulePipeline::begin`],
//! and reports completion with [`RulePipeline::complete`]. Supersession
//! lives here: beginning a new run of a rule marks its previous
//! in-flight run stale, and a stale completion tells the caller to
//! discard the outcome while still releasing the run's busy state.

use std::sync::Arc;

use indexmap::IndexMap;

use graft_core::{ExecutionToken, PropertyId, PropertySet, RuleError, RuleId};

use crate::rule::{Rule, RuleMode};

// ── Registered rules ───────────────────────────────────────────────

/// A rule plus the metadata the pipeline read from it at registration.
pub struct RegisteredRule {
    rule: Arc<dyn Rule>,
    id: RuleId,
    triggers: PropertySet,
    priority: i32,
    mode: RuleMode,
    reentrant: bool,
}

impl RegisteredRule {
    /// The rule.
    pub fn rule(&self) -> &Arc<dyn Rule> {
        &self.rule
    }

    /// The rule's id.
    pub fn id(&self) -> &RuleId {
        &self.id
    }

    /// Trigger properties.
    pub fn triggers(&self) -> &PropertySet {
        &self.triggers
    }

    fn schedule(&self) -> ScheduledRule {
        ScheduledRule {
            rule: Arc::clone(&self.rule),
            id: self.id.clone(),
            triggers: self.triggers.clone(),
            mode: self.mode,
        }
    }
}

/// A rule selected to run for one change, detached from the pipeline
/// borrow so the caller can mutate the node while running it.
#[derive(Clone)]
pub struct ScheduledRule {
    /// The rule.
    pub rule: Arc<dyn Rule>,
    /// The rule's id.
    pub id: RuleId,
    /// Its trigger properties (also the properties marked busy while an
    /// asynchronous run is in flight).
    pub triggers: PropertySet,
    /// Execution mode.
    pub mode: RuleMode,
}

// ── In-flight tracking ─────────────────────────────────────────────

#[derive(Debug)]
struct InFlight {
    rule: RuleId,
    busy: PropertySet,
    stale: bool,
}

/// Result of [`RulePipeline::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Begin {
    /// Token identifying the new run.
    pub token: ExecutionToken,
    /// The previous run of the same rule that this run made stale.
    pub superseded: Option<ExecutionToken>,
}

/// Result of [`RulePipeline::complete`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completed {
    /// The rule that ran.
    pub rule: RuleId,
    /// Properties to release from busy state for this token.
    pub busy: PropertySet,
    /// Whether a newer run superseded this one. A stale outcome must be
    /// discarded.
    pub stale: bool,
}

// ── Pipeline ───────────────────────────────────────────────────────

/// Per-node rule registry and in-flight execution tracker.
///
/// Invariant: for each rule id at most one run is *current*. Older runs
/// may still be in flight, but only as stale runs whose outcomes will be
/// discarded.
#[derive(Default)]
pub struct RulePipeline {
    rules: Vec<RegisteredRule>,
    in_flight: IndexMap<ExecutionToken, InFlight>,
    current: IndexMap<RuleId, ExecutionToken>,
}

impl RulePipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule.
    ///
    /// Keeps the rule list sorted by priority, then registration order.
    ///
    /// # Errors
    ///
    /// [`RuleError::DuplicateRuleId`] if a rule with the same id is
    /// already registered; [`RuleError::NoTriggers`] if the rule declares
    /// no trigger properties.
    pub fn register(&mut self, rule: Arc<dyn Rule>) -> Result<(), RuleError> {
        let id = rule.id().clone();
        if self.rules.iter().any(|r| r.id == id) {
            return Err(RuleError::DuplicateRuleId(id));
        }
        let triggers = rule.triggers();
        if triggers.is_empty() {
            return Err(RuleError::NoTriggers(id));
        }
        let priority = rule.priority();
        let registered = RegisteredRule {
            mode: rule.mode(),
            reentrant: rule.reentrant(),
            rule,
            id,
            triggers,
            priority,
        };
        let pos = self
            .rules
            .iter()
            .position(|r| r.priority > priority)
            .unwrap_or(self.rules.len());
        self.rules.insert(pos, registered);
        Ok(())
    }

    /// Registered rules in execution order.
    pub fn rules(&self) -> &[RegisteredRule] {
        &self.rules
    }

    /// Whether a rule with `id` is registered.
    pub fn contains(&self, id: &RuleId) -> bool {
        self.rules.iter().any(|r| &r.id == id)
    }

    /// Union of every registered rule's trigger properties.
    pub fn all_triggers(&self) -> PropertySet {
        self.rules
            .iter()
            .fold(PropertySet::empty(), |acc, r| acc.union(&r.triggers))
    }

    /// Rules whose triggers intersect `changed`, in execution order.
    ///
    /// `writer` is the rule whose outcome caused the change, if any; it is
    /// excluded unless it declared itself reentrant.
    pub fn schedule(&self, changed: &PropertySet, writer: Option<&RuleId>) -> Vec<ScheduledRule> {
        self.rules
            .iter()
            .filter(|r| r.triggers.intersects(changed))
            .filter(|r| r.reentrant || writer != Some(&r.id))
            .map(RegisteredRule::schedule)
            .collect()
    }

    /// Record the start of an asynchronous run of `rule`.
    ///
    /// The caller marks every property in `busy` busy under the returned
    /// token. Any earlier run of the same rule becomes stale.
    pub fn begin(&mut self, rule: &RuleId, busy: PropertySet) -> Begin {
        let token = ExecutionToken::next();
        let superseded = self.current.insert(rule.clone(), token);
        if let Some(prev) = superseded {
            if let Some(run) = self.in_flight.get_mut(&prev) {
                run.stale = true;
            }
            tracing::debug!(rule = %rule, stale = %prev, current = %token, "rule run superseded");
        }
        self.in_flight.insert(
            token,
            InFlight {
                rule: rule.clone(),
                busy,
                stale: false,
            },
        );
        Begin { token, superseded }
    }

    /// Record the completion of the run identified by `token`.
    ///
    /// Returns `None` for an unknown token (already completed, or issued
    /// by another pipeline).
    pub fn complete(&mut self, token: ExecutionToken) -> Option<Completed> {
        let run = self.in_flight.shift_remove(&token)?;
        if self.current.get(&run.rule) == Some(&token) {
            self.current.shift_remove(&run.rule);
        }
        Some(Completed {
            rule: run.rule,
            busy: run.busy,
            stale: run.stale,
        })
    }

    /// Whether any run is in flight, stale runs included.
    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Number of in-flight runs, stale runs included.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether `token` is in flight and not stale.
    pub fn is_current(&self, token: ExecutionToken) -> bool {
        self.in_flight.get(&token).is_some_and(|run| !run.stale)
    }

    /// Tokens of all in-flight runs, oldest first.
    pub fn in_flight_tokens(&self) -> impl Iterator<Item = ExecutionToken> + '_ {
        self.in_flight.keys().copied()
    }
}

// ── Validation ─────────────────────────────────────────────────────

/// Validate a rule set against the properties a node type defines.
///
/// Checks performed (once, when the node type is built):
///
/// 1. No two rules share an id.
/// 2. Every rule declares at least one trigger property.
/// 3. Every trigger and affected property exists in `defined`.
pub fn validate_rules(rules: &[Arc<dyn Rule>], defined: &PropertySet) -> Result<(), RuleError> {
    let mut seen: IndexMap<&RuleId, ()> = IndexMap::new();
    for rule in rules {
        let id = rule.id();
        if seen.insert(id, ()).is_some() {
            return Err(RuleError::DuplicateRuleId(id.clone()));
        }
        let triggers = rule.triggers();
        if triggers.is_empty() {
            return Err(RuleError::NoTriggers(id.clone()));
        }
        let referenced = triggers.union(&rule.affects());
        if let Some(property) = referenced.difference(defined).first() {
            return Err(undefined(id, property));
        }
    }
    Ok(())
}

fn undefined(rule: &RuleId, property: PropertyId) -> RuleError {
    RuleError::UndefinedProperty {
        rule: rule.clone(),
        property,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::RuleOutcome;
    use crate::view::NodeView;
    use graft_core::RuleFault;

    struct TestRule {
        id: RuleId,
        triggers: Vec<u32>,
        priority: i32,
        mode: RuleMode,
        reentrant: bool,
    }

    impl TestRule {
        fn new(id: &str, triggers: &[u32]) -> Self {
            Self {
                id: RuleId::from(id),
                triggers: triggers.to_vec(),
                priority: 0,
                mode: RuleMode::Sync,
                reentrant: false,
            }
        }

        fn priority(mut self, p: i32) -> Self {
            self.priority = p;
            self
        }
    }

    impl Rule for TestRule {
        fn id(&self) -> &RuleId {
            &self.id
        }
        fn triggers(&self) -> PropertySet {
            self.triggers.iter().copied().map(PropertyId).collect()
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
        fn execute(&self, _view: &NodeView) -> Result<RuleOutcome, RuleFault> {
            Ok(RuleOutcome::new())
        }
    }

    fn ids(scheduled: &[ScheduledRule]) -> Vec<&str> {
        scheduled.iter().map(|s| s.id.as_str()).collect()
    }

    fn set(ids: &[u32]) -> PropertySet {
        ids.iter().copied().map(PropertyId).collect()
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut pipeline = RulePipeline::new();
        pipeline.register(Arc::new(TestRule::new("a", &[0]))).unwrap();
        let err = pipeline
            .register(Arc::new(TestRule::new("a", &[1])))
            .unwrap_err();
        assert_eq!(err, RuleError::DuplicateRuleId(RuleId::from("a")));
        assert_eq!(pipeline.rules().len(), 1);
    }

    #[test]
    fn empty_triggers_rejected() {
        let mut pipeline = RulePipeline::new();
        let err = pipeline
            .register(Arc::new(TestRule::new("none", &[])))
            .unwrap_err();
        assert_eq!(err, RuleError::NoTriggers(RuleId::from("none")));
    }

    #[test]
    fn schedule_orders_by_priority_then_registration() {
        let mut pipeline = RulePipeline::new();
        pipeline.register(Arc::new(TestRule::new("late", &[0]).priority(5))).unwrap();
        pipeline.register(Arc::new(TestRule::new("first", &[0]))).unwrap();
        pipeline.register(Arc::new(TestRule::new("second", &[0, 1]))).unwrap();
        pipeline.register(Arc::new(TestRule::new("early", &[1]).priority(-1))).unwrap();
        pipeline.register(Arc::new(TestRule::new("other", &[2]))).unwrap();

        let scheduled = pipeline.schedule(&set(&[0, 1]), None);
        assert_eq!(ids(&scheduled), vec!["early", "first", "second", "late"]);
    }

    #[test]
    fn writer_excluded_unless_reentrant() {
        let mut pipeline = RulePipeline::new();
        pipeline.register(Arc::new(TestRule::new("calc", &[0]))).unwrap();
        let mut reentrant = TestRule::new("loop", &[0]);
        reentrant.reentrant = true;
        pipeline.register(Arc::new(reentrant)).unwrap();

        let calc = RuleId::from("calc");
        assert_eq!(ids(&pipeline.schedule(&set(&[0]), Some(&calc))), vec!["loop"]);
        let looping = RuleId::from("loop");
        assert_eq!(
            ids(&pipeline.schedule(&set(&[0]), Some(&looping))),
            vec!["calc", "loop"]
        );
    }

    #[test]
    fn second_begin_supersedes_first() {
        let mut pipeline = RulePipeline::new();
        let rule = RuleId::from("lookup");
        let first = pipeline.begin(&rule, set(&[0]));
        let second = pipeline.begin(&rule, set(&[0]));
        assert_eq!(first.superseded, None);
        assert_eq!(second.superseded, Some(first.token));
        assert_eq!(pipeline.in_flight_len(), 2);
        assert!(!pipeline.is_current(first.token));
        assert!(pipeline.is_current(second.token));

        let done_second = pipeline.complete(second.token).unwrap();
        assert!(!done_second.stale);
        assert!(pipeline.is_busy());
        let done_first = pipeline.complete(first.token).unwrap();
        assert!(done_first.stale);
        assert_eq!(done_first.busy, set(&[0]));
        assert!(!pipeline.is_busy());
        assert!(pipeline.complete(first.token).is_none());
    }

    #[test]
    fn completion_order_does_not_matter() {
        let mut pipeline = RulePipeline::new();
        let rule = RuleId::from("lookup");
        let first = pipeline.begin(&rule, set(&[0]));
        let second = pipeline.begin(&rule, set(&[0]));
        assert!(pipeline.complete(first.token).unwrap().stale);
        assert!(!pipeline.complete(second.token).unwrap().stale);
    }

    #[test]
    fn distinct_rules_do_not_supersede() {
        let mut pipeline = RulePipeline::new();
        let a = pipeline.begin(&RuleId::from("a"), set(&[0]));
        let b = pipeline.begin(&RuleId::from("b"), set(&[0]));
        assert_eq!(b.superseded, None);
        assert!(pipeline.is_current(a.token));
        assert!(pipeline.is_current(b.token));
    }

    #[test]
    fn validate_reports_undefined_property() {
        let rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(TestRule::new("ok", &[0, 1])),
            Arc::new(TestRule::new("bad", &[1, 7])),
        ];
        let err = validate_rules(&rules, &PropertySet::full(3)).unwrap_err();
        assert_eq!(
            err,
            RuleError::UndefinedProperty {
                rule: RuleId::from("bad"),
                property: PropertyId(7),
            }
        );
    }

    #[test]
    fn validate_reports_duplicates() {
        let rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(TestRule::new("x", &[0])),
            Arc::new(TestRule::new("x", &[1])),
        ];
        assert_eq!(
            validate_rules(&rules, &PropertySet::full(2)),
            Err(RuleError::DuplicateRuleId(RuleId::from("x")))
        );
    }
}
