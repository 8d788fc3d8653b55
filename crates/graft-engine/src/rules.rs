//! Rule execution on the owning context.
//!
//! Synchronous rules run inline. Asynchronous rules are registered with
//! the node's pipeline (which supersedes any earlier run of the same
//! rule), mark their trigger cells busy under a fresh token, and are
//! handed to the executor. Completions come back through [`Graph::pump`]
//! and [`Graph::wait_for_pending`]: the busy release always happens,
//! the outcome is applied only if the run is still current.

use std::sync::Arc;
use std::time::Instant;

use graft_core::{
    ChangeReason, ExecutionToken, GraphError, NodeId, PropertyId, PropertySet, RuleId,
    RuleMessage,
};
use graft_rules::{execute_guarded, Completed, RuleMode, RuleOutcome, ScheduledRule};

use crate::executor::{Completion, Job};
use crate::graph::Graph;
use crate::notify::{ChangeEvent, ChangeKind};

impl Graph {
    /// Run the rules triggered by `properties`, or every rule of the
    /// node when `None`.
    ///
    /// Returns once synchronous rules have finished and asynchronous
    /// rules have started.
    pub fn run_rules(
        &mut self,
        id: NodeId,
        properties: Option<&PropertySet>,
    ) -> Result<(), GraphError> {
        let changed = match properties {
            Some(set) => set.clone(),
            None => self.node(id)?.pipeline.all_triggers(),
        };
        self.run_rules_for(id, &changed, None, 0)
    }

    pub(crate) fn run_rules_for(
        &mut self,
        id: NodeId,
        changed: &PropertySet,
        writer: Option<&RuleId>,
        depth: usize,
    ) -> Result<(), GraphError> {
        if changed.is_empty() {
            return Ok(());
        }
        if depth >= self.config.max_rule_depth {
            self.metrics.depth_overflows += 1;
            tracing::warn!(
                node = %id,
                depth,
                writer = ?writer.map(RuleId::as_str),
                "rule chain reached max_rule_depth, stopping"
            );
            return Ok(());
        }
        let scheduled = self.node(id)?.pipeline.schedule(changed, writer);
        tracing::trace!(node = %id, rules = scheduled.len(), depth, "rules scheduled");
        for rule in &scheduled {
            match rule.mode {
                RuleMode::Sync => self.run_sync(id, rule, changed, depth)?,
                RuleMode::Async => self.start_async(id, rule, changed)?,
            }
        }
        Ok(())
    }

    fn run_sync(
        &mut self,
        id: NodeId,
        rule: &ScheduledRule,
        changed: &PropertySet,
        depth: usize,
    ) -> Result<(), GraphError> {
        let view = self.view(id, changed.clone())?;
        self.metrics.rules_executed += 1;
        let outcome = match execute_guarded(rule.rule.as_ref(), &view) {
            Ok(outcome) => outcome,
            Err((outcome, _)) => {
                self.metrics.rule_faults += 1;
                outcome
            }
        };
        self.apply_outcome(id, &rule.id, outcome, depth)
    }

    fn start_async(
        &mut self,
        id: NodeId,
        rule: &ScheduledRule,
        changed: &PropertySet,
    ) -> Result<(), GraphError> {
        let view = self.view(id, changed.clone())?;
        let node = self.node_mut(id)?;
        let begin = node.pipeline.begin(&rule.id, rule.triggers.clone());
        let flipped: Vec<PropertyId> = rule
            .triggers
            .iter()
            .filter(|p| {
                node.cell_mut(*p)
                    .is_some_and(|cell| cell.set_busy(begin.token, true))
            })
            .collect();
        for property in flipped {
            self.emit(ChangeEvent::new(id, ChangeKind::Busy(property)));
        }
        self.metrics.async_started += 1;
        tracing::trace!(node = %id, rule = %rule.id, token = %begin.token, "async rule started");

        let job = Job {
            node: id,
            token: begin.token,
            rule: Arc::clone(&rule.rule),
            view,
        };
        if let Err(e) = self.executor.submit(job) {
            self.release(id, begin.token);
            self.cascade(id);
            return Err(e);
        }
        self.cascade(id);
        Ok(())
    }

    /// Retire `token` from the node's pipeline and release its busy
    /// cells. `None` if the node is gone or the token unknown.
    fn release(&mut self, id: NodeId, token: ExecutionToken) -> Option<Completed> {
        let node = self.nodes.get_mut(id)?;
        let completed = node.pipeline.complete(token)?;
        let flipped: Vec<PropertyId> = completed
            .busy
            .iter()
            .filter(|p| node.cell_mut(*p).is_some_and(|cell| cell.set_busy(token, false)))
            .collect();
        for property in flipped {
            self.emit(ChangeEvent::new(id, ChangeKind::Busy(property)));
        }
        Some(completed)
    }

    /// Apply a rule outcome: replace the rule's messages on every cell,
    /// write derived values, then run the rules those writes (and any
    /// requested reruns) trigger.
    pub(crate) fn apply_outcome(
        &mut self,
        id: NodeId,
        rule: &RuleId,
        outcome: RuleOutcome,
        depth: usize,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let mut grouped: Vec<Vec<RuleMessage>> = vec![Vec::new(); node.cells.len()];
        for m in outcome.messages() {
            match grouped.get_mut(m.property.0 as usize) {
                Some(list) => list.push(RuleMessage {
                    rule: rule.clone(),
                    property: m.property,
                    severity: m.severity,
                    text: m.text.clone(),
                }),
                None => tracing::warn!(
                    node = %id,
                    rule = %rule,
                    property = %m.property,
                    "message for unknown property dropped"
                ),
            }
        }
        let mut touched = Vec::new();
        for (i, (cell, list)) in node.cells.iter_mut().zip(grouped).enumerate() {
            if cell.set_messages(rule, list) {
                touched.push(PropertyId(i as u32));
            }
        }
        for property in touched {
            self.emit(ChangeEvent::new(id, ChangeKind::Messages(property)));
        }
        self.metrics.outcomes_applied += 1;

        let reason = ChangeReason::Rule(rule.clone());
        let mut changed = outcome.reruns().clone();
        for (property, value) in outcome.writes() {
            match self.write_cell(id, *property, value.clone(), &reason) {
                Ok(true) => changed.insert(*property),
                Ok(false) => {}
                Err(e) => tracing::warn!(node = %id, rule = %rule, error = %e, "rule write rejected"),
            }
        }
        self.cascade(id);
        self.run_rules_for(id, &changed, Some(rule), depth + 1)
    }

    /// Apply every completion already delivered by the executor.
    /// Returns the number processed. Never blocks.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(done) = self.executor.try_recv() {
            self.complete(done);
            processed += 1;
        }
        processed
    }

    /// Block until no rule run is in flight on `id` or any live
    /// descendant, applying completions as they arrive.
    ///
    /// # Errors
    ///
    /// [`GraphError::PendingTimeout`] when
    /// [`pending_timeout`](crate::GraphConfig::pending_timeout) expires
    /// first; [`GraphError::ExecutorUnavailable`] if the workers are gone.
    pub fn wait_for_pending(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.node(id)?;
        let start = Instant::now();
        self.pump();
        while self.in_flight_below(id) {
            let remaining = match self.config.pending_timeout {
                Some(limit) => {
                    let waited = start.elapsed();
                    if waited >= limit {
                        tracing::warn!(node = %id, ?waited, "pending rules did not settle");
                        return Err(GraphError::PendingTimeout { waited });
                    }
                    Some(limit - waited)
                }
                None => None,
            };
            if let Some(done) = self.executor.recv(remaining)? {
                self.complete(done);
            }
        }
        Ok(())
    }

    /// In-flight rule runs on `id` itself, stale runs included.
    pub fn pending_runs(&self, id: NodeId) -> Result<usize, GraphError> {
        Ok(self.node(id)?.pipeline.in_flight_len())
    }

    fn in_flight_below(&self, id: NodeId) -> bool {
        self.subtree(id)
            .into_iter()
            .any(|n| self.nodes.get(n).is_some_and(|node| node.pipeline.is_busy()))
    }

    fn complete(&mut self, done: Completion) {
        let Some(completed) = self.release(done.node, done.token) else {
            tracing::debug!(node = %done.node, token = %done.token, "completion for unknown run ignored");
            return;
        };
        let outcome = match done.result {
            Ok(outcome) => outcome,
            Err((outcome, _)) => {
                self.metrics.rule_faults += 1;
                outcome
            }
        };
        if completed.stale {
            self.metrics.stale_discarded += 1;
            tracing::debug!(
                node = %done.node,
                rule = %completed.rule,
                token = %done.token,
                "stale outcome discarded"
            );
            self.cascade(done.node);
            return;
        }
        if let Err(e) = self.apply_outcome(done.node, &completed.rule, outcome, 0) {
            tracing::warn!(node = %done.node, rule = %completed.rule, error = %e, "applying outcome failed");
        }
    }
}
