//! Worker pool for asynchronous rule runs.
//!
//! The owning context submits a [`Job`] per asynchronous run: the rule,
//! an owned [`NodeView`] snapshot, and the execution token the pipeline
//! issued. Workers run the rule under [`execute_guarded`] and send a
//! [`Completion`] back. Completions are only ever applied on the owning
//! context (by [`Graph::pump`](crate::Graph::pump) and
//! [`Graph::wait_for_pending`](crate::Graph::wait_for_pending)), so
//! node state is never touched from a worker thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use graft_core::{ExecutionToken, GraphError, NodeId, RuleFault};
use graft_rules::{execute_guarded, NodeView, Rule, RuleOutcome};

use crate::config::ConfigError;

/// One asynchronous rule run.
pub(crate) struct Job {
    pub(crate) node: NodeId,
    pub(crate) token: ExecutionToken,
    pub(crate) rule: Arc<dyn Rule>,
    pub(crate) view: NodeView,
}

/// Result of a [`Job`], delivered back to the owning context.
pub(crate) struct Completion {
    pub(crate) node: NodeId,
    pub(crate) token: ExecutionToken,
    pub(crate) result: Result<RuleOutcome, (RuleOutcome, RuleFault)>,
}

pub(crate) struct RuleExecutor {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
}

impl RuleExecutor {
    /// Spawn `worker_count` worker threads.
    pub(crate) fn spawn(worker_count: usize) -> Result<Self, ConfigError> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();
        let mut executor = Self {
            job_tx: Some(job_tx),
            done_rx,
            workers: Vec::with_capacity(worker_count),
        };
        for i in 0..worker_count {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("graft-rule-{i}"))
                .spawn(move || worker_loop(job_rx, done_tx))
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    reason: format!("rule worker {i}: {e}"),
                })?;
            executor.workers.push(handle);
        }
        tracing::debug!(workers = worker_count, "rule executor started");
        Ok(executor)
    }

    pub(crate) fn submit(&self, job: Job) -> Result<(), GraphError> {
        let tx = self.job_tx.as_ref().ok_or(GraphError::ExecutorUnavailable)?;
        tx.send(job).map_err(|_| GraphError::ExecutorUnavailable)
    }

    pub(crate) fn try_recv(&self) -> Option<Completion> {
        self.done_rx.try_recv().ok()
    }

    /// Block until a completion arrives, or until `timeout` if given.
    /// `Ok(None)` means the timeout elapsed.
    pub(crate) fn recv(&self, timeout: Option<Duration>) -> Result<Option<Completion>, GraphError> {
        match timeout {
            None => self
                .done_rx
                .recv()
                .map(Some)
                .map_err(|_| GraphError::ExecutorUnavailable),
            Some(t) => match self.done_rx.recv_timeout(t) {
                Ok(done) => Ok(Some(done)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(GraphError::ExecutorUnavailable),
            },
        }
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the job channel and join every worker. Returns the number
    /// of workers joined cleanly.
    pub(crate) fn shutdown(&mut self) -> usize {
        self.job_tx.take();
        let mut joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        joined
    }
}

impl Drop for RuleExecutor {
    fn drop(&mut self) {
        let joined = self.shutdown();
        tracing::trace!(joined, "rule executor stopped");
    }
}

fn worker_loop(job_rx: Receiver<Job>, done_tx: Sender<Completion>) {
    while let Ok(job) = job_rx.recv() {
        let result = execute_guarded(job.rule.as_ref(), &job.view);
        let done = Completion {
            node: job.node,
            token: job.token,
            result,
        };
        if done_tx.send(done).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{PropertyId, PropertySet, Value};
    use graft_rules::FnRule;

    fn job(rule: Arc<dyn Rule>) -> Job {
        Job {
            node: NodeId::new(0, 0),
            token: ExecutionToken::next(),
            rule,
            view: NodeView::new(NodeId::new(0, 0), vec![Value::Int(5)], PropertySet::empty()),
        }
    }

    #[test]
    fn completions_return_outcomes() {
        let executor = RuleExecutor::spawn(2).unwrap();
        let rule: Arc<dyn Rule> = Arc::new(FnRule::new("double", [PropertyId(0)], |_| {
            Ok(RuleOutcome::new().write(PropertyId(0), Value::Int(10)))
        }));
        let submitted = job(rule);
        let token = submitted.token;
        executor.submit(submitted).unwrap();
        let done = executor.recv(Some(Duration::from_secs(5))).unwrap().unwrap();
        assert_eq!(done.token, token);
        let outcome = done.result.unwrap();
        assert_eq!(outcome.writes(), &[(PropertyId(0), Value::Int(10))]);
    }

    #[test]
    fn panics_come_back_as_faults() {
        let executor = RuleExecutor::spawn(1).unwrap();
        let rule: Arc<dyn Rule> = Arc::new(FnRule::new("boom", [PropertyId(0)], |_| {
            panic!("remote lookup failed")
        }));
        executor.submit(job(rule)).unwrap();
        let done = executor.recv(None).unwrap().unwrap();
        let (outcome, fault) = done.result.unwrap_err();
        assert!(outcome.has_errors());
        assert_eq!(fault.message, "remote lookup failed");
    }

    #[test]
    fn shutdown_joins_workers() {
        let mut executor = RuleExecutor::spawn(3).unwrap();
        assert_eq!(executor.worker_count(), 3);
        assert_eq!(executor.shutdown(), 3);
        assert!(executor.try_recv().is_none());
        let rule: Arc<dyn Rule> =
            Arc::new(FnRule::new("noop", [PropertyId(0)], |_| Ok(RuleOutcome::new())));
        assert_eq!(
            executor.submit(job(rule)).unwrap_err(),
            GraphError::ExecutorUnavailable
        );
    }

    #[test]
    fn recv_times_out_when_idle() {
        let executor = RuleExecutor::spawn(1).unwrap();
        assert!(executor
            .recv(Some(Duration::from_millis(10)))
            .unwrap()
            .is_none());
    }
}
