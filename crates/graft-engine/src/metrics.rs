//! Cumulative counters for a [`Graph`](crate::Graph).
//!
//! [`GraphMetrics`] is updated on the owning context as rules run,
//! cascades settle and saves complete; read it through
//! [`Graph::metrics`](crate::Graph::metrics).

/// Cumulative engine counters since the graph was created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphMetrics {
    /// Synchronous rule runs.
    pub rules_executed: u64,
    /// Asynchronous rule runs submitted to the executor.
    pub async_started: u64,
    /// Rule outcomes applied to a node.
    pub outcomes_applied: u64,
    /// Asynchronous outcomes discarded because a newer run superseded them.
    pub stale_discarded: u64,
    /// Rule runs that returned a fault or panicked.
    pub rule_faults: u64,
    /// Derived-state recomputations of a single node.
    pub cascade_recomputations: u64,
    /// Cascades that stopped below the root because a node's derived
    /// state did not change.
    pub cascade_short_circuits: u64,
    /// Change events handed to subscribers (counted per subscriber).
    pub notifications_delivered: u64,
    /// Rule chains cut off at `max_rule_depth`.
    pub depth_overflows: u64,
    /// Saves that ran their full plan.
    pub saves_completed: u64,
    /// Persistence handler invocations issued by saves.
    pub persistence_operations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = GraphMetrics::default();
        assert_eq!(m.rules_executed, 0);
        assert_eq!(m.async_started, 0);
        assert_eq!(m.outcomes_applied, 0);
        assert_eq!(m.stale_discarded, 0);
        assert_eq!(m.rule_faults, 0);
        assert_eq!(m.cascade_recomputations, 0);
        assert_eq!(m.cascade_short_circuits, 0);
        assert_eq!(m.notifications_delivered, 0);
        assert_eq!(m.depth_overflows, 0);
        assert_eq!(m.saves_completed, 0);
        assert_eq!(m.persistence_operations, 0);
    }
}
