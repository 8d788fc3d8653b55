//! Graph configuration, validation, and error types.
//!
//! [`GraphConfig`] is the input for constructing a [`Graph`](crate::Graph).
//! [`validate()`](GraphConfig::validate) checks it before any worker
//! thread is spawned; node type definitions are validated separately by
//! [`NodeTypeBuilder::build`](crate::NodeTypeBuilder::build).

use std::time::Duration;

use graft_core::{RuleError, Value, ValueKind};
use thiserror::Error;

// ── GraphConfig ────────────────────────────────────────────────────

/// Configuration for a [`Graph`](crate::Graph).
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Number of asynchronous rule worker threads. `None` = auto-detect
    /// (`available_parallelism / 2`, clamped to `[2, 8]`).
    pub worker_count: Option<usize>,
    /// Maximum nesting of rule runs triggered by other rules' writes.
    /// A chain that reaches this depth stops. Default: 16.
    pub max_rule_depth: usize,
    /// Upper bound for [`Graph::wait_for_pending`](crate::Graph::wait_for_pending).
    /// `None` waits indefinitely. Default: `None`.
    pub pending_timeout: Option<Duration>,
    /// Saving an unmodified aggregate fails with
    /// [`SaveError::NotModified`](graft_core::SaveError::NotModified)
    /// instead of succeeding as a no-op. Default: `false`.
    pub fail_on_not_modified: bool,
    /// Run every rule of a node once its fetch completes, so validity
    /// reflects the loaded data. Default: `true`.
    pub check_rules_on_fetch: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            max_rule_depth: 16,
            pending_timeout: None,
            fail_on_not_modified: false,
            check_rules_on_fetch: true,
        }
    }
}

impl GraphConfig {
    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                (cpus / 2).clamp(2, 8)
            }
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rule_depth == 0 {
            return Err(ConfigError::ZeroRuleDepth);
        }
        if self.pending_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroPendingTimeout);
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating a [`GraphConfig`] or building a
/// [`NodeType`](crate::NodeType).
#[derive(Debug, PartialEq, Error)]
pub enum ConfigError {
    /// Rule set validation failed.
    #[error("rules: {0}")]
    Rules(#[from] RuleError),
    /// `max_rule_depth` is zero.
    #[error("max_rule_depth must be at least 1")]
    ZeroRuleDepth,
    /// `pending_timeout` is zero.
    #[error("pending_timeout must be non-zero")]
    ZeroPendingTimeout,
    /// Two properties of a node type share a name.
    #[error("node type '{type_name}' declares '{property}' twice")]
    DuplicateProperty {
        /// Name of the node type.
        type_name: String,
        /// The repeated property name.
        property: String,
    },
    /// A property default does not fit the declared kind.
    #[error("default {default:?} of property '{property}' is not a {expected}")]
    InvalidDefault {
        /// Property name.
        property: String,
        /// Declared kind.
        expected: ValueKind,
        /// The rejected default.
        default: Value,
    },
    /// A rule worker thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::RuleId;
    use std::error::Error as _;

    #[test]
    fn default_config_is_valid() {
        let config = GraphConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_rule_depth, 16);
        assert!(!config.fail_on_not_modified);
        assert!(config.check_rules_on_fetch);
    }

    #[test]
    fn zero_depth_rejected() {
        let config = GraphConfig {
            max_rule_depth: 0,
            ..GraphConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroRuleDepth));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = GraphConfig {
            pending_timeout: Some(Duration::ZERO),
            ..GraphConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPendingTimeout));
    }

    #[test]
    fn worker_count_clamped() {
        let explicit = |n| GraphConfig {
            worker_count: Some(n),
            ..GraphConfig::default()
        };
        assert_eq!(explicit(0).resolved_worker_count(), 1);
        assert_eq!(explicit(3).resolved_worker_count(), 3);
        assert_eq!(explicit(1000).resolved_worker_count(), 64);
        let auto = GraphConfig::default().resolved_worker_count();
        assert!((2..=8).contains(&auto));
    }

    #[test]
    fn build_errors_name_the_property() {
        let dup = ConfigError::DuplicateProperty {
            type_name: "Order".into(),
            property: "customer".into(),
        };
        assert_eq!(dup.to_string(), "node type 'Order' declares 'customer' twice");
        assert!(dup.source().is_none());
        let spawn = ConfigError::ThreadSpawnFailed {
            reason: "rule worker 0: out of threads".into(),
        };
        assert_eq!(spawn.to_string(), "thread spawn failed: rule worker 0: out of threads");
    }

    #[test]
    fn rule_error_converts_and_chains() {
        let err = ConfigError::from(RuleError::NoTriggers(RuleId::from("r")));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "rules: rule 'r' has no trigger properties");
    }
}
