//! Circuit breaker to stop hammering a failing generative service.
//!
//! When calls for a task fail repeatedly, the circuit opens and further calls
//! for that task fail fast until the recovery timeout has passed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::duration_str;
use crate::generation::GenerationTask;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery (e.g. "30s")
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, calls fail fast
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// One circuit per generation task, so a failing drafting call does not
/// block PII extraction.
pub struct CircuitBreaker {
    states: RwLock<HashMap<GenerationTask, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls for `task` should fail fast.
    pub fn is_open(&self, task: GenerationTask) -> bool {
        let states = self.states.read();
        match states.get(&task) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(task);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, task: GenerationTask) {
        let mut states = self.states.write();
        match states.get(&task).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(task, CircuitState::Closed { failures: 0 });
                    tracing::info!(task = %task, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        task,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(task, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, task: GenerationTask) {
        let mut states = self.states.write();
        let failures = match states.get(&task).cloned() {
            Some(CircuitState::Closed { failures }) => failures,
            None => 0,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    task,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(task = %task, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures + 1 >= self.config.failure_threshold {
            states.insert(
                task,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                task = %task,
                failures = failures + 1,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(
                task,
                CircuitState::Closed {
                    failures: failures + 1,
                },
            );
        }
    }

    fn transition_to_half_open(&self, task: GenerationTask) {
        let mut states = self.states.write();
        if matches!(states.get(&task), Some(CircuitState::Open { .. })) {
            states.insert(task, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(task = %task, "Circuit half-open, allowing a recovery call");
        }
    }

    pub fn state(&self, task: GenerationTask) -> CircuitState {
        self.states
            .read()
            .get(&task)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(GenerationTask::PiiExtraction));
        assert_eq!(
            cb.state(GenerationTask::PiiExtraction),
            CircuitState::Closed { failures: 0 }
        );
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure(GenerationTask::ContractDrafting);
        assert!(!cb.is_open(GenerationTask::ContractDrafting));

        cb.record_failure(GenerationTask::ContractDrafting);
        assert!(cb.is_open(GenerationTask::ContractDrafting));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::default();
        cb.record_failure(GenerationTask::PiiExtraction);
        cb.record_failure(GenerationTask::PiiExtraction);
        cb.record_success(GenerationTask::PiiExtraction);

        cb.record_failure(GenerationTask::PiiExtraction);
        cb.record_failure(GenerationTask::PiiExtraction);
        assert!(!cb.is_open(GenerationTask::PiiExtraction));
    }

    #[test]
    fn test_tasks_are_independent() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        cb.record_failure(GenerationTask::ContractDrafting);
        assert!(cb.is_open(GenerationTask::ContractDrafting));
        assert!(!cb.is_open(GenerationTask::PiiExtraction));
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            success_threshold: 1,
        });
        cb.record_failure(GenerationTask::NextAction);
        assert!(!cb.is_open(GenerationTask::NextAction));
        assert_eq!(
            cb.state(GenerationTask::NextAction),
            CircuitState::HalfOpen { successes: 0 }
        );

        cb.record_success(GenerationTask::NextAction);
        assert_eq!(
            cb.state(GenerationTask::NextAction),
            CircuitState::Closed { failures: 0 }
        );
    }
}
