//! Resilience around generative-service calls.
//!
//! This module provides:
//! - Circuit breaker per generation task
//! - Token budget per task and globally
//! - Fallback strategy for contract drafting
//!
//! Retry with backoff is applied in [`crate::generation`].

mod budget;
mod circuit_breaker;
mod fallback;

pub use budget::{BudgetTracker, LlmUsage, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::FallbackStrategy;
