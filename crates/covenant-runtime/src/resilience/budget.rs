//! Token budgets and usage accounting for generative-service calls.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::generation::GenerationTask;
use crate::providers::TokenUsage;

/// Token budget for one scope (a task or the whole run).
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u32,

    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

}

/// Accumulated usage for one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Calls that reached the provider
    pub llm_calls: u32,

    /// Calls answered from the response cache
    pub cache_hits: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
            m if m.contains("gpt-4.1") => (2.0, 8.0),
            m if m.contains("gpt-3.5") => (0.5, 1.5),
            _ => (2.5, 10.0),
        };

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;
        input_cost + output_cost
    }
}

impl fmt::Display for LlmUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls ({} cached), {} tokens ({} prompt, {} completion), ~${:.4}",
            self.llm_calls,
            self.cache_hits,
            self.total_tokens,
            self.prompt_tokens,
            self.completion_tokens,
            self.estimated_cost
        )
    }
}

/// Budget tracker for one workflow run.
pub struct BudgetTracker {
    task_budgets: HashMap<GenerationTask, TokenBudget>,
    global_budget: TokenBudget,
    usage: RwLock<LlmUsage>,
}

impl BudgetTracker {
    pub fn new(global_max: u32, per_task_max: u32) -> Self {
        let task_budgets = GenerationTask::ALL
            .into_iter()
            .map(|task| (task, TokenBudget::new(per_task_max)))
            .collect();

        Self {
            task_budgets,
            global_budget: TokenBudget::new(global_max),
            usage: RwLock::new(LlmUsage::default()),
        }
    }

    pub fn can_afford(&self, task: GenerationTask, estimated_tokens: u32) -> bool {
        let task_ok = self
            .task_budgets
            .get(&task)
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);

        task_ok && self.global_budget.can_afford(estimated_tokens)
    }

    pub fn record_usage(&self, task: GenerationTask, usage: &TokenUsage, model: &str) {
        let total = usage.total();
        if let Some(budget) = self.task_budgets.get(&task) {
            budget.record(total);
        }
        self.global_budget.record(total);
        self.usage.write().add(usage, model);
    }

    pub fn record_cache_hit(&self) {
        self.usage.write().record_cache_hit();
    }

    pub fn get_usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn remaining_global(&self) -> u32 {
        self.global_budget.remaining()
    }

    pub fn remaining_task(&self, task: GenerationTask) -> u32 {
        self.task_budgets
            .get(&task)
            .map(|b| b.remaining())
            .unwrap_or(0)
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new(200_000, 60_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_enforcement() {
        let budget = TokenBudget::new(100);
        assert!(budget.can_afford(100));
        assert!(!budget.can_afford(101));

        budget.record(60);
        assert_eq!(budget.remaining(), 40);
        assert!(!budget.can_afford(50));
    }

    #[test]
    fn test_budget_tracker() {
        let tracker = BudgetTracker::new(500, 100);
        assert!(tracker.can_afford(GenerationTask::PiiExtraction, 50));

        let usage = TokenUsage {
            prompt_tokens: 30,
            completion_tokens: 20,
        };
        tracker.record_usage(GenerationTask::PiiExtraction, &usage, "gpt-4o");

        assert_eq!(tracker.remaining_task(GenerationTask::PiiExtraction), 50);
        assert_eq!(tracker.remaining_task(GenerationTask::ContractDrafting), 100);
        assert_eq!(tracker.remaining_global(), 450);
        assert!(!tracker.can_afford(GenerationTask::PiiExtraction, 60));
        assert_eq!(tracker.get_usage().llm_calls, 1);
    }

    #[test]
    fn test_cost_estimation() {
        let mut usage = LlmUsage::default();
        usage.add(
            &TokenUsage {
                prompt_tokens: 1000,
                completion_tokens: 500,
            },
            "gpt-4o-2024-08-06",
        );
        // 1000 * $2.5/MTok + 500 * $10/MTok = $0.0075
        assert!((usage.estimated_cost - 0.0075).abs() < 1e-9);
    }

    #[test]
    fn test_usage_report() {
        let tracker = BudgetTracker::default();
        tracker.record_cache_hit();
        let report = tracker.get_usage().to_string();
        assert!(report.starts_with("0 calls (1 cached)"));
    }
}
