//! Next-action planning for agent mode.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use covenant_core::{schema, CompletionRequirements, NextAction, WorkflowState};

use crate::generation::{GenerationTask, GenerativeService};
use crate::prompts;

/// An action chosen by a planner, with the reason shown to the human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub action: NextAction,
    pub reason: String,
}

/// Chooses the next action of an agent-mode run.
///
/// Planners never change the state; the controller re-checks every planned
/// action's preconditions before running it.
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    /// `rejected` carries the refusal message of the previous plan, if any.
    async fn next_action(
        &self,
        state: &WorkflowState,
        requirements: &CompletionRequirements,
        rejected: Option<&str>,
    ) -> PlannedAction;

    fn name(&self) -> &str;
}

/// Follows the canonical stage order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedOrderPlanner;

#[async_trait]
impl ActionPlanner for FixedOrderPlanner {
    async fn next_action(
        &self,
        state: &WorkflowState,
        requirements: &CompletionRequirements,
        _rejected: Option<&str>,
    ) -> PlannedAction {
        PlannedAction {
            action: state.next_in_order(requirements),
            reason: "next step in order".to_string(),
        }
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[derive(Debug, Deserialize)]
struct NextActionResponse {
    action: String,
    #[serde(default)]
    reason: String,
}

/// Asks the generative service to pick the next action from a state summary.
/// Falls back to the canonical order when the service fails.
pub struct AssistedPlanner {
    service: Arc<GenerativeService>,
}

impl AssistedPlanner {
    pub fn new(service: Arc<GenerativeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ActionPlanner for AssistedPlanner {
    async fn next_action(
        &self,
        state: &WorkflowState,
        requirements: &CompletionRequirements,
        rejected: Option<&str>,
    ) -> PlannedAction {
        let result = self
            .service
            .generate_structured::<NextActionResponse>(
                GenerationTask::NextAction,
                prompts::SYSTEM_PROMPT,
                &prompts::next_action_prompt(&state.summary(), rejected),
                schema::next_action(),
            )
            .await;

        match result {
            Ok(response) => match NextAction::parse(&response.action) {
                Some(action) => PlannedAction {
                    action,
                    reason: response.reason,
                },
                None => {
                    tracing::warn!(action = %response.action, "Planner chose an unknown action");
                    FixedOrderPlanner.next_action(state, requirements, rejected).await
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Next-action planning failed, using fixed order");
                FixedOrderPlanner.next_action(state, requirements, rejected).await
            }
        }
    }

    fn name(&self) -> &str {
        "assisted"
    }
}
