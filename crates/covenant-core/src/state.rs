//! Workflow state: the stage enum, its transition table, and the
//! completeness predicate that gates the terminal stage.
//!
//! `WorkflowState` is single-owner. The controller mutates it between
//! suspension points and never from inside a fan-out task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::roles::{ContractRoleValidator, ContractType};
use crate::types::{ContractTypeSelection, DocumentFailure, DraftedContract, Party, PiiRecord};

/// Stages of the drafting workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    PiiExtraction,
    HumanVerification,
    MissingInformation,
    ContractTypeResolution,
    PartyAssignment,
    ContractConstruction,
    Complete,
    Aborted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::PiiExtraction => "pii_extraction",
            Stage::HumanVerification => "human_verification",
            Stage::MissingInformation => "missing_information",
            Stage::ContractTypeResolution => "contract_type_resolution",
            Stage::PartyAssignment => "party_assignment",
            Stage::ContractConstruction => "contract_construction",
            Stage::Complete => "complete",
            Stage::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Aborted)
    }

    /// Linear transition table used by the guided flow.
    ///
    /// `Complete` is never reachable through this table: only
    /// [`WorkflowState::finish`] enters it, after the completeness check.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        use Stage::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (*self, next),
            (_, Aborted)
                | (Init, PiiExtraction)
                | (PiiExtraction, HumanVerification)
                | (HumanVerification, MissingInformation)
                | (HumanVerification, ContractTypeResolution)
                | (MissingInformation, HumanVerification)
                | (ContractTypeResolution, PartyAssignment)
                | (PartyAssignment, ContractConstruction)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions the free-form agent mode chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    ExtractPii,
    DetermineContractType,
    IdentifyParties,
    ConstructContract,
    Finish,
}

impl NextAction {
    pub const ALL: [NextAction; 5] = [
        NextAction::ExtractPii,
        NextAction::DetermineContractType,
        NextAction::IdentifyParties,
        NextAction::ConstructContract,
        NextAction::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NextAction::ExtractPii => "extract_pii",
            NextAction::DetermineContractType => "determine_contract_type",
            NextAction::IdentifyParties => "identify_parties",
            NextAction::ConstructContract => "construct_contract",
            NextAction::Finish => "finish",
        }
    }

    pub fn parse(value: &str) -> Option<NextAction> {
        let lowered = value.trim().to_lowercase();
        NextAction::ALL
            .into_iter()
            .find(|action| action.as_str() == lowered)
    }

    /// Stage the workflow is in while this action runs.
    pub fn stage(&self) -> Stage {
        match self {
            NextAction::ExtractPii => Stage::PiiExtraction,
            NextAction::DetermineContractType => Stage::ContractTypeResolution,
            NextAction::IdentifyParties => Stage::PartyAssignment,
            NextAction::ConstructContract => Stage::ContractConstruction,
            NextAction::Finish => Stage::Complete,
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from illegal stage changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Workflow already ended in stage {0}")]
    Terminal(Stage),

    #[error("Illegal transition from {from} to {to}")]
    Illegal { from: Stage, to: Stage },

    #[error("Cannot {action} yet: {reason}")]
    Precondition { action: NextAction, reason: String },

    #[error("Workflow is incomplete, missing: {}", .missing.join(", "))]
    Incomplete { missing: Vec<String> },
}

/// Which completeness predicate gates the terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Contract type set and enough parties with valid roles
    #[default]
    Standard,
    /// Standard plus a non-empty draft, and a phone and identity document per party
    Strict,
}

/// Parameters of the completeness predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequirements {
    pub completeness: Completeness,
    pub min_parties: usize,
}

impl Default for CompletionRequirements {
    fn default() -> Self {
        Self {
            completeness: Completeness::Standard,
            min_parties: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed,
    Rejected,
    Failed,
    Skipped,
}

/// One entry of the workflow history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub action: String,
    pub outcome: ActionOutcome,
    pub detail: String,
}

/// Aggregate root of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    stage: Stage,

    /// Records extracted but not yet confirmed by the human
    pub extracted_pii: Vec<PiiRecord>,

    /// Records confirmed by the human, in document order
    pub verified_pii: Vec<PiiRecord>,

    pub contract_type_selection: Option<ContractTypeSelection>,
    pub parties: Option<Vec<Party>>,
    pub drafted_contract: Option<DraftedContract>,

    /// Documents skipped during ingestion
    pub document_failures: Vec<DocumentFailure>,

    pub documents_processed: usize,
    pub missing_information_rounds: u32,

    history: Vec<ActionRecord>,
    abort_reason: Option<String>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            stage: Stage::Init,
            extracted_pii: Vec::new(),
            verified_pii: Vec::new(),
            contract_type_selection: None,
            parties: None,
            drafted_contract: None,
            document_failures: Vec::new(),
            documents_processed: 0,
            missing_information_rounds: 0,
            history: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn history(&self) -> &[ActionRecord] {
        &self.history
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn contract_type(&self) -> Option<ContractType> {
        self.contract_type_selection
            .as_ref()
            .map(|selection| selection.contract_type)
    }

    /// Append a history entry for the current stage.
    pub fn record(
        &mut self,
        action: impl Into<String>,
        outcome: ActionOutcome,
        detail: impl Into<String>,
    ) {
        self.history.push(ActionRecord {
            at: Utc::now(),
            stage: self.stage,
            action: action.into(),
            outcome,
            detail: detail.into(),
        });
    }

    /// Move along the linear transition table.
    pub fn advance(&mut self, next: Stage) -> Result<(), TransitionError> {
        if self.stage.is_terminal() {
            return Err(TransitionError::Terminal(self.stage));
        }
        if !self.stage.can_advance_to(next) {
            return Err(TransitionError::Illegal {
                from: self.stage,
                to: next,
            });
        }
        tracing::debug!(from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
        if next == Stage::MissingInformation {
            self.missing_information_rounds += 1;
        }
        Ok(())
    }

    /// End the run without a complete contract.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        let reason = reason.into();
        self.record("abort", ActionOutcome::Failed, reason.clone());
        tracing::warn!(stage = %self.stage, reason = %reason, "Workflow aborted");
        self.stage = Stage::Aborted;
        self.abort_reason = Some(reason);
    }

    /// Check the preconditions of an agent-mode action without changing state.
    pub fn check_action(
        &self,
        action: NextAction,
        requirements: &CompletionRequirements,
    ) -> Result<(), TransitionError> {
        if self.stage.is_terminal() {
            return Err(TransitionError::Terminal(self.stage));
        }
        let refuse = |reason: &str| {
            Err(TransitionError::Precondition {
                action,
                reason: reason.to_string(),
            })
        };
        match action {
            NextAction::ExtractPii | NextAction::DetermineContractType => Ok(()),
            NextAction::IdentifyParties => {
                if self.contract_type_selection.is_none() {
                    return refuse("the contract type is not set");
                }
                if self.verified_pii.is_empty() {
                    return refuse("no verified personal data is available");
                }
                Ok(())
            }
            NextAction::ConstructContract => {
                if self.contract_type_selection.is_none() {
                    return refuse("the contract type is not set");
                }
                match &self.parties {
                    None => refuse("the parties are not identified"),
                    Some(parties) if parties.len() < requirements.min_parties => refuse(&format!(
                        "at least {} parties are required",
                        requirements.min_parties
                    )),
                    Some(_) => Ok(()),
                }
            }
            NextAction::Finish => {
                let missing = self.missing_requirements(requirements);
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(TransitionError::Incomplete { missing })
                }
            }
        }
    }

    /// Enter the stage of an agent-mode action after checking its preconditions.
    ///
    /// `Finish` is delegated to [`WorkflowState::finish`].
    pub fn begin_action(
        &mut self,
        action: NextAction,
        requirements: &CompletionRequirements,
    ) -> Result<(), TransitionError> {
        if action == NextAction::Finish {
            return self.finish(requirements);
        }
        self.check_action(action, requirements)?;
        tracing::debug!(from = %self.stage, action = %action, "Agent action");
        self.stage = action.stage();
        Ok(())
    }

    /// Unmet parts of the completeness predicate, empty when complete.
    pub fn missing_requirements(&self, requirements: &CompletionRequirements) -> Vec<String> {
        let mut missing = Vec::new();
        let contract_type = self.contract_type();
        if contract_type.is_none() {
            missing.push("contract type".to_string());
        }

        let parties = self.parties.as_deref().unwrap_or_default();
        if parties.len() < requirements.min_parties {
            missing.push(format!("at least {} parties", requirements.min_parties));
        }
        if let Some(kind) = contract_type {
            for party in parties {
                if ContractRoleValidator::validate_party(kind, party).is_err() {
                    missing.push(format!("valid roles for {}", party.name));
                }
            }
        }

        if requirements.completeness == Completeness::Strict {
            let has_draft = self
                .drafted_contract
                .as_ref()
                .is_some_and(|draft| !draft.text.trim().is_empty());
            if !has_draft {
                missing.push("drafted contract".to_string());
            }
            for party in parties {
                if party.phone.as_deref().map_or(true, |p| p.trim().is_empty()) {
                    missing.push(format!("phone for {}", party.name));
                }
                if party.identity_document.is_none() {
                    missing.push(format!("identity document for {}", party.name));
                }
            }
        }
        missing
    }

    pub fn is_complete(&self, requirements: &CompletionRequirements) -> bool {
        self.missing_requirements(requirements).is_empty()
    }

    /// Enter `Complete` if the completeness predicate holds.
    pub fn finish(&mut self, requirements: &CompletionRequirements) -> Result<(), TransitionError> {
        if self.stage.is_terminal() {
            return Err(TransitionError::Terminal(self.stage));
        }
        let missing = self.missing_requirements(requirements);
        if !missing.is_empty() {
            return Err(TransitionError::Incomplete { missing });
        }
        self.record("finish", ActionOutcome::Completed, "completeness check passed");
        self.stage = Stage::Complete;
        Ok(())
    }

    /// Next action in the canonical order, given what is already filled in.
    pub fn next_in_order(&self, requirements: &CompletionRequirements) -> NextAction {
        if self.verified_pii.len() < requirements.min_parties && !self.pii_extraction_attempted() {
            NextAction::ExtractPii
        } else if self.contract_type_selection.is_none() {
            NextAction::DetermineContractType
        } else if self.parties.is_none() {
            NextAction::IdentifyParties
        } else if self.drafted_contract.is_none() {
            NextAction::ConstructContract
        } else {
            NextAction::Finish
        }
    }

    fn pii_extraction_attempted(&self) -> bool {
        self.history
            .iter()
            .any(|entry| entry.action == NextAction::ExtractPii.as_str())
    }

    /// Plain-text summary handed to the next-action planner.
    pub fn summary(&self) -> String {
        let contract_type = self
            .contract_type()
            .map(|kind| kind.key().to_string())
            .unwrap_or_else(|| "not set".to_string());
        let parties = match &self.parties {
            Some(parties) => parties
                .iter()
                .map(|p| format!("{} ({})", p.name, p.role_labels()))
                .collect::<Vec<_>>()
                .join("; "),
            None => "not identified".to_string(),
        };
        let mut lines = vec![
            format!("stage: {}", self.stage),
            format!("documents processed: {}", self.documents_processed),
            format!("verified people: {}", self.verified_pii.len()),
            format!("contract type: {}", contract_type),
            format!("parties: {}", parties),
            format!(
                "draft: {}",
                if self.drafted_contract.is_some() {
                    "present"
                } else {
                    "absent"
                }
            ),
        ];
        if let Some(last) = self.history.last() {
            lines.push(format!(
                "last action: {} ({:?}) {}",
                last.action, last.outcome, last.detail
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use std::collections::BTreeSet;

    fn party(name: &str, roles: &[Role]) -> Party {
        Party::new(
            &PiiRecord::new(name, "Str. Mica 4"),
            roles.iter().copied().collect::<BTreeSet<_>>(),
        )
    }

    fn ready_state() -> WorkflowState {
        let mut state = WorkflowState::new();
        state.verified_pii = vec![
            PiiRecord::new("Jane Doe", "12 Elm St"),
            PiiRecord::new("John Roe", "3 Oak Ave"),
        ];
        state.contract_type_selection =
            Some(ContractTypeSelection::new(ContractType::BuySell, "buy-sell"));
        state.parties = Some(vec![
            party("Jane Doe", &[Role::Buyer]),
            party("John Roe", &[Role::Seller]),
        ]);
        state
    }

    #[test]
    fn test_linear_path_with_missing_information_loop() {
        let mut state = WorkflowState::new();
        state.advance(Stage::PiiExtraction).unwrap();
        state.advance(Stage::HumanVerification).unwrap();
        state.advance(Stage::MissingInformation).unwrap();
        state.advance(Stage::HumanVerification).unwrap();
        state.advance(Stage::ContractTypeResolution).unwrap();
        state.advance(Stage::PartyAssignment).unwrap();
        state.advance(Stage::ContractConstruction).unwrap();
        assert_eq!(state.missing_information_rounds, 1);
    }

    #[test]
    fn test_skipping_stages_is_illegal() {
        let mut state = WorkflowState::new();
        let err = state.advance(Stage::PartyAssignment).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: Stage::Init,
                to: Stage::PartyAssignment
            }
        );
        assert_eq!(state.stage(), Stage::Init);
    }

    #[test]
    fn test_complete_only_through_finish() {
        let mut state = ready_state();
        assert!(state.advance(Stage::Complete).is_err());
        state.finish(&CompletionRequirements::default()).unwrap();
        assert_eq!(state.stage(), Stage::Complete);
        assert!(matches!(
            state.advance(Stage::Aborted),
            Err(TransitionError::Terminal(Stage::Complete))
        ));
    }

    #[test]
    fn test_construct_refused_before_contract_type() {
        let mut state = WorkflowState::new();
        let err = state
            .begin_action(NextAction::ConstructContract, &CompletionRequirements::default())
            .unwrap_err();
        assert!(err.to_string().contains("contract type is not set"));
        assert_eq!(state.stage(), Stage::Init);
    }

    #[test]
    fn test_finish_requires_two_parties() {
        let mut state = ready_state();
        state.parties = Some(vec![party("Jane Doe", &[Role::Buyer])]);
        let err = state.finish(&CompletionRequirements::default()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Incomplete {
                missing: vec!["at least 2 parties".to_string()]
            }
        );
    }

    #[test]
    fn test_finish_rejects_roles_outside_type() {
        let mut state = ready_state();
        state.parties = Some(vec![
            party("Jane Doe", &[Role::Tenant]),
            party("John Roe", &[Role::Seller]),
        ]);
        let missing = state.missing_requirements(&CompletionRequirements::default());
        assert_eq!(missing, vec!["valid roles for Jane Doe".to_string()]);
    }

    #[test]
    fn test_strict_completeness() {
        let strict = CompletionRequirements {
            completeness: Completeness::Strict,
            min_parties: 2,
        };
        let mut state = ready_state();
        let missing = state.missing_requirements(&strict);
        assert!(missing.contains(&"drafted contract".to_string()));
        assert!(missing.contains(&"phone for Jane Doe".to_string()));
        assert!(missing.contains(&"identity document for John Roe".to_string()));

        state.drafted_contract = Some(DraftedContract::new(ContractType::BuySell, "Contract"));
        for p in state.parties.as_mut().unwrap() {
            p.phone = Some("+40 721 000 111".to_string());
            p.identity_document = Some(format!("data/{}.png", p.name).into());
        }
        assert!(state.is_complete(&strict));
    }

    #[test]
    fn test_next_in_order() {
        let requirements = CompletionRequirements::default();
        let mut state = WorkflowState::new();
        assert_eq!(state.next_in_order(&requirements), NextAction::ExtractPii);

        state.record("extract_pii", ActionOutcome::Completed, "1 record");
        assert_eq!(
            state.next_in_order(&requirements),
            NextAction::DetermineContractType
        );

        let mut ready = ready_state();
        assert_eq!(
            ready.next_in_order(&requirements),
            NextAction::ConstructContract
        );
        ready.drafted_contract = Some(DraftedContract::new(ContractType::BuySell, "x"));
        assert_eq!(ready.next_in_order(&requirements), NextAction::Finish);
    }

    #[test]
    fn test_abort_records_reason() {
        let mut state = WorkflowState::new();
        state.abort("no contract was created");
        assert_eq!(state.stage(), Stage::Aborted);
        assert_eq!(state.abort_reason(), Some("no contract was created"));
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_next_action_parse() {
        assert_eq!(
            NextAction::parse(" Construct_Contract "),
            Some(NextAction::ConstructContract)
        );
        assert_eq!(NextAction::parse("celebrate"), None);
    }

    #[test]
    fn test_summary_mentions_contract_type() {
        let summary = ready_state().summary();
        assert!(summary.contains("contract type: buy-sell"));
        assert!(summary.contains("Jane Doe (Buyer)"));
    }
}
