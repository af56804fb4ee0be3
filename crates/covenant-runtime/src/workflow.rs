//! Workflow controller.
//!
//! Drives one run from the documents folder to a drafted contract. Two modes
//! share the same steps:
//! - Guided: the fixed stage sequence of [`Stage`]
//! - Agent: a planner picks the next action each iteration, and the
//!   controller refuses actions whose preconditions do not hold
//!
//! The controller is the only writer of [`WorkflowState`]. Steps return
//! values; the controller folds them in between awaits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use covenant_core::{
    list_documents, ActionOutcome, Completeness, DocumentError, DraftedContract, NextAction,
    PiiRecord, Stage, TemplateStore, TransitionError, WorkflowState,
};

use crate::config::{PlannerMode, WorkflowConfig, WorkflowMode};
use crate::extraction::TextExtractor;
use crate::generation::GenerativeService;
use crate::interaction::{HumanInterface, InteractionError};
use crate::resilience::LlmUsage;
use crate::steps::{
    assign_roles, collect_missing_person, construct, ingest_documents, resolve_contract_address,
    resolve_contract_type, verify_records, ActionPlanner, AssignmentOptions, AssistedPlanner,
    ConstructionRequest, FixedOrderPlanner,
};

/// Errors that stop a run outright. Anything the human can recover from
/// ends the run as [`Stage::Aborted`] instead.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Documents(#[from] DocumentError),

    #[error("Workflow state error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Failed to save the contract to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a run that did not fail outright.
#[derive(Debug)]
pub struct WorkflowOutcome {
    /// Final state, `Complete` or `Aborted`
    pub state: WorkflowState,

    /// Where the draft was saved, if it was
    pub saved_to: Option<PathBuf>,

    pub usage: LlmUsage,
}

impl WorkflowOutcome {
    pub fn is_complete(&self) -> bool {
        self.state.stage() == Stage::Complete
    }

    pub fn contract(&self) -> Option<&DraftedContract> {
        self.state.drafted_contract.as_ref()
    }
}

/// Why a step stopped the run.
enum Halt {
    Interaction(InteractionError),
    Abort(String),
    Fatal(WorkflowError),
}

impl From<InteractionError> for Halt {
    fn from(e: InteractionError) -> Self {
        Halt::Interaction(e)
    }
}

impl From<TransitionError> for Halt {
    fn from(e: TransitionError) -> Self {
        Halt::Fatal(e.into())
    }
}

impl From<DocumentError> for Halt {
    fn from(e: DocumentError) -> Self {
        Halt::Fatal(e.into())
    }
}

/// The contract drafting workflow.
///
/// # Example
///
/// ```rust,ignore
/// let workflow = ContractWorkflow::new(service, extractor, human, templates, config)
///     .with_documents_dir("data")
///     .with_output_dir("output_contracts");
/// let outcome = workflow.run().await?;
/// ```
pub struct ContractWorkflow {
    service: Arc<GenerativeService>,
    extractor: Arc<dyn TextExtractor>,
    human: Arc<dyn HumanInterface>,
    templates: TemplateStore,
    config: WorkflowConfig,
    planner: Arc<dyn ActionPlanner>,
    documents_dir: PathBuf,
    output_dir: Option<PathBuf>,
}

impl ContractWorkflow {
    /// Create a workflow reading documents from `data/` and saving nothing.
    ///
    /// The planner follows `config.planner`.
    pub fn new(
        service: Arc<GenerativeService>,
        extractor: Arc<dyn TextExtractor>,
        human: Arc<dyn HumanInterface>,
        templates: TemplateStore,
        config: WorkflowConfig,
    ) -> Self {
        let planner: Arc<dyn ActionPlanner> = match config.planner {
            PlannerMode::Fixed => Arc::new(FixedOrderPlanner),
            PlannerMode::Assisted => Arc::new(AssistedPlanner::new(service.clone())),
        };
        Self {
            service,
            extractor,
            human,
            templates,
            config,
            planner,
            documents_dir: PathBuf::from("data"),
            output_dir: None,
        }
    }

    pub fn with_documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.documents_dir = dir.into();
        self
    }

    /// Save completed drafts under `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Run the workflow to `Complete` or `Aborted`.
    ///
    /// Cancellation, closed input, exhausted prompts, and failed critical
    /// steps abort the run and still return `Ok`. Only filesystem and state
    /// errors are returned as `Err`.
    pub async fn run(&self) -> Result<WorkflowOutcome, WorkflowError> {
        let mut state = WorkflowState::new();
        tracing::info!(
            mode = %self.config.mode,
            documents = %self.documents_dir.display(),
            templates = self.templates.len(),
            "Starting contract workflow"
        );
        self.human
            .say("Type 'quit' or 'exit' at any prompt to stop.")
            .await;

        let result = match self.config.mode {
            WorkflowMode::Guided => self.run_guided(&mut state).await,
            WorkflowMode::Agent => self.run_agent(&mut state).await,
        };

        match result {
            Ok(()) => {}
            Err(Halt::Interaction(e)) => {
                tracing::info!(error = %e, "Interaction ended the workflow");
                state.abort(e.to_string());
            }
            Err(Halt::Abort(reason)) => state.abort(reason),
            Err(Halt::Fatal(e)) => {
                state.abort(e.to_string());
                return Err(e);
            }
        }

        let saved_to = match (&self.output_dir, &state.drafted_contract) {
            (Some(dir), Some(draft)) if state.stage() == Stage::Complete => {
                let path = save_draft(dir, draft).await?;
                self.human
                    .say(&format!("Contract saved to {}", path.display()))
                    .await;
                Some(path)
            }
            _ => None,
        };

        tracing::info!(stage = %state.stage(), "Workflow finished");
        Ok(WorkflowOutcome {
            state,
            saved_to,
            usage: self.service.usage(),
        })
    }

    async fn run_guided(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        state.advance(Stage::PiiExtraction)?;
        self.gather_pii(state).await?;

        state.advance(Stage::ContractTypeResolution)?;
        self.determine_contract_type(state).await?;

        state.advance(Stage::PartyAssignment)?;
        self.identify_parties(state).await?;

        state.advance(Stage::ContractConstruction)?;
        self.construct_contract(state).await?;

        self.finish(state)
    }

    async fn run_agent(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        let requirements = self.config.requirements();
        let mut rejected: Option<String> = None;

        for iteration in 1..=self.config.max_agent_iterations {
            let planned = self
                .planner
                .next_action(state, &requirements, rejected.as_deref())
                .await;
            tracing::info!(
                iteration,
                planner = self.planner.name(),
                action = %planned.action,
                "Planned action"
            );

            if let Err(e) = state.check_action(planned.action, &requirements) {
                self.human.say(&e.to_string()).await;
                state.record(planned.action.as_str(), ActionOutcome::Rejected, e.to_string());
                rejected = Some(e.to_string());
                continue;
            }
            rejected = None;

            self.human
                .say(&format!("Next step: {} ({})", planned.action, planned.reason))
                .await;
            if planned.action == NextAction::Finish {
                return self.finish(state);
            }
            state.begin_action(planned.action, &requirements)?;
            match planned.action {
                NextAction::ExtractPii => self.gather_pii(state).await?,
                NextAction::DetermineContractType => self.determine_contract_type(state).await?,
                NextAction::IdentifyParties => self.identify_parties(state).await?,
                NextAction::ConstructContract => self.construct_contract(state).await?,
                NextAction::Finish => {}
            }
        }

        Err(Halt::Abort(format!(
            "no complete contract after {} agent iterations",
            self.config.max_agent_iterations
        )))
    }

    /// Ingest every document, have the human verify the people found, and
    /// collect missing people until `min_parties` are verified.
    async fn gather_pii(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        let documents = list_documents(&self.documents_dir)?;
        self.human
            .say(&format!(
                "Found {} document(s) in {}.",
                documents.len(),
                self.documents_dir.display()
            ))
            .await;

        let report =
            ingest_documents(&documents, self.extractor.as_ref(), &self.service).await;
        for failure in &report.failures {
            self.human.say(&format!("Skipped {}", failure)).await;
        }
        state.documents_processed += report.processed;
        state.record(
            NextAction::ExtractPii.as_str(),
            ActionOutcome::Completed,
            format!(
                "{} people from {} documents, {} skipped",
                report.records.len(),
                report.processed,
                report.failures.len()
            ),
        );
        state.document_failures.extend(report.failures);
        state.extracted_pii = report.records;

        state.advance(Stage::HumanVerification)?;
        let policy = self.config.input_policy();
        let extracted = std::mem::take(&mut state.extracted_pii);
        let verified = verify_records(self.human.as_ref(), extracted, policy).await?;
        merge_verified(&mut state.verified_pii, verified);

        let identity_required = self.config.completeness == Completeness::Strict;
        while state.verified_pii.len() < self.config.min_parties {
            if state.missing_information_rounds >= self.config.max_missing_information_rounds {
                return Err(Halt::Abort(format!(
                    "not enough verified personal data: {} of {} people",
                    state.verified_pii.len(),
                    self.config.min_parties
                )));
            }
            state.advance(Stage::MissingInformation)?;
            let person = collect_missing_person(
                self.human.as_ref(),
                state.verified_pii.len(),
                self.config.min_parties,
                identity_required,
                policy,
            )
            .await?;

            state.advance(Stage::HumanVerification)?;
            let verified = verify_records(self.human.as_ref(), vec![person], policy).await?;
            merge_verified(&mut state.verified_pii, verified);
        }

        tracing::info!(verified = state.verified_pii.len(), "Personal data verified");
        Ok(())
    }

    async fn determine_contract_type(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        let selection = resolve_contract_type(
            self.human.as_ref(),
            &self.service,
            &self.templates,
            self.config.type_selection,
            self.config.input_policy(),
        )
        .await?;

        state.record(
            NextAction::DetermineContractType.as_str(),
            ActionOutcome::Completed,
            selection.contract_type.key(),
        );
        state.contract_type_selection = Some(selection);
        state.parties = None;
        state.drafted_contract = None;
        Ok(())
    }

    async fn identify_parties(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        let contract_type = state
            .contract_type()
            .ok_or_else(|| Halt::Abort("the contract type is not set".to_string()))?;
        let options = AssignmentOptions {
            mode: self.config.role_selection,
            completeness: self.config.completeness,
            policy: self.config.input_policy(),
        };
        let parties = assign_roles(
            self.human.as_ref(),
            &self.service,
            contract_type,
            &state.verified_pii,
            options,
        )
        .await?;

        state.record(
            NextAction::IdentifyParties.as_str(),
            ActionOutcome::Completed,
            format!("{} parties", parties.len()),
        );
        state.parties = Some(parties);
        state.drafted_contract = None;
        Ok(())
    }

    async fn construct_contract(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        let Some(selection) = state.contract_type_selection.as_ref() else {
            return Err(Halt::Abort("the contract type is not set".to_string()));
        };
        let Some(template) = self.templates.get(&selection.template_key) else {
            return Err(Halt::Abort(format!(
                "template '{}' is not available",
                selection.template_key
            )));
        };
        let parties = state.parties.as_deref().unwrap_or_default();
        let address = resolve_contract_address(&selection.additional_info, parties);
        let request = ConstructionRequest {
            contract_type: selection.contract_type,
            template,
            parties,
            address: &address,
            additional_info: &selection.additional_info,
        };
        let result = construct(&self.service, &request, self.config.construction_fallback).await;

        match result {
            Ok(draft) => {
                self.human
                    .say(&format!("{} contract drafted.", draft.contract_type.display_name()))
                    .await;
                state.record(
                    NextAction::ConstructContract.as_str(),
                    ActionOutcome::Completed,
                    format!("{} characters", draft.text.len()),
                );
                state.drafted_contract = Some(draft);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Contract construction failed");
                self.human
                    .say(&format!("Contract construction failed: {} No contract was created.", e))
                    .await;
                state.record(
                    NextAction::ConstructContract.as_str(),
                    ActionOutcome::Failed,
                    e.to_string(),
                );
                Err(Halt::Abort(format!("no contract was created: {}", e)))
            }
        }
    }

    fn finish(&self, state: &mut WorkflowState) -> Result<(), Halt> {
        match state.finish(&self.config.requirements()) {
            Ok(()) => Ok(()),
            Err(TransitionError::Incomplete { missing }) => Err(Halt::Abort(format!(
                "workflow incomplete, missing: {}",
                missing.join(", ")
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append newly verified records, skipping people already verified.
fn merge_verified(verified: &mut Vec<PiiRecord>, new: Vec<PiiRecord>) {
    for record in new {
        let duplicate = verified.iter().any(|known| {
            known.name.trim().eq_ignore_ascii_case(record.name.trim())
                && known.address.trim().eq_ignore_ascii_case(record.address.trim())
        });
        if duplicate {
            tracing::debug!(person = record.display_name(), "Skipping duplicate record");
        } else {
            verified.push(record);
        }
    }
}

/// Write the draft to `<dir>/<type>_<timestamp>.txt`.
pub async fn save_draft(dir: &Path, draft: &DraftedContract) -> Result<PathBuf, WorkflowError> {
    let path = dir.join(draft.file_name());
    let persist_err = |source| WorkflowError::Persist {
        path: path.clone(),
        source,
    };
    tokio::fs::create_dir_all(dir).await.map_err(persist_err)?;
    tokio::fs::write(&path, draft.text.as_bytes())
        .await
        .map_err(persist_err)?;
    tracing::info!(path = %path.display(), "Contract saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::ContractType;

    #[test]
    fn test_merge_skips_duplicates() {
        let mut verified = vec![PiiRecord::new("Jane Doe", "12 Elm St")];
        merge_verified(
            &mut verified,
            vec![
                PiiRecord::new("jane doe ", "12 ELM ST"),
                PiiRecord::new("John Roe", "3 Oak Ave"),
            ],
        );
        assert_eq!(verified.len(), 2);
        assert_eq!(verified[1].name, "John Roe");
    }

    #[tokio::test]
    async fn test_save_draft_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output_contracts");
        let draft = DraftedContract::new(ContractType::BuySell, "AGREEMENT");

        let path = save_draft(&out, &draft).await.unwrap();
        assert!(path.starts_with(&out));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("buy-sell_") && n.ends_with(".txt")));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "AGREEMENT");
    }
}
