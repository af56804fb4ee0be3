//! # covenant-runtime
//!
//! Async side of the contract drafting workflow.
//!
//! `covenant-core` decides what is valid. This crate does everything that
//! waits on something: the generative service, external text-extraction
//! tools, and the human at the console.
//!
//! ## Important
//!
//! Generative output is never trusted for pass/fail decisions. Suggested
//! contract types and roles are re-validated against the closed sets in
//! `covenant-core` and confirmed by the human; drafts must pass
//! [`covenant_core::DraftChecker`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use covenant_runtime::{ContractWorkflow, GenerativeService, RuntimeConfig};
//!
//! let config = RuntimeConfig::default();
//! let service = Arc::new(GenerativeService::new(provider, &config));
//! let workflow = ContractWorkflow::new(service, extractor, human, templates, config.workflow)
//!     .with_documents_dir("data");
//! let outcome = workflow.run().await?;
//! ```

pub mod cache;
pub mod config;
pub mod extraction;
pub mod generation;
pub mod interaction;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod steps;
pub mod workflow;

pub use cache::ResponseCache;
pub use config::{
    PlannerMode, RuntimeConfig, SelectionMode, WorkflowConfig, WorkflowMode,
};
pub use extraction::{ExtractionError, FileTextExtractor, TextExtractor};
pub use generation::{GenerationError, GenerationTask, GenerativeService};
pub use interaction::{HumanInterface, InteractionError, RetryPolicy, ScriptedHuman};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::{FallbackStrategy, LlmUsage};
pub use workflow::{ContractWorkflow, WorkflowError, WorkflowOutcome};
