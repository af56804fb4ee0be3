//! # covenant-core
//!
//! Deterministic model of the contract drafting workflow.
//!
//! This crate answers the questions that must never depend on a language model:
//! - Is this role allowed for this contract type?
//! - Is this extracted person complete enough to become a party?
//! - May the workflow move to the next stage?
//! - Did the drafted contract keep any placeholder or bracket artifact?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: validation is closed-set membership plus format parsers
//! 2. **No LLM calls**: generation lives in `covenant-runtime`
//! 3. **Typed state**: every workflow fact has its own slot in [`WorkflowState`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use covenant_core::{ContractRoleValidator, ContractType};
//!
//! let kind: ContractType = "airbnb".parse()?;
//! let role = ContractRoleValidator::validate_role(kind, "Tenant")?;
//! assert_eq!(role.label(), "Tenant");
//! assert!(ContractRoleValidator::validate_role(kind, "Buyer").is_err());
//! ```

pub mod documents;
pub mod draft;
pub mod roles;
pub mod schema;
pub mod state;
pub mod template;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use documents::{list_documents, DocumentError, DocumentKind, SUPPORTED_EXTENSIONS};
pub use draft::{DraftChecker, DraftIssue};
pub use roles::{AdditionalField, ContractRoleValidator, ContractType, FieldKind, Role};
pub use schema::ResponseSchema;
pub use state::{
    ActionOutcome, ActionRecord, CompletionRequirements, Completeness, NextAction, Stage,
    TransitionError, WorkflowState,
};
pub use template::{Template, TemplateError, TemplateStore};
pub use types::{
    ContractTypeSelection, DocumentFailure, DraftedContract, FailureStage, Party, PiiRecord,
    NOT_PROVIDED,
};
pub use validation::ValidationError;
