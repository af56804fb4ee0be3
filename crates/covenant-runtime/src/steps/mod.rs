//! The workflow steps, one module per stage.
//!
//! Each step talks to the human through [`crate::interaction`] and to the
//! generative service through [`crate::generation`]. Steps never touch
//! [`covenant_core::WorkflowState`]; the controller folds their results in.

pub mod construction;
pub mod contract_type;
pub mod ingest;
pub mod planner;
pub mod roles;
pub mod verification;

pub use construction::{
    construct, resolve_contract_address, ConstructionError, ConstructionRequest,
};
pub use contract_type::{collect_additional_info, resolve_contract_type};
pub use ingest::{extract_pii, ingest_documents, IngestReport};
pub use planner::{ActionPlanner, AssistedPlanner, FixedOrderPlanner, PlannedAction};
pub use roles::{assign_roles, AssignmentOptions};
pub use verification::{collect_missing_person, verify_records};
