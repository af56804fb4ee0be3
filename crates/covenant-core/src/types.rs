//! Records that flow through the workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::roles::{ContractType, Role};
use crate::validation::{self, ValidationError};

/// Value an extractor writes when a field is absent from the document.
pub const NOT_PROVIDED: &str = "Not provided";

fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_PROVIDED)
}

/// Identifying data of one person found in a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiiRecord {
    pub name: String,
    pub address: String,

    /// Document the record was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<PathBuf>,
}

impl PiiRecord {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            source_document: None,
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_document = Some(path.into());
        self
    }

    /// Fields that are empty or set to "Not provided".
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_missing(&self.name) {
            missing.push("name");
        }
        if is_missing(&self.address) {
            missing.push("address");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Both fields present, name of at least 3 and address of at least 5 characters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(field) = self.missing_fields().first() {
            return Err(ValidationError::MissingField((*field).to_string()));
        }
        validation::parse_person_name(&self.name)?;
        validation::parse_address(&self.address)?;
        Ok(())
    }

    /// Best available label for messages, even for incomplete records.
    pub fn display_name(&self) -> &str {
        if is_missing(&self.name) {
            "(unnamed person)"
        } else {
            self.name.trim()
        }
    }
}

impl fmt::Display for PiiRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name: {}, Address: {}", self.name, self.address)
    }
}

/// A verified person with the roles they hold in the contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub roles: BTreeSet<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Document that proves the party's identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_document: Option<PathBuf>,
}

impl Party {
    pub fn new(record: &PiiRecord, roles: BTreeSet<Role>) -> Self {
        Self {
            name: record.name.trim().to_string(),
            address: record.address.trim().to_string(),
            roles,
            phone: None,
            identity_document: record.source_document.clone(),
        }
    }

    /// Roles joined for display, e.g. "Buyer and Seller".
    pub fn role_labels(&self) -> String {
        self.roles
            .iter()
            .map(Role::label)
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}), {}", self.name, self.role_labels(), self.address)?;
        if let Some(phone) = &self.phone {
            write!(f, ", phone {}", phone)?;
        }
        Ok(())
    }
}

/// The chosen contract type with the template and details that go with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractTypeSelection {
    pub contract_type: ContractType,
    pub template_key: String,
    #[serde(default)]
    pub additional_info: BTreeMap<String, String>,
}

impl ContractTypeSelection {
    pub fn new(contract_type: ContractType, template_key: impl Into<String>) -> Self {
        Self {
            contract_type,
            template_key: template_key.into(),
            additional_info: BTreeMap::new(),
        }
    }
}

/// A finished contract draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftedContract {
    pub contract_type: ContractType,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl DraftedContract {
    pub fn new(contract_type: ContractType, text: impl Into<String>) -> Self {
        Self {
            contract_type,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// File name the draft is saved under: `<type>_<YYYYmmdd_HHMMSS>.txt`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.txt",
            self.contract_type.key(),
            self.created_at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Where processing of a document stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    TextExtraction,
    PiiExtraction,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::TextExtraction => f.write_str("text extraction"),
            FailureStage::PiiExtraction => f.write_str("PII extraction"),
        }
    }
}

/// A document that was skipped, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFailure {
    pub document: PathBuf,
    pub stage: FailureStage,
    pub reason: String,
}

impl DocumentFailure {
    pub fn new(document: &Path, stage: FailureStage, reason: impl Into<String>) -> Self {
        Self {
            document: document.to_path_buf(),
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DocumentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} failed: {}",
            self.document.display(),
            self.stage,
            self.reason
        )
    }
}
