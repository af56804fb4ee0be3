//! Contract templates.
//!
//! A template is a text file with `{placeholder}` tokens, optionally preceded
//! by `#key: value` metadata lines. Templates are read-only once loaded.

mod parser;
mod store;

pub use parser::{find_placeholders, substitute, Template};
pub use store::{TemplateStore, MANIFEST_FILE};

use std::path::PathBuf;
use thiserror::Error;

/// Placeholder replaced with one line per party.
pub const PARTIES_INFO: &str = "parties_info";
/// Placeholder replaced with the address where the contract is concluded.
pub const ADDRESS: &str = "address";
/// Placeholder replaced with the contract-specific details.
pub const ADDITIONAL_INFO: &str = "additional_info";
/// Placeholder replaced with the drafting date.
pub const DATE: &str = "date";

/// Errors that can occur when loading templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("Template '{key}' points to missing file {path}")]
    MissingFile { key: String, path: PathBuf },

    #[error("No templates found in {0}")]
    Empty(PathBuf),
}
