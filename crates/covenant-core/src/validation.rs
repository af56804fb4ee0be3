//! Format parsers and the validation error shared by every closed-set check.
//!
//! A `ValidationError` is always recoverable: callers re-prompt the human
//! with the error message instead of aborting the workflow.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// Date format used for every date field (`DD/MM/YYYY`).
pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub const MIN_NAME_CHARS: usize = 3;
pub const MIN_ADDRESS_CHARS: usize = 5;

lazy_static! {
    static ref PHONE_PATTERN: Regex = Regex::new(r"^\+?[0-9][0-9 ().\-]*[0-9]$").unwrap();
}

/// Errors raised by closed-set membership checks and format parsers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid role '{role}' for a {contract_type} contract. Must be one of: {allowed}")]
    InvalidRole {
        role: String,
        contract_type: String,
        allowed: String,
    },

    #[error("Invalid contract type '{value}'. Must be one of: {allowed}")]
    InvalidContractType { value: String, allowed: String },

    #[error("{field} must not be empty")]
    EmptyField { field: String },

    #[error("{field} must contain at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("Party '{party}' has no role assigned")]
    NoRoles { party: String },

    #[error("Amount '{0}' must be a valid non-negative number")]
    InvalidAmount(String),

    #[error("Date '{0}' must be in DD/MM/YYYY format")]
    InvalidDate(String),

    #[error("Date {later} must not be before {earlier}")]
    DateOrder { earlier: String, later: String },

    #[error("Phone number '{0}' is not valid")]
    InvalidPhone(String),

    #[error("'{value}' is not one of the offered options (1-{max})")]
    InvalidChoice { value: String, max: usize },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("File '{0}' does not exist")]
    FileNotFound(String),
}

/// Require a trimmed, non-empty value.
pub fn require_non_empty(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn require_min_chars(field: &str, value: &str, min: usize) -> Result<String, ValidationError> {
    let value = require_non_empty(field, value)?;
    if value.chars().count() < min {
        return Err(ValidationError::TooShort {
            field: field.to_string(),
            min,
        });
    }
    Ok(value)
}

/// Parse a person's name, returned in title case ("ion POP" becomes "Ion Pop").
pub fn parse_person_name(raw: &str) -> Result<String, ValidationError> {
    require_min_chars("name", raw, MIN_NAME_CHARS).map(|name| title_case(&name))
}

pub fn parse_address(raw: &str) -> Result<String, ValidationError> {
    require_min_chars("address", raw, MIN_ADDRESS_CHARS)
}

/// Uppercase each letter that follows a non-letter, lowercase the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut after_letter = false;
    for c in text.chars() {
        if after_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        after_letter = c.is_alphabetic();
    }
    out
}

/// Parse a monetary amount. Both `,` and `.` are accepted as decimal separator.
///
/// Returns the normalized form (with `.`).
pub fn parse_amount(raw: &str) -> Result<String, ValidationError> {
    let normalized = raw.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(normalized),
        _ => Err(ValidationError::InvalidAmount(raw.trim().to_string())),
    }
}

/// Parse a `DD/MM/YYYY` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(raw.trim().to_string()))
}

/// Parse a phone number: optional leading `+`, separators allowed, 7 to 15 digits.
pub fn parse_phone(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    if !PHONE_PATTERN.is_match(trimmed) || !(7..=15).contains(&digits) {
        return Err(ValidationError::InvalidPhone(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Require a path to an existing regular file.
pub fn parse_existing_file(raw: &str) -> Result<PathBuf, ValidationError> {
    let trimmed = require_non_empty("file path", raw)?;
    let path = PathBuf::from(&trimmed);
    if !path.is_file() {
        return Err(ValidationError::FileNotFound(trimmed));
    }
    Ok(path)
}
