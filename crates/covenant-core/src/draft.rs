//! Deterministic checks on a drafted contract.
//!
//! Generated drafts are accepted only if they pass these checks. The
//! generative service is never asked whether its own draft is correct.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::types::Party;

/// Bracketed text allowed to remain in a draft.
pub const TO_BE_DETERMINED: &str = "[To be determined]";

/// Shortest text accepted as a contract.
pub const MIN_DRAFT_CHARS: usize = 100;

lazy_static! {
    static ref PLACEHOLDER_TOKEN: Regex = Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").unwrap();
    static ref BRACKET_ARTIFACT: Regex = Regex::new(r"\[[^\[\]\n]{1,80}\]").unwrap();
}

/// A defect found in a drafted contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftIssue {
    #[error("Draft is empty")]
    Empty,

    #[error("Draft is too short: {chars} characters, at least {min} expected")]
    TooShort { chars: usize, min: usize },

    #[error("Unresolved placeholder {0}")]
    UnresolvedPlaceholder(String),

    #[error("Bracketed placeholder left in draft: {0}")]
    BracketArtifact(String),

    #[error("Party '{0}' is not named in the draft")]
    MissingPartyName(String),

    #[error("Role '{role}' of {party} is not used in the draft")]
    MissingRoleLabel { party: String, role: String },
}

/// Checks a draft against the parties it must name.
///
/// # Checks
/// 1. The draft is not blank and has at least [`MIN_DRAFT_CHARS`] characters
/// 2. No `{placeholder}` token survived substitution
/// 3. No `[...]` bracket artifact remains, except `[To be determined]` and
///    bracketed text that is part of a verified fact
/// 4. Every party name and every exact role label appears
pub struct DraftChecker<'a> {
    parties: &'a [Party],
    allowed_brackets: BTreeSet<String>,
}

impl<'a> DraftChecker<'a> {
    /// Party names, addresses and phones count as verified facts.
    pub fn new(parties: &'a [Party]) -> Self {
        let checker = Self {
            parties,
            allowed_brackets: BTreeSet::new(),
        };
        checker.with_facts(parties.iter().flat_map(|party| {
            [Some(&party.name), Some(&party.address), party.phone.as_ref()]
                .into_iter()
                .flatten()
        }))
    }

    /// Allow the bracketed text found in `facts`, e.g. contract details.
    pub fn with_facts<I, S>(mut self, facts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for fact in facts {
            self.allowed_brackets.extend(
                BRACKET_ARTIFACT
                    .find_iter(fact.as_ref())
                    .map(|m| m.as_str().to_string()),
            );
        }
        self
    }

    fn is_allowed(&self, bracketed: &str) -> bool {
        bracketed.eq_ignore_ascii_case(TO_BE_DETERMINED) || self.allowed_brackets.contains(bracketed)
    }

    /// All issues found, in check order.
    pub fn issues(&self, text: &str) -> Vec<DraftIssue> {
        if text.trim().is_empty() {
            return vec![DraftIssue::Empty];
        }

        let mut issues = Vec::new();
        let chars = text.trim().chars().count();
        if chars < MIN_DRAFT_CHARS {
            issues.push(DraftIssue::TooShort {
                chars,
                min: MIN_DRAFT_CHARS,
            });
        }

        issues.extend(
            PLACEHOLDER_TOKEN
                .find_iter(text)
                .map(|m| DraftIssue::UnresolvedPlaceholder(m.as_str().to_string())),
        );

        issues.extend(
            BRACKET_ARTIFACT
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|found| !self.is_allowed(found))
                .map(|found| DraftIssue::BracketArtifact(found.to_string())),
        );

        let lowered = text.to_lowercase();
        for party in self.parties {
            if !lowered.contains(&party.name.to_lowercase()) {
                issues.push(DraftIssue::MissingPartyName(party.name.clone()));
            }
            for role in &party.roles {
                if !text.contains(role.label()) {
                    issues.push(DraftIssue::MissingRoleLabel {
                        party: party.name.clone(),
                        role: role.label().to_string(),
                    });
                }
            }
        }
        issues
    }

    pub fn check(&self, text: &str) -> Result<(), Vec<DraftIssue>> {
        let issues = self.issues(text);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
