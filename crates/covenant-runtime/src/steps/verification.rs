//! Human verification of extracted people, and collection of people the
//! documents did not provide.

use std::path::PathBuf;

use covenant_core::validation::{
    parse_address, parse_existing_file, parse_person_name, title_case,
};
use covenant_core::{PiiRecord, ValidationError, NOT_PROVIDED};

use crate::interaction::{ask_until_valid, HumanInterface, InteractionError, RetryPolicy};

/// What the human decided for one extracted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Correct,
    Skip,
}

fn parse_decision(answer: &str) -> Result<Decision, ValidationError> {
    match answer.trim().to_lowercase().as_str() {
        "a" | "accept" | "y" | "yes" => Ok(Decision::Accept),
        "c" | "correct" | "edit" => Ok(Decision::Correct),
        "s" | "skip" | "reject" => Ok(Decision::Skip),
        other => Err(ValidationError::InvalidChoice {
            value: other.to_string(),
            max: 3,
        }),
    }
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_PROVIDED)
}

/// Ask for a replacement value. An empty answer keeps a usable current value,
/// which must still pass `parse`.
async fn correct_field(
    human: &dyn HumanInterface,
    field: &str,
    current: &str,
    parse: fn(&str) -> Result<String, ValidationError>,
    policy: RetryPolicy,
) -> Result<String, InteractionError> {
    let keep = (!is_placeholder(current)).then(|| current.trim().to_string());
    let prompt = match &keep {
        Some(value) => format!("{} [{}]", capitalize(field), value),
        None => capitalize(field),
    };
    ask_until_valid(human, &prompt, policy, |answer| {
        match (answer.trim().is_empty(), &keep) {
            (true, Some(value)) => parse(value),
            _ if is_placeholder(answer) => Err(ValidationError::EmptyField {
                field: field.to_string(),
            }),
            _ => parse(answer),
        }
    })
    .await
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Show each record and let the human accept, correct, or skip it.
///
/// Incomplete records, and records whose name or address is too short,
/// cannot be accepted as they are. Accepted names are title-cased. Returns the
/// verified records in input order; skipped records are dropped.
pub async fn verify_records(
    human: &dyn HumanInterface,
    records: Vec<PiiRecord>,
    policy: RetryPolicy,
) -> Result<Vec<PiiRecord>, InteractionError> {
    let total = records.len();
    let mut verified = Vec::with_capacity(total);

    for (i, mut record) in records.into_iter().enumerate() {
        let source = record
            .source_document
            .as_ref()
            .map(|p| format!(" (from {})", p.display()))
            .unwrap_or_default();
        human
            .say(&format!("Person {} of {}{}: {}", i + 1, total, source, record))
            .await;

        let missing = record.missing_fields();
        let acceptable = if missing.is_empty() {
            record.validate()
        } else {
            Err(ValidationError::MissingField(missing.join(", ")))
        };
        match &acceptable {
            Ok(()) => {}
            Err(ValidationError::MissingField(fields)) => {
                human
                    .say(&format!("Missing: {}. Correct or skip this record.", fields))
                    .await;
            }
            Err(e) => {
                human.say(&format!("{}. Correct or skip this record.", e)).await;
            }
        }

        let decision = ask_until_valid(
            human,
            "Accept, correct, or skip? (a/c/s)",
            policy,
            |answer| match parse_decision(answer)? {
                Decision::Accept => acceptable.clone().map(|()| Decision::Accept),
                decision => Ok(decision),
            },
        )
        .await?;

        match decision {
            Decision::Accept => {
                record.name = title_case(record.name.trim());
                record.address = record.address.trim().to_string();
                tracing::debug!(person = record.display_name(), "Record accepted");
                verified.push(record);
            }
            Decision::Correct => {
                record.name =
                    correct_field(human, "name", &record.name, parse_person_name, policy).await?;
                record.address =
                    correct_field(human, "address", &record.address, parse_address, policy).await?;
                human.say(&format!("Recorded: {}", record)).await;
                verified.push(record);
            }
            Decision::Skip => {
                tracing::info!(person = record.display_name(), "Record skipped by user");
                human.say(&format!("Skipped {}.", record.display_name())).await;
            }
        }
    }
    Ok(verified)
}

/// Ask for a person the documents did not provide.
///
/// When `identity_document_required` is set, the human must also give the
/// path of an existing identity document.
pub async fn collect_missing_person(
    human: &dyn HumanInterface,
    verified_count: usize,
    min_parties: usize,
    identity_document_required: bool,
    policy: RetryPolicy,
) -> Result<PiiRecord, InteractionError> {
    human
        .say(&format!(
            "{} verified {} found, at least {} needed. Enter the details of another person.",
            verified_count,
            if verified_count == 1 { "person" } else { "people" },
            min_parties
        ))
        .await;

    let name = correct_field(human, "name", "", parse_person_name, policy).await?;
    let address = correct_field(human, "address", "", parse_address, policy).await?;
    let mut record = PiiRecord::new(name, address);

    if identity_document_required {
        let path: PathBuf = ask_until_valid(
            human,
            "Path to the identity document",
            policy,
            parse_existing_file,
        )
        .await?;
        record = record.with_source(path);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::ScriptedHuman;

    fn records() -> Vec<PiiRecord> {
        vec![
            PiiRecord::new("Jane Doe", "12 Elm St").with_source("id_jane.pdf"),
            PiiRecord::new("John Roe", NOT_PROVIDED),
            PiiRecord::new("Spam Person", "Nowhere 1"),
        ]
    }

    #[tokio::test]
    async fn test_accept_correct_skip() {
        let human = ScriptedHuman::new(["a", "c", "", "3 Oak Ave", "s"]);
        let verified = verify_records(&human, records(), RetryPolicy::unbounded())
            .await
            .unwrap();

        assert_eq!(verified.len(), 2);
        assert_eq!(verified[0].name, "Jane Doe");
        assert_eq!(verified[1].name, "John Roe");
        assert_eq!(verified[1].address, "3 Oak Ave");
        assert!(human.messages()[0].contains("(from id_jane.pdf)"));
    }

    #[tokio::test]
    async fn test_incomplete_record_cannot_be_accepted() {
        let human = ScriptedHuman::new(["a", "c", "", "3 Oak Ave"]);
        let verified = verify_records(
            &human,
            vec![PiiRecord::new("John Roe", NOT_PROVIDED)],
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();

        assert_eq!(verified[0].address, "3 Oak Ave");
        assert!(human
            .messages()
            .iter()
            .any(|m| m.contains("Missing required field: address")));
    }

    #[tokio::test]
    async fn test_blank_corrections_reprompt() {
        let human = ScriptedHuman::new(["c", "", "   ", "Not provided", "Str. Mica 4"]);
        let verified = verify_records(
            &human,
            vec![PiiRecord::new("Maria Ionescu", "")],
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();

        assert_eq!(verified[0].address, "Str. Mica 4");
        let prompts = human.prompts();
        assert_eq!(prompts[1], "Name [Maria Ionescu]");
        assert_eq!(&prompts[2..], ["Address", "Address", "Address"]);
    }

    #[tokio::test]
    async fn test_short_name_must_be_corrected() {
        let human = ScriptedHuman::new(["a", "c", "", "IO", "ion popescu", ""]);
        let verified = verify_records(
            &human,
            vec![PiiRecord::new("Io", "Str. Lunga 12")],
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();

        assert_eq!(verified[0].name, "Ion Popescu");
        assert_eq!(verified[0].address, "Str. Lunga 12");
        let messages = human.messages();
        assert!(messages[1].starts_with("name must contain at least 3 characters"));
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.contains("name must contain at least 3 characters"))
                .count(),
            4
        );
        assert_eq!(human.prompts()[2], "Name [Io]");
    }

    #[tokio::test]
    async fn test_accepted_name_is_title_cased() {
        let human = ScriptedHuman::new(["a"]);
        let verified = verify_records(
            &human,
            vec![PiiRecord::new(" JANE DOE ", "12 Elm St ")],
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();

        assert_eq!(verified[0].name, "Jane Doe");
        assert_eq!(verified[0].address, "12 Elm St");
    }

    #[tokio::test]
    async fn test_short_address_is_refused() {
        let human = ScriptedHuman::new(["Ana Pop", "Nr 4", "Bd. Unirii 1"]);
        let record = collect_missing_person(&human, 1, 2, false, RetryPolicy::unbounded())
            .await
            .unwrap();

        assert_eq!(record.address, "Bd. Unirii 1");
        assert_eq!(&human.prompts()[1..], ["Address", "Address"]);
    }

    #[tokio::test]
    async fn test_collect_missing_person_with_identity_document() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("passport.png");
        std::fs::write(&doc, b"png").unwrap();
        let missing = dir.path().join("missing.png");

        let human = ScriptedHuman::new([
            "Ana Pop".to_string(),
            "Bd. Unirii 1".to_string(),
            missing.display().to_string(),
            doc.display().to_string(),
        ]);
        let record = collect_missing_person(&human, 1, 2, true, RetryPolicy::unbounded())
            .await
            .unwrap();

        assert_eq!(record.name, "Ana Pop");
        assert_eq!(record.source_document, Some(doc));
        assert!(human.messages()[0].starts_with("1 verified person found, at least 2 needed"));
    }

    #[test]
    fn test_parse_decision() {
        assert_eq!(parse_decision("A"), Ok(Decision::Accept));
        assert_eq!(parse_decision("correct"), Ok(Decision::Correct));
        assert_eq!(parse_decision("s"), Ok(Decision::Skip));
        assert!(parse_decision("maybe").is_err());
    }
}
