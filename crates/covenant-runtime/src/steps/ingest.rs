//! Document ingestion: extract text and people from every document at once.
//!
//! Documents are processed concurrently and joined in input order, so the
//! people found keep the order of the documents they came from. A document
//! that fails is skipped and reported; it never stops the others.

use futures::future::join_all;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use covenant_core::{schema, DocumentFailure, FailureStage, PiiRecord, NOT_PROVIDED};

use crate::extraction::TextExtractor;
use crate::generation::{GenerationError, GenerationTask, GenerativeService};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct PiiExtractionResponse {
    records: Vec<ExtractedPerson>,
}

#[derive(Debug, Deserialize)]
struct ExtractedPerson {
    name: String,
    address: String,
}

/// Result of ingesting a set of documents.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// People found, in document order
    pub records: Vec<PiiRecord>,
    pub failures: Vec<DocumentFailure>,
    pub processed: usize,
}

enum DocumentOutcome {
    Extracted(Vec<PiiRecord>),
    Failed(DocumentFailure),
}

/// Ask the generative service for the people named in `text`.
///
/// Blank fields come back as "Not provided" so the human sees what is missing.
pub async fn extract_pii(
    service: &GenerativeService,
    text: &str,
) -> Result<Vec<PiiRecord>, GenerationError> {
    let response: PiiExtractionResponse = service
        .generate_structured(
            GenerationTask::PiiExtraction,
            prompts::SYSTEM_PROMPT,
            &prompts::pii_extraction_prompt(text),
            schema::pii_extraction(),
        )
        .await?;

    Ok(response
        .records
        .into_iter()
        .filter(|person| !(person.name.trim().is_empty() && person.address.trim().is_empty()))
        .map(|person| PiiRecord::new(or_not_provided(person.name), or_not_provided(person.address)))
        .collect())
}

fn or_not_provided(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        NOT_PROVIDED.to_string()
    } else {
        trimmed.to_string()
    }
}

async fn process_document(
    path: &Path,
    extractor: &dyn TextExtractor,
    service: &GenerativeService,
) -> DocumentOutcome {
    let text = match extractor.extract_text(path).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(document = %path.display(), error = %e, "Text extraction failed");
            return DocumentOutcome::Failed(DocumentFailure::new(
                path,
                FailureStage::TextExtraction,
                e.to_string(),
            ));
        }
    };

    match extract_pii(service, &text).await {
        Ok(records) => {
            tracing::info!(
                document = %path.display(),
                people = records.len(),
                "Extracted personal data"
            );
            DocumentOutcome::Extracted(
                records
                    .into_iter()
                    .map(|record| record.with_source(path))
                    .collect(),
            )
        }
        Err(e) => {
            tracing::warn!(document = %path.display(), error = %e, "PII extraction failed");
            DocumentOutcome::Failed(DocumentFailure::new(
                path,
                FailureStage::PiiExtraction,
                e.to_string(),
            ))
        }
    }
}

/// Extract text and people from every document concurrently.
pub async fn ingest_documents(
    documents: &[PathBuf],
    extractor: &dyn TextExtractor,
    service: &GenerativeService,
) -> IngestReport {
    let outcomes = join_all(
        documents
            .iter()
            .map(|path| process_document(path, extractor, service)),
    )
    .await;

    let mut report = IngestReport {
        processed: documents.len(),
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            DocumentOutcome::Extracted(records) => report.records.extend(records),
            DocumentOutcome::Failed(failure) => report.failures.push(failure),
        }
    }
    report
}
