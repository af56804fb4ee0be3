//! Contract construction: pre-fill the template deterministically, have the
//! service draft the final text, and accept it only if it passes
//! [`DraftChecker`].

use chrono::Local;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use covenant_core::draft::TO_BE_DETERMINED;
use covenant_core::roles::{CONTRACT_ADDRESS_KEY, OBJECT_DESCRIPTION_KEY};
use covenant_core::template::{ADDITIONAL_INFO, ADDRESS, DATE, PARTIES_INFO};
use covenant_core::validation::DATE_FORMAT;
use covenant_core::{
    schema, ContractRoleValidator, ContractType, DraftChecker, DraftIssue, DraftedContract, Party,
    Template, ValidationError,
};

use crate::generation::{GenerationError, GenerationTask, GenerativeService};
use crate::prompts::{self, DraftingContext};
use crate::resilience::FallbackStrategy;

/// Placeholder replaced with the contract type's display name.
pub const CONTRACT_TYPE: &str = "contract_type";

/// Errors from contract construction. Any of them ends the workflow
/// without a contract.
#[derive(Error, Debug, Clone)]
pub enum ConstructionError {
    #[error("No parties to put in the contract")]
    NoParties,

    #[error("Contract details are invalid: {0}")]
    InvalidDetails(#[from] ValidationError),

    #[error("Drafting failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Draft rejected: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    DraftRejected(Vec<DraftIssue>),
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    contract_text: String,
}

/// Everything a contract is built from.
#[derive(Debug, Clone, Copy)]
pub struct ConstructionRequest<'a> {
    pub contract_type: ContractType,
    pub template: &'a Template,
    pub parties: &'a [Party],
    pub address: &'a str,
    pub additional_info: &'a BTreeMap<String, String>,
}

/// Address where the contract is concluded: the one the human gave, or the
/// first party's address.
pub fn resolve_contract_address(
    additional_info: &BTreeMap<String, String>,
    parties: &[Party],
) -> String {
    additional_info
        .get(CONTRACT_ADDRESS_KEY)
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .or_else(|| parties.first().map(|p| p.address.as_str()))
        .unwrap_or_default()
        .to_string()
}

/// One line per party: name, address, exact role labels, phone when known.
pub fn format_parties(parties: &[Party]) -> String {
    parties
        .iter()
        .map(|party| {
            let mut line = format!(
                "{}, residing at {}, as {}",
                party.name,
                party.address,
                party.role_labels()
            );
            if let Some(phone) = &party.phone {
                line.push_str(&format!(", phone {}", phone));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One `Label: value` line per detail, in the order the type defines them.
pub fn format_additional_info(
    contract_type: ContractType,
    additional_info: &BTreeMap<String, String>,
) -> String {
    contract_type
        .additional_fields()
        .iter()
        .filter(|field| field.key != CONTRACT_ADDRESS_KEY && field.key != OBJECT_DESCRIPTION_KEY)
        .filter_map(|field| {
            additional_info
                .get(field.key)
                .map(|value| format!("{}: {}", humanize(field.key), value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn humanize(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Substitute every placeholder of the template.
///
/// Placeholders with no value become `[To be determined]`, so the result
/// never carries a raw `{token}`.
pub fn prefill(request: &ConstructionRequest<'_>) -> String {
    let mut values: BTreeMap<String, String> = request.additional_info.clone();
    values.insert(PARTIES_INFO.to_string(), format_parties(request.parties));
    values.insert(ADDRESS.to_string(), request.address.to_string());
    values.insert(
        ADDITIONAL_INFO.to_string(),
        format_additional_info(request.contract_type, request.additional_info),
    );
    values.insert(DATE.to_string(), Local::now().format(DATE_FORMAT).to_string());
    values.insert(
        CONTRACT_TYPE.to_string(),
        request.contract_type.display_name().to_string(),
    );

    for placeholder in request.template.placeholders() {
        let blank = values.get(&placeholder).map_or(true, |v| v.trim().is_empty());
        if blank {
            values.insert(placeholder, TO_BE_DETERMINED.to_string());
        }
    }
    request.template.render(&values)
}

/// Checks against the parties, with the contract details as verified facts.
fn draft_checker<'a>(request: &ConstructionRequest<'a>) -> DraftChecker<'a> {
    DraftChecker::new(request.parties).with_facts(request.additional_info.values())
}

async fn draft_with_service(
    service: &GenerativeService,
    request: &ConstructionRequest<'_>,
    prefilled: &str,
) -> Result<String, ConstructionError> {
    let parties_info = format_parties(request.parties);
    let additional_info = format_additional_info(request.contract_type, request.additional_info);
    let object_description = request
        .additional_info
        .get(OBJECT_DESCRIPTION_KEY)
        .map(String::as_str)
        .unwrap_or_default();

    let prompt = prompts::contract_construction_prompt(&DraftingContext {
        contract_type: request.contract_type,
        template: prefilled,
        parties_info: &parties_info,
        address: request.address,
        additional_info: &additional_info,
        object_description,
    });

    let response: DraftResponse = service
        .generate_structured(
            GenerationTask::ContractDrafting,
            prompts::SYSTEM_PROMPT,
            &prompt,
            schema::contract_draft(),
        )
        .await?;

    let text = response.contract_text.trim().to_string();
    draft_checker(request)
        .check(&text)
        .map_err(ConstructionError::DraftRejected)?;
    Ok(text)
}

/// Build the contract.
///
/// With [`FallbackStrategy::Deterministic`], a failed or rejected draft is
/// replaced by the pre-filled template when that passes the same checks.
pub async fn construct(
    service: &GenerativeService,
    request: &ConstructionRequest<'_>,
    fallback: FallbackStrategy,
) -> Result<DraftedContract, ConstructionError> {
    if request.parties.is_empty() {
        return Err(ConstructionError::NoParties);
    }
    ContractRoleValidator::validate_additional_info(request.contract_type, request.additional_info)?;

    let prefilled = prefill(request);
    match draft_with_service(service, request, &prefilled).await {
        Ok(text) => {
            tracing::info!(
                contract_type = %request.contract_type,
                chars = text.len(),
                "Contract drafted"
            );
            Ok(DraftedContract::new(request.contract_type, text))
        }
        Err(e) if fallback == FallbackStrategy::Deterministic => {
            tracing::warn!(error = %e, "Drafting failed, trying the pre-filled template");
            match draft_checker(request).check(&prefilled) {
                Ok(()) => Ok(DraftedContract::new(request.contract_type, prefilled)),
                Err(issues) => {
                    tracing::warn!(issues = issues.len(), "Pre-filled template rejected too");
                    Err(e)
                }
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    };
    use async_trait::async_trait;
    use covenant_core::{PiiRecord, Role};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const TEMPLATE: &str = "#title: Rental\n\nRENTAL AGREEMENT ({contract_type})\n\
        Between:\n{parties_info}\nConcluded at {address} on {date}.\n\
        Property: {object_description}\nTerms:\n{additional_info}\nDeposit: {deposit}\n";

    /// Returns a fixed draft and remembers the last prompt.
    struct DraftProvider {
        content: String,
        last_prompt: Mutex<String>,
    }

    #[async_trait]
    impl LlmProvider for DraftProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            *self.last_prompt.lock() = messages[1].content.clone();
            Ok(CompletionResponse {
                content: serde_json::json!({ "contract_text": self.content }).to_string(),
                usage: TokenUsage::default(),
                model: "test".to_string(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "draft"
        }
    }

    fn provider(content: &str) -> Arc<DraftProvider> {
        Arc::new(DraftProvider {
            content: content.to_string(),
            last_prompt: Mutex::new(String::new()),
        })
    }

    fn parties() -> Vec<Party> {
        vec![
            Party::new(
                &PiiRecord::new("Jane Doe", "12 Elm St"),
                BTreeSet::from([Role::LandlordOwner]),
            ),
            Party::new(
                &PiiRecord::new("John Roe", "3 Oak Ave"),
                BTreeSet::from([Role::Tenant]),
            ),
        ]
    }

    fn details() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("object_description".to_string(), "Flat 2, Str. Mica 4".to_string()),
            ("rate".to_string(), "120".to_string()),
            ("start_date".to_string(), "10/07/2025".to_string()),
            ("end_date".to_string(), "12/07/2025".to_string()),
        ])
    }

    #[test]
    fn test_contract_address_defaults_to_first_party() {
        let mut info = details();
        assert_eq!(resolve_contract_address(&info, &parties()), "12 Elm St");
        info.insert(CONTRACT_ADDRESS_KEY.to_string(), "  Bd. Unirii 1 ".to_string());
        assert_eq!(resolve_contract_address(&info, &parties()), "Bd. Unirii 1");
        info.insert(CONTRACT_ADDRESS_KEY.to_string(), "   ".to_string());
        assert_eq!(resolve_contract_address(&info, &parties()), "12 Elm St");
    }

    #[test]
    fn test_prefill_resolves_every_placeholder() {
        let template = Template::parse("short-term-rental", TEMPLATE);
        let parties = parties();
        let info = details();
        let request = ConstructionRequest {
            contract_type: ContractType::ShortTermRental,
            template: &template,
            parties: &parties,
            address: "12 Elm St",
            additional_info: &info,
        };
        let text = prefill(&request);

        assert!(text.contains("Jane Doe, residing at 12 Elm St, as Landlord/Owner"));
        assert!(text.contains("Rate: 120"));
        assert!(text.contains("Property: Flat 2, Str. Mica 4"));
        assert!(text.contains("Deposit: [To be determined]"));
        assert!(text.contains("(Short-term rental)"));
        assert!(covenant_core::template::find_placeholders(&text).is_empty());
        assert!(DraftChecker::new(&parties).check(&text).is_ok());
    }

    #[tokio::test]
    async fn test_valid_draft_is_accepted() {
        let template = Template::parse("short-term-rental", TEMPLATE);
        let parties = parties();
        let info = details();
        let request = ConstructionRequest {
            contract_type: ContractType::ShortTermRental,
            template: &template,
            parties: &parties,
            address: "12 Elm St",
            additional_info: &info,
        };
        let provider = provider(
            "Jane Doe, the Landlord/Owner, rents Flat 2 to John Roe, the Tenant, \
             from 10/07/2025 to 12/07/2025 at a nightly rate of 120.",
        );
        let service = GenerativeService::new(provider.clone(), &RuntimeConfig::default());

        let draft = construct(&service, &request, FallbackStrategy::Fail).await.unwrap();
        assert_eq!(draft.contract_type, ContractType::ShortTermRental);
        assert!(draft.text.starts_with("Jane Doe"));

        let prompt = provider.last_prompt.lock().clone();
        assert!(prompt.contains("Deposit: [To be determined]"));
        assert!(prompt.contains("## Object Description\nFlat 2, Str. Mica 4"));
    }

    #[tokio::test]
    async fn test_draft_with_wrong_role_label_is_rejected() {
        let template = Template::parse("short-term-rental", TEMPLATE);
        let parties = parties();
        let info = details();
        let request = ConstructionRequest {
            contract_type: ContractType::ShortTermRental,
            template: &template,
            parties: &parties,
            address: "12 Elm St",
            additional_info: &info,
        };
        let service = GenerativeService::new(
            provider("Jane Doe, the Host, rents to John Roe, the Guest, at [ADDRESS]."),
            &RuntimeConfig::default(),
        );

        match construct(&service, &request, FallbackStrategy::Fail).await {
            Err(ConstructionError::DraftRejected(issues)) => {
                assert!(issues.contains(&DraftIssue::BracketArtifact("[ADDRESS]".to_string())));
                assert!(issues.iter().any(|i| matches!(i, DraftIssue::MissingRoleLabel { .. })));
            }
            other => panic!("Expected DraftRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deterministic_fallback_uses_prefilled_template() {
        let template = Template::parse("short-term-rental", TEMPLATE);
        let parties = parties();
        let info = details();
        let request = ConstructionRequest {
            contract_type: ContractType::ShortTermRental,
            template: &template,
            parties: &parties,
            address: "12 Elm St",
            additional_info: &info,
        };
        let service = GenerativeService::new(provider("Host and Guest"), &RuntimeConfig::default());

        let draft = construct(&service, &request, FallbackStrategy::Deterministic)
            .await
            .unwrap();
        assert!(draft.text.starts_with("RENTAL AGREEMENT"));
    }

    #[tokio::test]
    async fn test_bracketed_facts_survive_the_fallback() {
        let template = Template::parse("short-term-rental", TEMPLATE);
        let parties = vec![
            Party::new(
                &PiiRecord::new("Jane Doe", "Apt [3B], 12 Elm St"),
                BTreeSet::from([Role::LandlordOwner]),
            ),
            Party::new(
                &PiiRecord::new("John Roe", "3 Oak Ave"),
                BTreeSet::from([Role::Tenant]),
            ),
        ];
        let mut info = details();
        info.insert("object_description".to_string(), "Studio [top floor]".to_string());
        let request = ConstructionRequest {
            contract_type: ContractType::ShortTermRental,
            template: &template,
            parties: &parties,
            address: "Apt [3B], 12 Elm St",
            additional_info: &info,
        };
        let service = GenerativeService::new(provider("Host and Guest"), &RuntimeConfig::default());

        let draft = construct(&service, &request, FallbackStrategy::Deterministic)
            .await
            .unwrap();
        assert!(draft.text.contains("Concluded at Apt [3B], 12 Elm St"));
        assert!(draft.text.contains("Property: Studio [top floor]"));
    }

    #[tokio::test]
    async fn test_incomplete_details_are_refused() {
        let template = Template::parse("short-term-rental", TEMPLATE);
        let parties = parties();
        let mut info = details();
        info.insert("end_date".to_string(), "01/07/2025".to_string());
        let request = ConstructionRequest {
            contract_type: ContractType::ShortTermRental,
            template: &template,
            parties: &parties,
            address: "12 Elm St",
            additional_info: &info,
        };
        let service = GenerativeService::new(provider("unused"), &RuntimeConfig::default());
        assert!(matches!(
            construct(&service, &request, FallbackStrategy::Deterministic).await,
            Err(ConstructionError::InvalidDetails(ValidationError::DateOrder { .. }))
        ));
    }

    #[tokio::test]
    async fn test_no_parties_is_an_error() {
        let template = Template::parse("buy-sell", "{parties_info}");
        let info = BTreeMap::new();
        let request = ConstructionRequest {
            contract_type: ContractType::BuySell,
            template: &template,
            parties: &[],
            address: "",
            additional_info: &info,
        };
        let service = GenerativeService::new(provider("unused"), &RuntimeConfig::default());
        assert!(matches!(
            construct(&service, &request, FallbackStrategy::Deterministic).await,
            Err(ConstructionError::NoParties)
        ));
    }
}
