//! Contract type resolution and collection of the type's additional details.

use serde::Deserialize;
use std::collections::BTreeMap;

use covenant_core::validation::parse_date;
use covenant_core::{
    schema, AdditionalField, ContractRoleValidator, ContractType, ContractTypeSelection,
    FieldKind, TemplateStore, ValidationError,
};

use crate::config::SelectionMode;
use crate::generation::{GenerationTask, GenerativeService};
use crate::interaction::{
    ask, ask_until_valid, confirm, parse_menu_choice, render_menu, HumanInterface,
    InteractionError, RetryPolicy,
};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct ContractTypeChoice {
    contract_type: String,
    reason: String,
}

/// Map a template key to its contract type, or explain why it has none.
fn contract_type_for(key: &str) -> Result<ContractType, ValidationError> {
    ContractType::for_template_key(key).ok_or_else(|| ValidationError::InvalidContractType {
        value: key.to_string(),
        allowed: ContractType::ALL
            .iter()
            .map(ContractType::key)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Let the human pick a template from a numbered menu.
///
/// A template whose key maps to no known contract type is refused with a
/// validation message and the menu is asked again.
pub async fn choose_from_templates(
    human: &dyn HumanInterface,
    candidates: &[String],
    policy: RetryPolicy,
) -> Result<(String, ContractType), InteractionError> {
    human
        .say(&render_menu("Available contract templates", candidates))
        .await;
    let prompt = format!("Choose a contract type (1-{})", candidates.len());
    ask_until_valid(human, &prompt, policy, |answer| {
        let index = parse_menu_choice(answer, candidates.len())?;
        let key = &candidates[index];
        contract_type_for(key).map(|kind| (key.clone(), kind))
    })
    .await
}

/// Ask the service to pick a template from the human's description, then
/// have the human confirm. Returns `None` when the suggestion is unusable
/// or declined.
async fn suggest_template(
    human: &dyn HumanInterface,
    service: &GenerativeService,
    candidates: &[String],
    policy: RetryPolicy,
) -> Result<Option<(String, ContractType)>, InteractionError> {
    let description = ask(human, "Describe the contract you need").await?;
    if description.is_empty() {
        return Ok(None);
    }

    let choice: ContractTypeChoice = match service
        .generate_structured(
            GenerationTask::ContractType,
            prompts::SYSTEM_PROMPT,
            &prompts::contract_type_prompt(&description, candidates),
            schema::contract_type_choice(candidates),
        )
        .await
    {
        Ok(choice) => choice,
        Err(e) => {
            tracing::warn!(error = %e, "Contract type suggestion failed, using the menu");
            human
                .say("Could not suggest a contract type. Please choose from the list.")
                .await;
            return Ok(None);
        }
    };

    let kind = match contract_type_for(&choice.contract_type) {
        Ok(kind) if candidates.contains(&choice.contract_type) => kind,
        _ => {
            tracing::warn!(suggested = %choice.contract_type, "Suggested template is not available");
            return Ok(None);
        }
    };

    let question = format!(
        "Suggested template: {} ({}). Use it?",
        choice.contract_type, choice.reason
    );
    if confirm(human, &question, policy).await? {
        Ok(Some((choice.contract_type, kind)))
    } else {
        Ok(None)
    }
}

/// Resolve the contract type among the template keys in `templates`.
///
/// In assisted mode the service suggests a template and the human confirms;
/// a failed or declined suggestion falls back to the menu.
pub async fn resolve_contract_type(
    human: &dyn HumanInterface,
    service: &GenerativeService,
    templates: &TemplateStore,
    mode: SelectionMode,
    policy: RetryPolicy,
) -> Result<ContractTypeSelection, InteractionError> {
    let candidates = templates.keys();

    let suggested = match mode {
        SelectionMode::Assisted => suggest_template(human, service, &candidates, policy).await?,
        SelectionMode::Menu => None,
    };
    let (template_key, contract_type) = match suggested {
        Some(choice) => choice,
        None => choose_from_templates(human, &candidates, policy).await?,
    };

    tracing::info!(
        template = %template_key,
        contract_type = %contract_type,
        "Contract type selected"
    );
    human
        .say(&format!("Contract type: {}", contract_type.display_name()))
        .await;

    let mut selection = ContractTypeSelection::new(contract_type, template_key);
    selection.additional_info = collect_additional_info(human, contract_type, policy).await?;
    Ok(selection)
}

/// Date field that must not precede another already collected.
fn earlier_date_key(key: &str) -> Option<&'static str> {
    match key {
        "final_date" => Some("advance_date"),
        "end_date" => Some("start_date"),
        _ => None,
    }
}

fn field_prompt(field: &AdditionalField) -> String {
    let hint = match field.kind {
        FieldKind::Amount => " (number)",
        FieldKind::Date | FieldKind::Text => "",
    };
    let optional = if field.required { "" } else { " [optional]" };
    format!("{}{}{}", field.prompt, hint, optional)
}

/// Ask every additional field of `contract_type`, validating each answer.
pub async fn collect_additional_info(
    human: &dyn HumanInterface,
    contract_type: ContractType,
    policy: RetryPolicy,
) -> Result<BTreeMap<String, String>, InteractionError> {
    let mut details: BTreeMap<String, String> = BTreeMap::new();

    for field in contract_type.additional_fields() {
        let prompt = field_prompt(field);
        let earlier = earlier_date_key(field.key).and_then(|key| details.get(key).cloned());
        let value = ask_until_valid(human, &prompt, policy, |answer| {
            let value = ContractRoleValidator::validate_field(field, answer)?;
            if let Some(earlier) = &earlier {
                if !value.is_empty() && parse_date(&value)? < parse_date(earlier)? {
                    return Err(ValidationError::DateOrder {
                        earlier: earlier.clone(),
                        later: value,
                    });
                }
            }
            Ok(value)
        })
        .await?;

        if !value.is_empty() {
            details.insert(field.key.to_string(), value);
        }
    }
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::interaction::ScriptedHuman;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    };
    use async_trait::async_trait;
    use covenant_core::Template;
    use std::sync::Arc;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                usage: TokenUsage::default(),
                model: "test".to_string(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn service(content: &'static str) -> GenerativeService {
        GenerativeService::new(Arc::new(FixedProvider(content)), &RuntimeConfig::default())
    }

    fn store(keys: &[&str]) -> TemplateStore {
        TemplateStore::from_templates(
            keys.iter()
                .map(|key| Template::parse(*key, "CONTRACT {parties_info}")),
        )
    }

    const CONSULTING_ANSWERS: [&str; 4] = ["Build a billing system", "85", "01/02/2025", ""];

    #[tokio::test]
    async fn test_menu_selection_collects_details() {
        let templates = store(&["buy-sell", "it-consulting"]);
        let mut answers = vec!["2"];
        answers.extend(CONSULTING_ANSWERS);
        let human = ScriptedHuman::new(answers);

        let selection = resolve_contract_type(
            &human,
            &service("{}"),
            &templates,
            SelectionMode::Menu,
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();

        assert_eq!(selection.contract_type, ContractType::ItConsulting);
        assert_eq!(selection.template_key, "it-consulting");
        assert_eq!(selection.additional_info["rate"], "85");
        assert!(!selection.additional_info.contains_key("contract_address"));
    }

    #[tokio::test]
    async fn test_unknown_template_key_is_refused() {
        let templates = store(&["buy-sell", "lease-to-own"]);
        let human = ScriptedHuman::new(["2", "1"]);

        let (key, kind) = choose_from_templates(&human, &templates.keys(), RetryPolicy::unbounded())
            .await
            .unwrap();
        assert_eq!(key, "buy-sell");
        assert_eq!(kind, ContractType::BuySell);
        assert!(human
            .messages()
            .iter()
            .any(|m| m.contains("Invalid contract type 'lease-to-own'")));
    }

    #[tokio::test]
    async fn test_assisted_selection_confirmed() {
        let templates = store(&["buy-sell", "it-consulting"]);
        let mut answers = vec!["I need a developer for three months", "yes"];
        answers.extend(CONSULTING_ANSWERS);
        let human = ScriptedHuman::new(answers);

        let selection = resolve_contract_type(
            &human,
            &service(r#"{"contract_type": "it-consulting", "reason": "software work"}"#),
            &templates,
            SelectionMode::Assisted,
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();
        assert_eq!(selection.contract_type, ContractType::ItConsulting);
        assert!(human.prompts()[1].starts_with("Suggested template: it-consulting (software work)"));
    }

    #[tokio::test]
    async fn test_assisted_failure_falls_back_to_menu() {
        let templates = store(&["buy-sell", "it-consulting"]);
        let mut answers = vec!["anything", "2"];
        answers.extend(CONSULTING_ANSWERS);
        let human = ScriptedHuman::new(answers);

        let selection = resolve_contract_type(
            &human,
            &service("no json here"),
            &templates,
            SelectionMode::Assisted,
            RetryPolicy::unbounded(),
        )
        .await
        .unwrap();
        assert_eq!(selection.contract_type, ContractType::ItConsulting);
    }

    #[tokio::test]
    async fn test_date_order_is_enforced() {
        let human = ScriptedHuman::new([
            "Flat 2",
            "120",
            "10/07/2025",
            "01/07/2025",
            "12/07/2025",
            "",
        ]);
        let details =
            collect_additional_info(&human, ContractType::ShortTermRental, RetryPolicy::unbounded())
                .await
                .unwrap();

        assert_eq!(details["end_date"], "12/07/2025");
        assert!(human
            .messages()
            .iter()
            .any(|m| m.contains("must not be before")));
    }
}
