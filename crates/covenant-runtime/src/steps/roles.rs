//! Party assignment: give every verified person one or more roles of the
//! chosen contract type.
//!
//! Roles are a closed set per contract type. Whatever the human types, or the
//! service suggests, goes through [`ContractRoleValidator`] before it lands
//! on a [`Party`].

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use covenant_core::validation::{parse_existing_file, parse_phone};
use covenant_core::{
    schema, Completeness, ContractRoleValidator, ContractType, Party, PiiRecord, Role,
    ValidationError,
};

use crate::config::SelectionMode;
use crate::generation::{GenerationTask, GenerativeService};
use crate::interaction::{
    ask_until_valid, confirm, render_menu, HumanInterface, InteractionError, RetryPolicy,
};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct RoleAssignmentResponse {
    assignments: Vec<RoleSuggestion>,
}

#[derive(Debug, Deserialize)]
struct RoleSuggestion {
    name: String,
    role: String,
}

/// Options for [`assign_roles`].
#[derive(Debug, Clone, Copy)]
pub struct AssignmentOptions {
    pub mode: SelectionMode,
    pub completeness: Completeness,
    pub policy: RetryPolicy,
}

/// Parse an answer to the role menu: numbers, labels, or a mix, separated
/// by commas or "and".
pub fn parse_role_answer(
    contract_type: ContractType,
    answer: &str,
) -> Result<BTreeSet<Role>, ValidationError> {
    let roles = contract_type.roles();
    let mut chosen = BTreeSet::new();
    for piece in answer
        .split([',', ';'])
        .flat_map(|p| p.split(" and "))
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let role = match piece.parse::<usize>() {
            Ok(n) if (1..=roles.len()).contains(&n) => roles[n - 1],
            Ok(_) => {
                return Err(ValidationError::InvalidChoice {
                    value: piece.to_string(),
                    max: roles.len(),
                })
            }
            Err(_) => ContractRoleValidator::validate_role(contract_type, piece)?,
        };
        chosen.insert(role);
    }
    if chosen.is_empty() {
        return Err(ValidationError::EmptyField {
            field: "role".to_string(),
        });
    }
    Ok(chosen)
}

async fn ask_roles(
    human: &dyn HumanInterface,
    contract_type: ContractType,
    person: &PiiRecord,
    policy: RetryPolicy,
) -> Result<BTreeSet<Role>, InteractionError> {
    human
        .say(&render_menu(
            &format!("Roles for a {} contract", contract_type.display_name()),
            contract_type.roles(),
        ))
        .await;
    let prompt = format!(
        "Role(s) of {} (number or name, several separated by commas)",
        person.display_name()
    );
    ask_until_valid(human, &prompt, policy, |answer| {
        let roles = parse_role_answer(contract_type, answer)?;
        ContractRoleValidator::validate_party(contract_type, &Party::new(person, roles.clone()))?;
        Ok(roles)
    })
    .await
}

/// Ask the service for a role per person. Suggestions outside the contract
/// type's roles are dropped; any failure yields no suggestions.
async fn suggest_roles(
    service: &GenerativeService,
    contract_type: ContractType,
    people: &[PiiRecord],
) -> BTreeMap<String, Role> {
    let response: RoleAssignmentResponse = match service
        .generate_structured(
            GenerationTask::RoleSuggestion,
            prompts::SYSTEM_PROMPT,
            &prompts::role_suggestion_prompt(contract_type, people),
            schema::role_assignment(contract_type.roles()),
        )
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Role suggestion failed, asking for every role");
            return BTreeMap::new();
        }
    };

    response
        .assignments
        .into_iter()
        .filter_map(|s| match ContractRoleValidator::validate_role(contract_type, &s.role) {
            Ok(role) => Some((s.name.trim().to_lowercase(), role)),
            Err(e) => {
                tracing::warn!(person = %s.name, error = %e, "Discarding role suggestion");
                None
            }
        })
        .collect()
}

/// Assign roles to every verified person.
///
/// In assisted mode each suggested role is confirmed or overridden by the
/// human. In strict completeness mode a phone number, and an identity
/// document when none is known, are collected per party.
pub async fn assign_roles(
    human: &dyn HumanInterface,
    service: &GenerativeService,
    contract_type: ContractType,
    people: &[PiiRecord],
    options: AssignmentOptions,
) -> Result<Vec<Party>, InteractionError> {
    let suggestions = match options.mode {
        SelectionMode::Assisted => suggest_roles(service, contract_type, people).await,
        SelectionMode::Menu => BTreeMap::new(),
    };

    let mut parties = Vec::with_capacity(people.len());
    for person in people {
        let accepted = match suggestions.get(&person.name.trim().to_lowercase()) {
            Some(&role) => {
                let question = format!("Assign {} as {}?", person.display_name(), role.label());
                confirm(human, &question, options.policy)
                    .await?
                    .then_some(role)
            }
            None => None,
        };
        let suggested = accepted.map(|role| Party::new(person, BTreeSet::from([role])));
        let mut party = match suggested {
            Some(party) => match ContractRoleValidator::validate_party(contract_type, &party) {
                Ok(()) => party,
                Err(e) => {
                    tracing::warn!(party = %party.name, error = %e, "Suggested assignment rejected");
                    human.say(&format!("Invalid assignment: {}", e)).await;
                    let roles = ask_roles(human, contract_type, person, options.policy).await?;
                    Party::new(person, roles)
                }
            },
            None => {
                let roles = ask_roles(human, contract_type, person, options.policy).await?;
                Party::new(person, roles)
            }
        };

        if options.completeness == Completeness::Strict {
            collect_contact_details(human, &mut party, options.policy).await?;
        }
        tracing::info!(party = %party.name, roles = %party.role_labels(), "Party assigned");
        parties.push(party);
    }

    let unassigned: Vec<&str> = contract_type
        .roles()
        .iter()
        .filter(|role| !parties.iter().any(|p| p.roles.contains(*role)))
        .map(Role::label)
        .collect();
    if !unassigned.is_empty() {
        human
            .say(&format!("Note: nobody holds the role(s) {}.", unassigned.join(", ")))
            .await;
    }
    Ok(parties)
}

async fn collect_contact_details(
    human: &dyn HumanInterface,
    party: &mut Party,
    policy: RetryPolicy,
) -> Result<(), InteractionError> {
    let phone = ask_until_valid(
        human,
        &format!("Phone number of {}", party.name),
        policy,
        parse_phone,
    )
    .await?;
    party.phone = Some(phone);

    if party.identity_document.is_none() {
        let path = ask_until_valid(
            human,
            &format!("Path to the identity document of {}", party.name),
            policy,
            parse_existing_file,
        )
        .await?;
        party.identity_document = Some(path);
    }
    Ok(())
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
    use proptest::prelude::*;
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

    fn people() -> Vec<PiiRecord> {
        vec![
            PiiRecord::new("Jane Doe", "12 Elm St"),
            PiiRecord::new("John Roe", "3 Oak Ave"),
        ]
    }

    fn menu_options() -> AssignmentOptions {
        AssignmentOptions {
            mode: SelectionMode::Menu,
            completeness: Completeness::Standard,
            policy: RetryPolicy::unbounded(),
        }
    }

    #[tokio::test]
    async fn test_menu_assignment_rejects_foreign_roles() {
        let human = ScriptedHuman::new(["Buyer", "owner", "tenant"]);
        let parties = assign_roles(
            &human,
            &service("{}"),
            ContractType::ShortTermRental,
            &people(),
            menu_options(),
        )
        .await
        .unwrap();

        assert_eq!(parties[0].roles, BTreeSet::from([Role::LandlordOwner]));
        assert_eq!(parties[1].roles, BTreeSet::from([Role::Tenant]));
        assert!(human
            .messages()
            .iter()
            .any(|m| m.contains("Invalid role 'Buyer'")));
    }

    #[tokio::test]
    async fn test_party_may_hold_several_roles() {
        let human = ScriptedHuman::new(["1, 2", "2"]);
        let parties = assign_roles(
            &human,
            &service("{}"),
            ContractType::BuySell,
            &people(),
            menu_options(),
        )
        .await
        .unwrap();
        assert_eq!(parties[0].role_labels(), "Buyer and Seller");
    }

    #[tokio::test]
    async fn test_assisted_suggestions_confirmed_or_overridden() {
        let human = ScriptedHuman::new(["yes", "no", "Client"]);
        let options = AssignmentOptions {
            mode: SelectionMode::Assisted,
            ..menu_options()
        };
        let parties = assign_roles(
            &human,
            &service(
                r#"{"assignments": [
                    {"name": "Jane Doe", "role": "Consultant"},
                    {"name": "John Roe", "role": "Consultant"}
                ]}"#,
            ),
            ContractType::ItConsulting,
            &people(),
            options,
        )
        .await
        .unwrap();

        assert_eq!(parties[0].roles, BTreeSet::from([Role::Consultant]));
        assert_eq!(parties[1].roles, BTreeSet::from([Role::Client]));
        assert_eq!(human.prompts()[0], "Assign Jane Doe as Consultant? (yes/no)");
    }

    #[tokio::test]
    async fn test_strict_mode_collects_contact_details() {
        let dir = tempfile::tempdir().unwrap();
        let id = dir.path().join("id.pdf");
        std::fs::write(&id, b"%PDF").unwrap();

        let people = vec![PiiRecord::new("Jane Doe", "12 Elm St").with_source(&id)];
        let human = ScriptedHuman::new([
            "1".to_string(),
            "not a phone".to_string(),
            "+40 721 234 567".to_string(),
        ]);
        let options = AssignmentOptions {
            completeness: Completeness::Strict,
            ..menu_options()
        };
        let parties = assign_roles(&human, &service("{}"), ContractType::BuySell, &people, options)
            .await
            .unwrap();

        assert_eq!(parties[0].phone.as_deref(), Some("+40 721 234 567"));
        assert_eq!(parties[0].identity_document, Some(id));
        assert_eq!(human.remaining_answers(), 0);
    }

    #[tokio::test]
    async fn test_invalid_party_is_never_assigned() {
        let people = vec![PiiRecord::new("  ", "3 Oak Ave")];
        let human = ScriptedHuman::new(["Buyer", "Seller", "Buyer"]);
        let options = AssignmentOptions {
            policy: RetryPolicy::bounded(2),
            ..menu_options()
        };

        let result =
            assign_roles(&human, &service("{}"), ContractType::BuySell, &people, options).await;
        match result {
            Err(InteractionError::AttemptsExhausted { attempts, last_error, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(
                    last_error,
                    ValidationError::EmptyField {
                        field: "party name".to_string()
                    }
                );
            }
            other => panic!("Expected AttemptsExhausted, got {:?}", other),
        }
        assert_eq!(human.remaining_answers(), 1);
    }

    proptest! {
        #[test]
        fn parsed_roles_belong_to_the_contract_type(answer in "[0-9a-zA-Z/ ,]{0,24}") {
            for kind in ContractType::ALL {
                if let Ok(roles) = parse_role_answer(kind, &answer) {
                    prop_assert!(!roles.is_empty());
                    prop_assert!(roles.iter().all(|r| kind.roles().contains(r)));
                }
            }
        }
    }
}
