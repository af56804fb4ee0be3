//! Prompts for the generative service.
//!
//! The system prompt is shared by every call so providers can cache it.
//! Task prompts carry the dynamic content: document text, verified people,
//! the pre-filled template.
//!
//! Every task prompt asks for a JSON object matching the schema sent with the
//! request. The runtime validates the response; prompts only steer.

use covenant_core::{ContractType, NextAction, PiiRecord, Role, NOT_PROVIDED};

/// System prompt shared across all generative calls.
pub const SYSTEM_PROMPT: &str = r#"
You assist a human operator who drafts legal contracts from identity documents and templates.

You never decide anything on your own:
- Personal data you extract is checked by the human before it is used.
- Contract types and roles you suggest are confirmed by the human.
- Contract text you produce is checked against the verified data.

## Ground Rules
1. Use only the information you are given. Do not invent names, addresses, amounts or dates.
2. When information is missing, say so in the field reserved for it instead of guessing.
3. Answer with a single JSON object that matches the requested schema. No prose around it.

## Contract Types and Their Roles
- Buy-sell: Buyer, Seller
- Short-term rental: Landlord/Owner (the property owner), Tenant (the guest)
- IT consulting: Consultant, Client
Use these role names exactly as written.
"#;

/// Instructions for extracting people from one document.
pub const PII_EXTRACTION_PROMPT: &str = r#"
## Task: Extract People

Extract every person named in the document below, with their full name and complete address.

Rules:
- Combine first and last name into a single "name" field, as printed.
- The address includes street, number, building, apartment, district or county, and city.
- Ignore identification numbers, personal codes, ID series, postal codes and machine-readable zones.
- Ignore nationality, birth date and every other attribute.
- If no address is printed, use "Not provided" for the address.
- If the document names nobody, return an empty "records" list.

Examples:
1. "ID CARD, Last Name SMITH, First Name JOHN, SSN 123456789, Series XX no 123456"
   -> {"name": "SMITH JOHN", "address": "Not provided"}
2. "ID CARD, Last Name JONES, First Name MARY, Address Main St. 10, Block A, Apt. 5, London, Code 900B"
   -> {"name": "JONES MARY", "address": "Main St. 10, Block A, Apt. 5, London"}
"#;

/// Instructions for choosing a template from the human's description.
pub const CONTRACT_TYPE_PROMPT: &str = r#"
## Task: Choose a Contract Template

The operator described the contract they need. Choose the one template key from the
list that fits the description best, and give a one-sentence reason.
You must choose one of the listed keys, spelled exactly as listed.
"#;

/// Instructions for suggesting a role per person.
pub const ROLE_SUGGESTION_PROMPT: &str = r#"
## Task: Suggest Roles

Suggest the role each person plays in the contract. The operator confirms or overrides
every suggestion.

Rules:
- Suggest exactly one role per person, chosen from the allowed roles.
- Repeat each person's name exactly as given.
- If nothing indicates a role, still suggest the most plausible one; the operator decides.
"#;

/// Instructions for drafting the final contract text.
pub const CONTRACT_CONSTRUCTION_PROMPT: &str = r#"
## Task: Draft the Contract

Produce the final contract text from the template and the verified information below.

Rules:
1. Use the template as the base of the contract and keep its structure.
2. Insert party names directly into the text, without brackets.
3. Use the verified address wherever the contract needs an address.
4. Describe the object of the contract in its own section, using the object description.
5. Include every payment detail (amounts and dates) in the section that deals with payment.
6. Use EXACTLY the role names given for each party.
7. Replace every placeholder. Where information is missing, write "[To be determined]".
8. Leave no square brackets anywhere else in the text.
"#;

/// Instructions for the agent-mode planner.
pub const NEXT_ACTION_PROMPT: &str = r#"
## Task: Choose the Next Step

You coordinate a contract drafting workflow. Given its current state, choose the next
action and give a one-sentence reason.

Actions:
- extract_pii: read the documents and have the operator verify the people found
- determine_contract_type: choose the contract template with the operator
- identify_parties: assign a role to every verified person
- construct_contract: draft the contract text
- finish: end the workflow once the contract is drafted

Only choose an action whose prerequisites are met: roles need a contract type and verified
people; drafting needs identified parties; finishing needs a drafted contract.
"#;

/// Build the prompt for extracting people from one document.
pub fn pii_extraction_prompt(document_text: &str) -> String {
    format!(
        "{}\n## Document\n\n{}\n",
        PII_EXTRACTION_PROMPT,
        document_text.trim()
    )
}

/// Build the prompt for choosing a template from a description.
pub fn contract_type_prompt(description: &str, candidates: &[String]) -> String {
    format!(
        "{}\n## Available Templates\n{}\n\n## Operator's Description\n{}\n",
        CONTRACT_TYPE_PROMPT,
        bullet_list(candidates.iter().map(String::as_str)),
        description.trim()
    )
}

/// Build the prompt for suggesting roles.
pub fn role_suggestion_prompt(contract_type: ContractType, people: &[PiiRecord]) -> String {
    let roles = bullet_list(contract_type.roles().iter().map(Role::label));
    let people = people
        .iter()
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n## Contract Type\n{}\n\n## Allowed Roles\n{}\n\n## People\n{}\n",
        ROLE_SUGGESTION_PROMPT,
        contract_type.display_name(),
        roles,
        people
    )
}

/// Inputs of the drafting prompt, already formatted as text.
pub struct DraftingContext<'a> {
    pub contract_type: ContractType,
    pub template: &'a str,
    pub parties_info: &'a str,
    pub address: &'a str,
    pub additional_info: &'a str,
    pub object_description: &'a str,
}

/// Build the prompt for drafting the contract.
pub fn contract_construction_prompt(ctx: &DraftingContext<'_>) -> String {
    let or_missing = |value: &str| {
        if value.trim().is_empty() {
            NOT_PROVIDED.to_string()
        } else {
            value.trim().to_string()
        }
    };
    format!(
        "{}\n## Contract Type\n{}\n\n## Template\n{}\n\n## Verified Parties\n{}\n\n\
         ## Verified Address\n{}\n\n## Additional Details\n{}\n\n## Object Description\n{}\n",
        CONTRACT_CONSTRUCTION_PROMPT,
        ctx.contract_type.display_name(),
        ctx.template.trim(),
        or_missing(ctx.parties_info),
        or_missing(ctx.address),
        or_missing(ctx.additional_info),
        or_missing(ctx.object_description),
    )
}

/// Build the planner prompt from a state summary.
pub fn next_action_prompt(state_summary: &str, rejected: Option<&str>) -> String {
    let mut prompt = format!(
        "{}\n## Allowed Actions\n{}\n\n## Current State\n{}\n",
        NEXT_ACTION_PROMPT,
        bullet_list(NextAction::ALL.iter().map(NextAction::as_str)),
        state_summary.trim()
    );
    if let Some(reason) = rejected {
        prompt.push_str(&format!(
            "\n## Previous Choice Rejected\n{}\nChoose an action whose prerequisites are met.\n",
            reason
        ));
    }
    prompt
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
