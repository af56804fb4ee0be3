//! JSON Schemas for structured generation responses.
//!
//! Every schema is strict: all properties required, no extra properties.
//! The runtime hands the schema to the generative service and validates the
//! returned value against it before deserializing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::roles::Role;
use crate::state::NextAction;

/// A named schema a structured response must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Validate a response value against the schema.
    ///
    /// Returns Ok(()) if valid, or a list of validation error messages.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<String>> {
        let validator = jsonschema::options()
            .build(&self.schema)
            .map_err(|e| vec![format!("Failed to compile schema {}: {}", self.name, e)])?;

        let errors: Vec<String> = validator
            .iter_errors(instance)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validate(instance).is_ok()
    }
}

fn strict_object(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// `{"records": [{"name", "address"}]}`
pub fn pii_extraction() -> ResponseSchema {
    let record = strict_object(json!({
        "name": { "type": "string" },
        "address": { "type": "string" }
    }));
    ResponseSchema::new(
        "pii_extraction",
        strict_object(json!({
            "records": { "type": "array", "items": record }
        })),
    )
}

/// `{"contract_type", "reason"}` with `contract_type` one of `candidates`.
pub fn contract_type_choice(candidates: &[String]) -> ResponseSchema {
    ResponseSchema::new(
        "contract_type_choice",
        strict_object(json!({
            "contract_type": { "type": "string", "enum": candidates },
            "reason": { "type": "string" }
        })),
    )
}

/// `{"assignments": [{"name", "role"}]}` with `role` one of `roles`.
pub fn role_assignment(roles: &[Role]) -> ResponseSchema {
    let labels: Vec<&str> = roles.iter().map(Role::label).collect();
    let assignment = strict_object(json!({
        "name": { "type": "string" },
        "role": { "type": "string", "enum": labels }
    }));
    ResponseSchema::new(
        "role_assignment",
        strict_object(json!({
            "assignments": { "type": "array", "items": assignment }
        })),
    )
}

/// `{"contract_text"}`
pub fn contract_draft() -> ResponseSchema {
    ResponseSchema::new(
        "contract_draft",
        strict_object(json!({
            "contract_text": { "type": "string", "minLength": 1 }
        })),
    )
}

/// `{"action", "reason"}` with `action` one of the agent actions.
pub fn next_action() -> ResponseSchema {
    let actions: Vec<&str> = NextAction::ALL.iter().map(NextAction::as_str).collect();
    ResponseSchema::new(
        "next_action",
        strict_object(json!({
            "action": { "type": "string", "enum": actions },
            "reason": { "type": "string" }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::ContractType;

    #[test]
    fn test_pii_schema_accepts_records() {
        let schema = pii_extraction();
        let value = json!({"records": [{"name": "Jane Doe", "address": "12 Elm St"}]});
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn test_pii_schema_rejects_extra_fields() {
        let schema = pii_extraction();
        let value = json!({"records": [{"name": "Jane", "address": "x", "cnp": "123"}]});
        let errors = schema.validate(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_role_schema_is_closed_over_contract_roles() {
        let schema = role_assignment(ContractType::ShortTermRental.roles());
        let ok = json!({"assignments": [{"name": "Ana", "role": "Landlord/Owner"}]});
        let bad = json!({"assignments": [{"name": "Ana", "role": "Buyer"}]});
        assert!(schema.is_valid(&ok));
        assert!(!schema.is_valid(&bad));
    }

    #[test]
    fn test_contract_type_schema_uses_candidates() {
        let schema = contract_type_choice(&["buy-sell".to_string(), "airbnb".to_string()]);
        assert!(schema.is_valid(&json!({"contract_type": "airbnb", "reason": "rental"})));
        assert!(!schema.is_valid(&json!({"contract_type": "lease", "reason": "?"})));
        assert!(!schema.is_valid(&json!({"contract_type": "airbnb"})));
    }

    #[test]
    fn test_next_action_schema() {
        let schema = next_action();
        assert!(schema.is_valid(&json!({"action": "finish", "reason": "done"})));
        assert!(!schema.is_valid(&json!({"action": "celebrate", "reason": "done"})));
    }

    #[test]
    fn test_draft_schema_requires_text() {
        let schema = contract_draft();
        assert!(!schema.is_valid(&json!({"contract_text": ""})));
        assert!(schema.is_valid(&json!({"contract_text": "CONTRACT"})));
    }
}
