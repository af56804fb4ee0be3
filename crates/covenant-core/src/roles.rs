//! Contract types, their role taxonomy, and the role validator.
//!
//! Every contract type owns a fixed set of roles. A role label is valid only
//! inside its own contract type: "Tenant" is fine for a short-term rental and
//! rejected for a buy-sell agreement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::Party;
use crate::validation::{parse_amount, parse_date, require_non_empty, ValidationError};

/// The contract types the drafter knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractType {
    BuySell,
    ShortTermRental,
    ItConsulting,
}

/// A party role. Serialized as its exact human-facing label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Buyer,
    Seller,
    #[serde(rename = "Landlord/Owner")]
    LandlordOwner,
    Tenant,
    Consultant,
    Client,
}

/// How the value of an additional field is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Amount,
    Date,
}

/// A contract-specific detail collected from the human after the type is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdditionalField {
    /// Key under which the value is stored and substituted into templates
    pub key: &'static str,
    /// Question shown to the human
    pub prompt: &'static str,
    pub kind: FieldKind,
    /// Whether an empty answer is rejected
    pub required: bool,
}

/// Key of the optional address at which the contract is concluded.
pub const CONTRACT_ADDRESS_KEY: &str = "contract_address";

const CONTRACT_ADDRESS: AdditionalField = AdditionalField {
    key: CONTRACT_ADDRESS_KEY,
    prompt: "Address where the contract is concluded (leave empty to skip)",
    kind: FieldKind::Text,
    required: false,
};

/// Key of the free-text description of what the contract is about.
pub const OBJECT_DESCRIPTION_KEY: &str = "object_description";

const BUY_SELL_FIELDS: &[AdditionalField] = &[
    AdditionalField {
        key: OBJECT_DESCRIPTION_KEY,
        prompt: "Describe the object being sold",
        kind: FieldKind::Text,
        required: true,
    },
    AdditionalField {
        key: "price",
        prompt: "Total price",
        kind: FieldKind::Amount,
        required: true,
    },
    AdditionalField {
        key: "advance",
        prompt: "Advance payment amount",
        kind: FieldKind::Amount,
        required: true,
    },
    AdditionalField {
        key: "advance_date",
        prompt: "Advance payment date (DD/MM/YYYY)",
        kind: FieldKind::Date,
        required: true,
    },
    AdditionalField {
        key: "final_payment",
        prompt: "Final payment amount",
        kind: FieldKind::Amount,
        required: true,
    },
    AdditionalField {
        key: "final_date",
        prompt: "Final payment date (DD/MM/YYYY)",
        kind: FieldKind::Date,
        required: true,
    },
    CONTRACT_ADDRESS,
];

const RENTAL_FIELDS: &[AdditionalField] = &[
    AdditionalField {
        key: OBJECT_DESCRIPTION_KEY,
        prompt: "Describe the property",
        kind: FieldKind::Text,
        required: true,
    },
    AdditionalField {
        key: "rate",
        prompt: "Nightly rate",
        kind: FieldKind::Amount,
        required: true,
    },
    AdditionalField {
        key: "start_date",
        prompt: "Check-in date (DD/MM/YYYY)",
        kind: FieldKind::Date,
        required: true,
    },
    AdditionalField {
        key: "end_date",
        prompt: "Check-out date (DD/MM/YYYY)",
        kind: FieldKind::Date,
        required: true,
    },
    CONTRACT_ADDRESS,
];

const CONSULTING_FIELDS: &[AdditionalField] = &[
    AdditionalField {
        key: OBJECT_DESCRIPTION_KEY,
        prompt: "Describe the project scope",
        kind: FieldKind::Text,
        required: true,
    },
    AdditionalField {
        key: "rate",
        prompt: "Hourly rate",
        kind: FieldKind::Amount,
        required: true,
    },
    AdditionalField {
        key: "start_date",
        prompt: "Start date (DD/MM/YYYY)",
        kind: FieldKind::Date,
        required: true,
    },
    CONTRACT_ADDRESS,
];

impl ContractType {
    pub const ALL: [ContractType; 3] = [
        ContractType::BuySell,
        ContractType::ShortTermRental,
        ContractType::ItConsulting,
    ];

    /// Canonical key, also the default template key.
    pub fn key(&self) -> &'static str {
        match self {
            ContractType::BuySell => "buy-sell",
            ContractType::ShortTermRental => "short-term-rental",
            ContractType::ItConsulting => "it-consulting",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContractType::BuySell => "Buy-sell",
            ContractType::ShortTermRental => "Short-term rental",
            ContractType::ItConsulting => "IT consulting",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            ContractType::BuySell => &["buy-sell", "buy_sell", "buysell", "sale"],
            ContractType::ShortTermRental => &["short-term-rental", "short_term_rental", "airbnb"],
            ContractType::ItConsulting => &["it-consulting", "it_consulting", "it"],
        }
    }

    /// The closed set of roles a party may hold in this contract type.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            ContractType::BuySell => &[Role::Buyer, Role::Seller],
            ContractType::ShortTermRental => &[Role::LandlordOwner, Role::Tenant],
            ContractType::ItConsulting => &[Role::Consultant, Role::Client],
        }
    }

    /// Details collected from the human once this type is chosen.
    pub fn additional_fields(&self) -> &'static [AdditionalField] {
        match self {
            ContractType::BuySell => BUY_SELL_FIELDS,
            ContractType::ShortTermRental => RENTAL_FIELDS,
            ContractType::ItConsulting => CONSULTING_FIELDS,
        }
    }

    /// Find the contract type a template key refers to.
    ///
    /// Matches the canonical key or an alias case-insensitively, ignoring a
    /// trailing `.txt` or `-template` suffix.
    pub fn for_template_key(key: &str) -> Option<ContractType> {
        let lowered = key.trim().to_lowercase();
        let stem = lowered
            .trim_end_matches(".txt")
            .trim_end_matches("_template")
            .trim_end_matches("-template");
        ContractType::ALL
            .into_iter()
            .find(|kind| kind.aliases().contains(&stem))
    }

    fn allowed_roles(&self) -> String {
        self.roles()
            .iter()
            .map(Role::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ContractType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        ContractType::ALL
            .into_iter()
            .find(|kind| kind.aliases().contains(&lowered.as_str()))
            .ok_or_else(|| ValidationError::InvalidContractType {
                value: s.trim().to_string(),
                allowed: ContractType::ALL
                    .iter()
                    .map(|k| k.key())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Buyer,
        Role::Seller,
        Role::LandlordOwner,
        Role::Tenant,
        Role::Consultant,
        Role::Client,
    ];

    /// Exact label used in prompts, drafts, and menus.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Buyer => "Buyer",
            Role::Seller => "Seller",
            Role::LandlordOwner => "Landlord/Owner",
            Role::Tenant => "Tenant",
            Role::Consultant => "Consultant",
            Role::Client => "Client",
        }
    }

    /// Spellings accepted when reading a role typed by a human.
    pub fn accepted_spellings(&self) -> &'static [&'static str] {
        match self {
            Role::LandlordOwner => &["landlord/owner", "landlord", "owner"],
            Role::Buyer => &["buyer"],
            Role::Seller => &["seller"],
            Role::Tenant => &["tenant"],
            Role::Consultant => &["consultant"],
            Role::Client => &["client"],
        }
    }

    fn matches(&self, input: &str) -> bool {
        let lowered = input.trim().to_lowercase();
        self.accepted_spellings().contains(&lowered.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed-set validation for contract types, roles, and contract details.
pub struct ContractRoleValidator;

impl ContractRoleValidator {
    /// Resolve a typed role label against the roles of `contract_type`.
    pub fn validate_role(contract_type: ContractType, role: &str) -> Result<Role, ValidationError> {
        contract_type
            .roles()
            .iter()
            .copied()
            .find(|candidate| candidate.matches(role))
            .ok_or_else(|| ValidationError::InvalidRole {
                role: role.trim().to_string(),
                contract_type: contract_type.display_name().to_string(),
                allowed: contract_type.allowed_roles(),
            })
    }

    /// A party is valid when it has a name and a non-empty subset of the type's roles.
    pub fn validate_party(contract_type: ContractType, party: &Party) -> Result<(), ValidationError> {
        require_non_empty("party name", &party.name)?;
        if party.roles.is_empty() {
            return Err(ValidationError::NoRoles {
                party: party.name.clone(),
            });
        }
        let allowed = contract_type.roles();
        if let Some(bad) = party.roles.iter().find(|r| !allowed.contains(r)) {
            return Err(ValidationError::InvalidRole {
                role: bad.label().to_string(),
                contract_type: contract_type.display_name().to_string(),
                allowed: contract_type.allowed_roles(),
            });
        }
        Ok(())
    }

    /// Parse and normalize one additional field answer.
    pub fn validate_field(field: &AdditionalField, raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            if field.required {
                return Err(ValidationError::EmptyField {
                    field: field.key.to_string(),
                });
            }
            return Ok(String::new());
        }
        match field.kind {
            FieldKind::Text => Ok(trimmed.to_string()),
            FieldKind::Amount => parse_amount(trimmed),
            FieldKind::Date => parse_date(trimmed).map(|_| trimmed.to_string()),
        }
    }

    /// Check collected payment details: amounts parse, dates parse, and the
    /// final payment date is not before the advance date.
    pub fn validate_payment_details(
        details: &BTreeMap<String, String>,
    ) -> Result<(), ValidationError> {
        for key in ["price", "rate", "advance", "final_payment"] {
            if let Some(value) = details.get(key) {
                parse_amount(value)?;
            }
        }
        let dates = ["advance_date", "final_date", "start_date", "end_date"];
        for key in dates {
            if let Some(value) = details.get(key) {
                parse_date(value)?;
            }
        }
        for (earlier, later) in [("advance_date", "final_date"), ("start_date", "end_date")] {
            if let (Some(a), Some(b)) = (details.get(earlier), details.get(later)) {
                if parse_date(b)? < parse_date(a)? {
                    return Err(ValidationError::DateOrder {
                        earlier: a.clone(),
                        later: b.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate every required field of `contract_type` is present and well formed.
    pub fn validate_additional_info(
        contract_type: ContractType,
        details: &BTreeMap<String, String>,
    ) -> Result<(), ValidationError> {
        for field in contract_type.additional_fields() {
            match details.get(field.key) {
                Some(value) => {
                    Self::validate_field(field, value)?;
                }
                None if field.required => {
                    return Err(ValidationError::MissingField(field.key.to_string()));
                }
                None => {}
            }
        }
        Self::validate_payment_details(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PiiRecord;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_contract_type_aliases() {
        assert_eq!("airbnb".parse::<ContractType>().unwrap(), ContractType::ShortTermRental);
        assert_eq!("IT".parse::<ContractType>().unwrap(), ContractType::ItConsulting);
        assert_eq!(" Buy-Sell ".parse::<ContractType>().unwrap(), ContractType::BuySell);
        assert!("lease".parse::<ContractType>().is_err());
    }

    #[test]
    fn test_template_key_lookup() {
        assert_eq!(
            ContractType::for_template_key("airbnb_template.txt"),
            Some(ContractType::ShortTermRental)
        );
        assert_eq!(ContractType::for_template_key("buy-sell"), Some(ContractType::BuySell));
        assert_eq!(ContractType::for_template_key("nda"), None);
    }

    #[test]
    fn test_roles_are_scoped_to_contract_type() {
        let rental = ContractType::ShortTermRental;
        assert_eq!(
            ContractRoleValidator::validate_role(rental, "tenant").unwrap(),
            Role::Tenant
        );
        assert_eq!(
            ContractRoleValidator::validate_role(rental, "Owner").unwrap(),
            Role::LandlordOwner
        );

        let err = ContractRoleValidator::validate_role(rental, "Buyer").unwrap_err();
        assert!(err.to_string().contains("Landlord/Owner, Tenant"));
    }

    #[test]
    fn test_role_serializes_as_label() {
        let json = serde_json::to_string(&Role::LandlordOwner).unwrap();
        assert_eq!(json, "\"Landlord/Owner\"");
        let back: Role = serde_json::from_str("\"Consultant\"").unwrap();
        assert_eq!(back, Role::Consultant);
    }

    #[test]
    fn test_party_without_roles_rejected() {
        let party = Party::new(&PiiRecord::new("Ana Pop", "Str. Lunga 1"), BTreeSet::new());
        assert!(matches!(
            ContractRoleValidator::validate_party(ContractType::BuySell, &party),
            Err(ValidationError::NoRoles { .. })
        ));
    }

    #[test]
    fn test_payment_dates_must_be_ordered() {
        let mut details = BTreeMap::new();
        details.insert("advance_date".to_string(), "10/05/2025".to_string());
        details.insert("final_date".to_string(), "01/05/2025".to_string());
        assert!(matches!(
            ContractRoleValidator::validate_payment_details(&details),
            Err(ValidationError::DateOrder { .. })
        ));

        details.insert("final_date".to_string(), "10/06/2025".to_string());
        assert!(ContractRoleValidator::validate_payment_details(&details).is_ok());
    }

    #[test]
    fn test_additional_info_requires_required_fields() {
        let mut details = BTreeMap::new();
        details.insert("object_description".to_string(), "Laptop".to_string());
        details.insert("rate".to_string(), "45,50".to_string());
        details.insert("start_date".to_string(), "01/02/2025".to_string());
        assert!(
            ContractRoleValidator::validate_additional_info(ContractType::ItConsulting, &details)
                .is_ok()
        );
        assert!(matches!(
            ContractRoleValidator::validate_additional_info(ContractType::BuySell, &details),
            Err(ValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_optional_field_accepts_empty() {
        let field = &ContractType::BuySell.additional_fields()[6];
        assert_eq!(field.key, CONTRACT_ADDRESS_KEY);
        assert_eq!(ContractRoleValidator::validate_field(field, "  ").unwrap(), "");
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn any_contract_type() -> impl Strategy<Value = ContractType> {
        prop::sample::select(ContractType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_accepted_role_belongs_to_type(kind in any_contract_type(), role in any_role()) {
            let result = ContractRoleValidator::validate_role(kind, role.label());
            prop_assert_eq!(result.is_ok(), kind.roles().contains(&role));
        }

        #[test]
        fn prop_valid_party_roles_are_subset(
            kind in any_contract_type(),
            roles in prop::collection::btree_set(any_role(), 0..4),
        ) {
            let party = Party::new(&PiiRecord::new("Ion", "Addr"), roles.clone());
            let valid = ContractRoleValidator::validate_party(kind, &party).is_ok();
            let subset = !roles.is_empty() && roles.iter().all(|r| kind.roles().contains(r));
            prop_assert_eq!(valid, subset);
        }
    }
}
