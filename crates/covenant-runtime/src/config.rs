//! Runtime configuration.
//!
//! Every section has defaults, so an empty YAML document is a valid config.
//! Durations are written as human-readable strings ("30s", "500ms", "1h").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use covenant_core::{CompletionRequirements, Completeness};

use crate::interaction::RetryPolicy;
use crate::providers::CompletionConfig;
use crate::resilience::{CircuitBreakerConfig, FallbackStrategy};

/// Serde adapter for `humantime` duration strings.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Everything the runtime needs besides the provider itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub completion: CompletionSettings,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub budgets: BudgetConfig,
    pub cache: CacheConfig,
    pub extraction: ExtractionConfig,
    pub workflow: WorkflowConfig,
}

/// Request parameters for every generative call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CompletionSettings {
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            response_schema: None,
        }
    }
}

/// Exponential backoff on transient provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_times: usize,
    #[serde(with = "duration_str")]
    pub min_delay: Duration,
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_times: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub global_max_tokens: u32,
    pub per_task_max_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            global_max_tokens: 200_000,
            per_task_max_tokens: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// External tools used by the text extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub pdftotext: PathBuf,
    pub tesseract: PathBuf,

    /// Per-document limit for an external tool
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdftotext: PathBuf::from("pdftotext"),
            tesseract: PathBuf::from("tesseract"),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Guided runs the fixed stage sequence; agent picks an action per iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    #[default]
    Guided,
    Agent,
}

/// How a choice is made: numbered menu, or a service suggestion the human confirms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Menu,
    Assisted,
}

/// Agent-mode action choice: canonical order, or asked of the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    #[default]
    Fixed,
    Assisted,
}

macro_rules! str_enum {
    ($ty:ident { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!(
                        "unknown value '{}', expected one of: {}",
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => f.write_str($text),)+
                }
            }
        }
    };
}

str_enum!(WorkflowMode { "guided" => Guided, "agent" => Agent });
str_enum!(SelectionMode { "menu" => Menu, "assisted" => Assisted });
str_enum!(PlannerMode { "fixed" => Fixed, "assisted" => Assisted });

/// Workflow behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub mode: WorkflowMode,
    pub type_selection: SelectionMode,
    pub role_selection: SelectionMode,
    pub planner: PlannerMode,
    pub completeness: Completeness,

    /// Verified people needed before the contract type is chosen
    pub min_parties: usize,

    /// Missing-information rounds before the workflow gives up
    pub max_missing_information_rounds: u32,

    /// Agent-mode iterations before the workflow gives up
    pub max_agent_iterations: u32,

    /// Attempts per prompt; absent means ask until the answer is valid
    pub max_input_attempts: Option<u32>,

    pub construction_fallback: FallbackStrategy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: WorkflowMode::Guided,
            type_selection: SelectionMode::Menu,
            role_selection: SelectionMode::Menu,
            planner: PlannerMode::Fixed,
            completeness: Completeness::Standard,
            min_parties: 2,
            max_missing_information_rounds: 3,
            max_agent_iterations: 20,
            max_input_attempts: None,
            construction_fallback: FallbackStrategy::Fail,
        }
    }
}

impl WorkflowConfig {
    pub fn requirements(&self) -> CompletionRequirements {
        CompletionRequirements {
            completeness: self.completeness,
            min_parties: self.min_parties,
        }
    }

    pub fn input_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_input_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.completion.model, "gpt-4o");
        assert_eq!(config.workflow.min_parties, 2);
        assert_eq!(config.workflow.max_missing_information_rounds, 3);
        assert_eq!(config.workflow.max_agent_iterations, 20);
        assert!(config.workflow.input_policy().max_attempts.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let raw = serde_json::json!({
            "completion": {"model": "gpt-4o-mini", "timeout": "45s"},
            "retry": {"min_delay": "250ms"},
            "workflow": {"mode": "agent", "completeness": "strict", "max_input_attempts": 5}
        });
        let config: RuntimeConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.completion.timeout, Duration::from_secs(45));
        assert_eq!(config.completion.max_tokens, 2000);
        assert_eq!(config.retry.min_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_times, 3);
        assert_eq!(config.workflow.mode, WorkflowMode::Agent);
        assert_eq!(config.workflow.requirements().completeness, Completeness::Strict);
        assert_eq!(config.workflow.input_policy().max_attempts, Some(5));
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let raw = serde_json::json!({"cache": {"ttl": "forever"}});
        assert!(serde_json::from_value::<RuntimeConfig>(raw).is_err());
    }

    #[test]
    fn test_duration_round_trip_format() {
        let value = serde_json::to_value(CacheConfig::default()).unwrap();
        assert_eq!(value["ttl"], "1h");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Agent".parse::<WorkflowMode>().unwrap(), WorkflowMode::Agent);
        assert_eq!(SelectionMode::Assisted.to_string(), "assisted");
        assert!("random".parse::<PlannerMode>().is_err());
    }
}
