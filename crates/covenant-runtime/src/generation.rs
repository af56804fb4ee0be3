//! The single gateway to the generative service.
//!
//! Every call goes through the same pipeline:
//! circuit check, budget check, cache lookup, provider call with
//! exponential backoff, then schema validation.
//! Nothing that fails validation is cached or handed to the caller.

use backon::{ExponentialBuilder, Retryable};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use covenant_core::ResponseSchema;

use crate::cache::{CacheKey, ResponseCache};
use crate::config::{CompletionSettings, RetryConfig, RuntimeConfig};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::{BudgetTracker, CircuitBreaker, LlmUsage};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap();
}

/// What a generative call is for. Circuits and budgets are kept per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    PiiExtraction,
    ContractType,
    RoleSuggestion,
    ContractDrafting,
    NextAction,
}

impl GenerationTask {
    pub const ALL: [GenerationTask; 5] = [
        GenerationTask::PiiExtraction,
        GenerationTask::ContractType,
        GenerationTask::RoleSuggestion,
        GenerationTask::ContractDrafting,
        GenerationTask::NextAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTask::PiiExtraction => "pii_extraction",
            GenerationTask::ContractType => "contract_type",
            GenerationTask::RoleSuggestion => "role_suggestion",
            GenerationTask::ContractDrafting => "contract_drafting",
            GenerationTask::NextAction => "next_action",
        }
    }
}

impl fmt::Display for GenerationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the generative service.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Generative service disabled for {0} after repeated failures")]
    CircuitOpen(GenerationTask),

    #[error("Token budget exhausted for {0}")]
    BudgetExceeded(GenerationTask),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Response does not match schema {schema}: {}", .errors.join("; "))]
    SchemaMismatch { schema: String, errors: Vec<String> },

    #[error("Response could not be decoded: {0}")]
    Decode(String),
}

/// Generative service with resilience and validation around a provider.
pub struct GenerativeService {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionSettings,
    retry: RetryConfig,
    circuit_breaker: CircuitBreaker,
    budget_tracker: BudgetTracker,
    cache: Option<ResponseCache>,
}

impl GenerativeService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::new(config.cache.max_entries, config.cache.ttl));

        Self {
            provider,
            completion: config.completion.clone(),
            retry: config.retry.clone(),
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            budget_tracker: BudgetTracker::new(
                config.budgets.global_max_tokens,
                config.budgets.per_task_max_tokens,
            ),
            cache,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Usage accumulated over every call made through this service.
    pub fn usage(&self) -> LlmUsage {
        self.budget_tracker.get_usage()
    }

    /// Request a structured response and decode it into `T`.
    ///
    /// The response is validated against `schema` before decoding; a
    /// response that does not conform is an error, never a partial value.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        task: GenerationTask,
        system: &str,
        prompt: &str,
        schema: ResponseSchema,
    ) -> Result<T, GenerationError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let key = CacheKey::new(task, &self.completion.model, &messages, Some(&schema));

        let value = match self.cached(&key).await {
            Some(content) => parse_json(&content)?,
            None => {
                let config = self.completion.completion_config().with_schema(schema.clone());
                let content = self.call(task, messages, &config).await?;
                let value = parse_json(&content)?;
                if let Err(errors) = schema.validate(&value) {
                    tracing::warn!(
                        task = %task,
                        schema = %schema.name,
                        errors = errors.len(),
                        "Response rejected by schema"
                    );
                    return Err(GenerationError::SchemaMismatch {
                        schema: schema.name.clone(),
                        errors,
                    });
                }
                self.store(key, content).await;
                value
            }
        };

        serde_json::from_value(value).map_err(|e| GenerationError::Decode(e.to_string()))
    }

    async fn cached(&self, key: &CacheKey) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(key).await;
        if hit.is_some() {
            self.budget_tracker.record_cache_hit();
            tracing::debug!("Generative response served from cache");
        }
        hit
    }

    async fn store(&self, key: CacheKey, content: String) {
        if let Some(cache) = &self.cache {
            cache.insert(key, content).await;
        }
    }

    async fn call(
        &self,
        task: GenerationTask,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<String, GenerationError> {
        if self.circuit_breaker.is_open(task) {
            tracing::warn!(task = %task, "Circuit open, refusing generative call");
            return Err(GenerationError::CircuitOpen(task));
        }

        let prompt_chars: String = messages.iter().map(|m| m.content.as_str()).collect();
        let estimated_tokens = self.provider.estimate_tokens(&prompt_chars);
        if !self.budget_tracker.can_afford(task, estimated_tokens) {
            tracing::warn!(
                task = %task,
                estimated_tokens,
                remaining = self.budget_tracker.remaining_task(task),
                remaining_global = self.budget_tracker.remaining_global(),
                "Token budget exhausted"
            );
            return Err(GenerationError::BudgetExceeded(task));
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay)
            .with_max_delay(self.retry.max_delay)
            .with_max_times(self.retry.max_times);
        let provider = &self.provider;

        let result = (|| {
            let messages = messages.clone();
            async move { provider.complete(messages, config).await }
        })
        .retry(backoff)
        .when(ProviderError::is_transient)
        .notify(|err: &ProviderError, delay| {
            tracing::warn!(task = %task, error = %err, retry_in = ?delay, "Retrying generative call");
        })
        .await;

        match result {
            Ok(response) => {
                self.circuit_breaker.record_success(task);
                self.budget_tracker
                    .record_usage(task, &response.usage, &response.model);
                tracing::debug!(
                    task = %task,
                    provider = self.provider.name(),
                    tokens = response.usage.total(),
                    stop_reason = ?response.stop_reason,
                    "Generative call completed"
                );
                Ok(response.content)
            }
            Err(e) => {
                self.circuit_breaker.record_failure(task);
                tracing::warn!(task = %task, error = %e, "Generative call failed");
                Err(e.into())
            }
        }
    }
}

/// Parse a JSON response, tolerating a surrounding Markdown code fence.
fn parse_json(content: &str) -> Result<JsonValue, GenerationError> {
    let trimmed = content.trim();
    let body = CODE_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str());
    serde_json::from_str(body).map_err(|e| GenerationError::InvalidJson(e.to_string()))
}
