//! Application configuration: YAML file plus command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};

use covenant_core::Completeness;
use covenant_runtime::RuntimeConfig;

use crate::RunArgs;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "covenant.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub documents_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
    pub provider: ProviderSettings,

    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data"),
            templates_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("output_contracts"),
            provider: ProviderSettings::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Which generative backend to use.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(rename = "type")]
    pub kind: String,

    /// Falls back to the provider's environment variable when absent
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub base_url: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderSettings {
    /// Provider-specific configuration handed to the provider factory.
    pub fn factory_config(&self) -> serde_json::Value {
        let mut config = json!({});
        if let Some(key) = &self.api_key {
            config["api_key"] = json!(key);
        }
        if let Some(url) = &self.base_url {
            config["base_url"] = json!(url);
        }
        config
    }
}

impl AppConfig {
    /// Load `path`, or `covenant.yaml` when present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    tracing::debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply command-line flags over file values.
    pub fn apply(&mut self, args: &RunArgs) {
        if let Some(dir) = &args.data {
            self.documents_dir = dir.clone();
        }
        if let Some(dir) = &args.templates {
            self.templates_dir = dir.clone();
        }
        if let Some(dir) = &args.output {
            self.output_dir = dir.clone();
        }
        if let Some(kind) = &args.provider {
            self.provider.kind = kind.clone();
        }
        if let Some(model) = &args.model {
            self.runtime.completion.model = model.clone();
        }

        let workflow = &mut self.runtime.workflow;
        if let Some(mode) = args.mode {
            workflow.mode = mode;
        }
        if let Some(mode) = args.type_selection {
            workflow.type_selection = mode;
        }
        if let Some(mode) = args.role_selection {
            workflow.role_selection = mode;
        }
        if let Some(planner) = args.planner {
            workflow.planner = planner;
        }
        if let Some(fallback) = args.fallback {
            workflow.construction_fallback = fallback;
        }
        if args.strict {
            workflow.completeness = Completeness::Strict;
        }
    }
}
