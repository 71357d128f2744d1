//! Configuration file support

use anyhow::{Context, anyhow};
use kai_ai::{Model, Provider, ProviderClient, Tier, models, providers};
use kai_consolidate::{
    ConsolidationConfig, ContextConfig, DEFAULT_MAX_PATCH_ATTEMPTS, EmptyContentPolicy, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for kai
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion provider (anthropic, openai, groq, openrouter, ollama, custom)
    pub provider: String,
    /// Model for the fast tier; provider default when unset
    pub fast_model: Option<String>,
    /// Model for the quality tier; provider default when unset
    pub quality_model: Option<String>,
    /// Override the provider's endpoint
    pub base_url: Option<String>,
    /// Sampling temperature; provider default when unset
    pub temperature: Option<f32>,
    pub request_timeout_secs: u64,
    pub pipeline: PipelineSettings,
    pub retry: RetrySettings,
    pub context: ContextConfig,
    pub patch: PatchSettings,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            fast_model: None,
            quality_model: None,
            base_url: None,
            temperature: None,
            request_timeout_secs: 300,
            pipeline: PipelineSettings::default(),
            retry: RetrySettings::default(),
            context: ContextConfig::default(),
            patch: PatchSettings::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

/// `[pipeline]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub require_clean_tree: bool,
    pub review: bool,
    pub auto_commit: bool,
    pub empty_content: EmptyContentPolicy,
    pub analysis_tier: Tier,
    pub generation_tier: Tier,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            require_clean_tree: true,
            review: false,
            auto_commit: false,
            empty_content: EmptyContentPolicy::Drop,
            analysis_tier: Tier::Quality,
            generation_tier: Tier::Quality,
        }
    }
}

/// `[retry]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_jitter_ms: 250,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_jitter: Duration::from_millis(settings.max_jitter_ms),
        }
    }
}

/// `[patch]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSettings {
    pub max_attempts: u32,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_PATCH_ATTEMPTS,
        }
    }
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kai")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for KAI_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("KAI_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    pub fn provider(&self) -> anyhow::Result<Provider> {
        Provider::parse(&self.provider).ok_or_else(|| anyhow!("Unknown provider '{}'", self.provider))
    }

    /// API key from the config file. Environment variables are consulted by
    /// the provider when this is `None`.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::Anthropic => self.api_keys.anthropic.clone(),
            Provider::OpenAI => self.api_keys.openai.clone(),
            _ => None,
        }
    }

    /// Concrete model for a tier
    pub fn model(&self, tier: Tier) -> anyhow::Result<Model> {
        let provider = self.provider()?;
        let configured = match tier {
            Tier::Fast => self.fast_model.as_deref(),
            Tier::Quality => self.quality_model.as_deref(),
        };
        let id = configured
            .or_else(|| models::default_model_id(provider, tier))
            .ok_or_else(|| {
                anyhow!(
                    "No default {} model for {}; set {}_model in the config file",
                    tier.as_str(),
                    provider.name(),
                    tier.as_str()
                )
            })?;
        Ok(models::resolve_model(provider, id, self.base_url.as_deref())?)
    }

    /// Completion client for both tiers
    pub fn build_client(&self) -> anyhow::Result<ProviderClient> {
        let provider = self.provider()?;
        let fast = self.model(Tier::Fast)?;
        let quality = self.model(Tier::Quality)?;
        let timeout = Duration::from_secs(self.request_timeout_secs);

        let api_key = self.api_key(provider);
        let llm = providers::provider_for(&quality, api_key.as_deref(), timeout).with_context(|| {
            match provider.api_key_env_var() {
                Some(var) => format!(
                    "Could not set up {}. Set {} or add the key to the config file",
                    provider.name(),
                    var
                ),
                None => format!("Could not set up {}", provider.name()),
            }
        })?;

        let client = ProviderClient::new(llm, fast, quality)
            .with_system_prompt(kai_consolidate::prompts::SYSTEM_PROMPT);
        Ok(match self.temperature {
            Some(temperature) => client.with_temperature(temperature),
            None => client,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn consolidation_config(&self) -> ConsolidationConfig {
        ConsolidationConfig {
            require_clean_tree: self.pipeline.require_clean_tree,
            review: self.pipeline.review,
            auto_commit: self.pipeline.auto_commit,
            analysis_tier: self.pipeline.analysis_tier,
            generation_tier: self.pipeline.generation_tier,
            retry: self.retry_policy(),
            empty_content: self.pipeline.empty_content,
            context: self.context.clone(),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# kai configuration file
# Place at ~/.config/kai/config.toml (Linux), ~/Library/Application Support/kai/config.toml (macOS)
# or point KAI_CONFIG_PATH at it.

# Completion provider (anthropic, openai, groq, openrouter, ollama, custom)
provider = "anthropic"

# Models per tier (defaults depend on the provider)
# fast_model = "claude-haiku-4-5-20251001"
# quality_model = "claude-sonnet-4-5-20250929"

# Endpoint override, required for provider = "custom"
# base_url = "http://localhost:8000/v1"

# temperature = 0.2

request_timeout_secs = 300

[pipeline]
# Refuse to run with uncommitted changes
require_clean_tree = true
# Show diffs and ask before writing files
review = false
# Commit after a successful run
auto_commit = false
# When a file keeps coming back empty: "drop", "accept" or "fail"
empty_content = "drop"
analysis_tier = "quality"
generation_tier = "quality"

[retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 60000
max_jitter_ms = 250

[context]
max_file_bytes = 65536
max_total_bytes = 524288
exclude = ["*.lock", "dist/**"]

[patch]
max_attempts = 10

# API keys (optional - can also use environment variables)
[api_keys]
# anthropic = "sk-ant-..."
# openai = "sk-..."
"#
}
