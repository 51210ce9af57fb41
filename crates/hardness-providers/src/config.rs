//! Configuration and solver factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use hardness_core::aggregate::VerdictThresholds;
use hardness_core::engine::EngineConfig;
use hardness_core::invoker::RetryPolicy;
use hardness_core::traits::Solver;

use crate::mock::MockSolver;
use crate::openai::{OpenAiSettings, OpenAiSolver};

/// Environment variable that overrides the default provider's api key.
pub const API_KEY_ENV: &str = "HARDNESS_API_KEY";

/// Configuration for a single solver backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f64>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        request_timeout_secs: Option<u64>,
    },
    Mock {
        #[serde(default)]
        responses: Vec<String>,
        #[serde(default)]
        failing_attempts: Vec<u32>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                model,
                temperature,
                system_prompt,
                request_timeout_secs,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .field("temperature", temperature)
                .field("system_prompt", &system_prompt.as_ref().map(|_| "..."))
                .field("request_timeout_secs", request_timeout_secs)
                .finish(),
            ProviderConfig::Mock {
                responses,
                failing_attempts,
            } => f
                .debug_struct("Mock")
                .field("responses", &responses.len())
                .field("failing_attempts", failing_attempts)
                .finish(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Top-level hardness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardnessConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used when none is named on the command line.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Attempts per problem unless the problem says otherwise.
    #[serde(default = "default_trial_count")]
    pub trial_count: u32,
    /// Maximum attempts in flight at once.
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
    /// Delay before the first retry, doubled on each further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Solver calls per attempt, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    /// Bound on a single attempt, retries included. 0 disables it.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Bound on a whole run. 0 disables it.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_easy_threshold")]
    pub easy_threshold: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_trial_count() -> u32 {
    5
}
fn default_concurrency_cap() -> usize {
    8
}
fn default_base_delay_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_jitter_min_ms() -> u64 {
    1_000
}
fn default_jitter_max_ms() -> u64 {
    5_000
}
fn default_attempt_timeout_secs() -> u64 {
    600
}
fn default_run_timeout_secs() -> u64 {
    1_800
}
fn default_easy_threshold() -> f64 {
    0.80
}
fn default_medium_threshold() -> f64 {
    0.50
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./hardness-results")
}

impl Default for HardnessConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            trial_count: default_trial_count(),
            concurrency_cap: default_concurrency_cap(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            easy_threshold: default_easy_threshold(),
            medium_threshold: default_medium_threshold(),
            output_dir: default_output_dir(),
        }
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl HardnessConfig {
    /// Engine settings derived from this file. Not validated.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            trial_count: self.trial_count,
            concurrency_cap: self.concurrency_cap,
            retry: RetryPolicy {
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_attempts: self.max_attempts,
                jitter_min: Duration::from_millis(self.jitter_min_ms),
                jitter_max: Duration::from_millis(self.jitter_max_ms),
            },
            attempt_timeout: optional_secs(self.attempt_timeout_secs),
            run_timeout: optional_secs(self.run_timeout_secs),
            thresholds: VerdictThresholds {
                easy: self.easy_threshold,
                medium: self.medium_threshold,
            },
            ..EngineConfig::default()
        }
    }

    /// Build the solver registered under `name`, or the default provider.
    pub fn solver(&self, name: Option<&str>) -> Result<Arc<dyn Solver>> {
        let name = name.unwrap_or(&self.default_provider);
        let Some(config) = self.providers.get(name) else {
            let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow::bail!(
                "provider '{name}' is not configured (configured: {})",
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            );
        };
        create_solver(config).with_context(|| format!("failed to create provider '{name}'"))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            model,
            temperature,
            system_prompt,
            request_timeout_secs,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(&api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            model: resolve_env_vars(&model),
            temperature,
            system_prompt,
            request_timeout_secs,
        },
        mock @ ProviderConfig::Mock { .. } => mock,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `hardness.toml` in the current directory
/// 2. `~/.config/hardness/config.toml`
///
/// `HARDNESS_API_KEY` overrides the api key of the default provider.
pub fn load_config() -> Result<HardnessConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<HardnessConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("hardness.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            toml::from_str::<HardnessConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => HardnessConfig::default(),
    };

    config.providers = config
        .providers
        .into_iter()
        .map(|(k, v)| (k, resolve_provider_config(v)))
        .collect();

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        apply_api_key_override(&mut config, key);
    }

    Ok(config)
}

fn apply_api_key_override(config: &mut HardnessConfig, key: String) {
    let entry = config
        .providers
        .entry(config.default_provider.clone())
        .or_insert_with(|| ProviderConfig::OpenAI {
            api_key: String::new(),
            base_url: None,
            model: default_model(),
            temperature: None,
            system_prompt: None,
            request_timeout_secs: None,
        });
    if let ProviderConfig::OpenAI { api_key, .. } = entry {
        *api_key = key;
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("hardness"))
}

/// Create a solver instance from its configuration.
pub fn create_solver(config: &ProviderConfig) -> Result<Arc<dyn Solver>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            model,
            temperature,
            system_prompt,
            request_timeout_secs,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("api_key is empty (set it in the config or via {API_KEY_ENV})");
            }
            Ok(Arc::new(OpenAiSolver::new(OpenAiSettings {
                api_key: api_key.clone(),
                base_url: base_url.clone(),
                model: model.clone(),
                temperature: *temperature,
                system_prompt: system_prompt.clone(),
                request_timeout_secs: *request_timeout_secs,
            })?))
        }
        ProviderConfig::Mock {
            responses,
            failing_attempts,
        } => Ok(Arc::new(
            MockSolver::new(responses.clone()).failing_on(failing_attempts.clone()),
        )),
    }
}
