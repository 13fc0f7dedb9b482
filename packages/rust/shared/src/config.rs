//! Application configuration for DealScout.
//!
//! User config lives at `~/.dealscout/dealscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DealScoutError, Result};
use crate::types::SubscriptionTier;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "dealscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".dealscout";

// ---------------------------------------------------------------------------
// Config structs (matching dealscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote fetch / AI extraction services.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-tier limits.
    #[serde(default)]
    pub tiers: TiersConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the local database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Tier used when the CLI is not told otherwise.
    #[serde(default)]
    pub tier: SubscriptionTier,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tier: SubscriptionTier::Free,
        }
    }
}

fn default_db_path() -> String {
    "~/.dealscout/dealscout.db".into()
}

/// `[services]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL the function paths are joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the fetch-and-extract-metadata operation.
    #[serde(default = "default_scrape_path")]
    pub scrape_path: String,

    /// Path of the AI deal extraction operation.
    #[serde(default = "default_extract_path")]
    pub extract_path: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            scrape_path: default_scrape_path(),
            extract_path: default_extract_path(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Read the API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

fn default_base_url() -> String {
    "http://localhost:54321/functions/v1".into()
}
fn default_scrape_path() -> String {
    "scrape-website".into()
}
fn default_extract_path() -> String {
    "ai-deal-extraction".into()
}
fn default_api_key_env() -> String {
    "DEALSCOUT_API_KEY".into()
}
fn default_request_timeout() -> u64 {
    45
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Time budget for a single source, enforced by the orchestrator.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// Upper bound of candidates a simulated source fabricates.
    #[serde(default = "default_simulated_max")]
    pub simulated_max_candidates: usize,

    /// Fixes the simulated generator when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout(),
            simulated_max_candidates: default_simulated_max(),
            simulated_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

fn default_source_timeout() -> u64 {
    90
}
fn default_simulated_max() -> usize {
    5
}

/// Limits for a single subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum candidates kept from any one source.
    pub max_per_source: usize,
    /// Whether runs may be restricted to a leading batch of sources.
    pub allows_batching: bool,
}

/// `[tiers.*]` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    #[serde(default = "default_free")]
    pub free: TierLimits,
    #[serde(default = "default_pro")]
    pub pro: TierLimits,
    #[serde(default = "default_unlimited")]
    pub unlimited: TierLimits,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            free: default_free(),
            pro: default_pro(),
            unlimited: default_unlimited(),
        }
    }
}

impl TiersConfig {
    /// Look up the limits for a tier.
    pub fn limits(&self, tier: SubscriptionTier) -> TierLimits {
        match tier {
            SubscriptionTier::Free => self.free,
            SubscriptionTier::Pro => self.pro,
            SubscriptionTier::Unlimited => self.unlimited,
        }
    }
}

fn default_free() -> TierLimits {
    TierLimits {
        max_per_source: 3,
        allows_batching: false,
    }
}
fn default_pro() -> TierLimits {
    TierLimits {
        max_per_source: 10,
        allows_batching: true,
    }
}
fn default_unlimited() -> TierLimits {
    TierLimits {
        max_per_source: 25,
        allows_batching: true,
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.dealscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DealScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.dealscout/dealscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DealScoutError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DealScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        DealScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configurations the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.pipeline.source_timeout_secs == 0 {
        return Err(DealScoutError::config(
            "pipeline.source_timeout_secs must be greater than zero",
        ));
    }
    if config.pipeline.simulated_max_candidates == 0 {
        return Err(DealScoutError::config(
            "pipeline.simulated_max_candidates must be greater than zero",
        ));
    }
    for (name, limits) in [
        ("free", config.tiers.free),
        ("pro", config.tiers.pro),
        ("unlimited", config.tiers.unlimited),
    ] {
        if limits.max_per_source == 0 {
            return Err(DealScoutError::config(format!(
                "tiers.{name}.max_per_source must be greater than zero"
            )));
        }
    }
    url::Url::parse(&config.services.base_url).map_err(|e| {
        DealScoutError::config(format!(
            "services.base_url '{}' is not a valid URL: {e}",
            config.services.base_url
        ))
    })?;
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DealScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DealScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DealScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("DEALSCOUT_API_KEY"));
        assert!(toml_str.contains("max_per_source"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.source_timeout_secs, 90);
        assert_eq!(parsed.tiers.free.max_per_source, 3);
        assert!(!parsed.tiers.free.allows_batching);
        assert!(parsed.tiers.pro.allows_batching);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
tier = "pro"

[tiers.unlimited]
max_per_source = 100
allows_batching = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.tier, SubscriptionTier::Pro);
        assert_eq!(config.tiers.limits(SubscriptionTier::Unlimited).max_per_source, 100);
        assert_eq!(config.tiers.limits(SubscriptionTier::Free).max_per_source, 3);
        assert_eq!(config.services.scrape_path, "scrape-website");
    }

    #[test]
    fn validation_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.pipeline.source_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("source_timeout_secs"));
    }

    #[test]
    fn validation_rejects_zero_cap() {
        let mut config = AppConfig::default();
        config.tiers.pro.max_per_source = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("tiers.pro"));
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("ds_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[pipeline]\nsimulated_seed = 7\n").unwrap();
        let config = load_config_from(&path).expect("load");
        assert_eq!(config.pipeline.simulated_seed, Some(7));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn api_key_lookup() {
        let mut config = ServicesConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.api_key_env = "DS_TEST_NONEXISTENT_KEY_12345".into();
        assert!(config.api_key().is_none());
    }

    #[test]
    fn expand_home_passthrough() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
    }
}
