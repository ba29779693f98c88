//! Engine configuration.
//!
//! Read from `forge.toml` in the workspace root; every field has a default
//! so the file and each of its sections are optional.
//!
//! ```toml
//! mode = "graph"
//! max_fix_attempts = 5
//! product_base_url = "http://localhost:8080"
//!
//! [retry]
//! initial_delay_ms = 1000
//! max_retries = 6
//! ```

use std::path::Path;
use std::time::Duration;

use forge_chat::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

pub const CONFIG_FILE: &str = "forge.toml";

/// How modules and plans are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// One backend and one UI module; every exchange modifies both.
    Single,
    /// Arbitrary module graph; updates are planned by the model.
    #[default]
    Graph,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Graph => "graph",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "single" => Some(Self::Single),
            "graph" => Some(Self::Graph),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_retries: u32,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_retries: 6,
            max_delay_ms: 32_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: PipelineMode,
    /// Generation attempts per module before the exchange fails.
    pub max_fix_attempts: usize,
    /// Steps per browser test session.
    pub max_test_steps: usize,
    /// Test sessions per module; a rejection between them triggers a fix.
    pub max_test_rounds: usize,
    pub retry: RetrySettings,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub product_base_url: Option<String>,
    pub management_base_url: Option<String>,
    pub source_base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::default(),
            max_fix_attempts: 5,
            max_test_steps: 100,
            max_test_rounds: 3,
            retry: RetrySettings::default(),
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 600,
            product_base_url: None,
            management_base_url: None,
            source_base_url: None,
        }
    }
}

impl EngineConfig {
    /// Load `forge.toml` from `workspace_root` if present, then apply
    /// environment overrides.
    pub fn load(workspace_root: &Path) -> EngineResult<Self> {
        let path = workspace_root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            debug!("Loading configuration from {}", path.display());
            Self::from_toml(&std::fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FORGE_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(mode) = std::env::var("FORGE_MODE") {
            match PipelineMode::from_str(&mode) {
                Some(mode) => self.mode = mode,
                None => warn!("Ignoring unknown FORGE_MODE {}", mode),
            }
        }
        if let Some(value) = env_number("FORGE_MAX_FIX_ATTEMPTS") {
            self.max_fix_attempts = value;
        }
        if let Some(value) = env_number("FORGE_MAX_TEST_STEPS") {
            self.max_test_steps = value;
        }
        if let Ok(url) = std::env::var("FORGE_PRODUCT_BASE_URL") {
            self.product_base_url = Some(url);
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_fix_attempts == 0 {
            return Err(EngineError::Config(
                "max_fix_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_test_rounds == 0 {
            return Err(EngineError::Config(
                "max_test_rounds must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(EngineError::Config(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.retry.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }
}

fn env_number(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring non-numeric {}={}", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_fix_attempts, 5);
        assert_eq!(config.max_test_steps, 100);
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 6);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
    }

    #[test]
    fn test_partial_file() {
        let config = EngineConfig::from_toml(
            "mode = \"single\"\nmax_fix_attempts = 2\n[retry]\nmax_retries = 1\n",
        )
        .unwrap();
        assert_eq!(config.mode, PipelineMode::Single);
        assert_eq!(config.max_fix_attempts, 2);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.heartbeat_timeout_secs, 600);
    }

    #[test]
    fn test_load_missing_file_and_invalid_values() {
        let dir = TempDir::new().unwrap();
        assert!(EngineConfig::load(dir.path()).is_ok());

        std::fs::write(dir.path().join(CONFIG_FILE), "max_fix_attempts = 0\n").unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path()),
            Err(EngineError::Config(_))
        ));

        std::fs::write(dir.path().join(CONFIG_FILE), "mode = \"tree\"\n").unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path()),
            Err(EngineError::Toml(_))
        ));
    }
}
