//! Layered configuration: CLI flag > environment > config file > default.

use brainport_remote::{ClientConfig, EndpointLayout};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "BRAINPORT_API_KEY";
pub const BASE_URL_ENV: &str = "BRAINPORT_BASE_URL";
pub const BRAIN_ID_ENV: &str = "BRAINPORT_BRAIN_ID";

pub const DEFAULT_SOURCE: &str = "data/thebrain-knowledge-graph.json";
pub const DEFAULT_BATCH_DIR: &str = "data";
pub const DEFAULT_STATE_DIR: &str = "data/import_state";
pub const DEFAULT_DELAY_MS: u64 = 100;
pub const DEFAULT_CHECKPOINT_EVERY: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no {what} configured (use {flag}, set {env}, or add `{key}` to the config file)")]
    Missing {
        what: &'static str,
        flag: &'static str,
        env: &'static str,
        key: &'static str,
    },
    #[error("the import requires BRAINPORT_API_KEY (set it in your env; do not put secrets in config files)")]
    MissingApiKey,
}

/// One configuration layer. Every field is optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrainportConfig {
    pub base_url: Option<String>,
    pub brain_id: Option<String>,
    pub layout: Option<EndpointLayout>,
    pub timeout_secs: Option<u64>,
    pub source: Option<PathBuf>,
    pub batch_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub delay_ms: Option<u64>,
    pub checkpoint_every: Option<usize>,
}

impl BrainportConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The environment layer, read through `lookup` so tests need not touch
    /// the process environment.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            base_url: non_empty(BASE_URL_ENV),
            brain_id: non_empty(BRAIN_ID_ENV),
            ..Self::default()
        }
    }

    /// Fields set in `over` win.
    pub fn overlay(self, over: BrainportConfig) -> Self {
        Self {
            base_url: over.base_url.or(self.base_url),
            brain_id: over.brain_id.or(self.brain_id),
            layout: over.layout.or(self.layout),
            timeout_secs: over.timeout_secs.or(self.timeout_secs),
            source: over.source.or(self.source),
            batch_dir: over.batch_dir.or(self.batch_dir),
            state_dir: over.state_dir.or(self.state_dir),
            delay_ms: over.delay_ms.or(self.delay_ms),
            checkpoint_every: over.checkpoint_every.or(self.checkpoint_every),
        }
    }

    /// Stack `file < env < cli`.
    pub fn resolve(
        file: Option<BrainportConfig>,
        env: BrainportConfig,
        cli: BrainportConfig,
    ) -> Self {
        file.unwrap_or_default().overlay(env).overlay(cli)
    }

    pub fn source_path(&self) -> PathBuf {
        self.source.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE))
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.batch_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BATCH_DIR))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.unwrap_or(DEFAULT_DELAY_MS))
    }

    pub fn checkpoint_every(&self) -> usize {
        self.checkpoint_every.unwrap_or(DEFAULT_CHECKPOINT_EVERY)
    }

    pub fn client_config(&self, api_key: String) -> Result<ClientConfig, ConfigError> {
        let base_url = self.base_url.clone().ok_or(ConfigError::Missing {
            what: "base URL",
            flag: "--base-url",
            env: BASE_URL_ENV,
            key: "base_url",
        })?;
        let brain_id = self.brain_id.clone().ok_or(ConfigError::Missing {
            what: "brain id",
            flag: "--brain-id",
            env: BRAIN_ID_ENV,
            key: "brain_id",
        })?;

        Ok(ClientConfig::new(base_url, brain_id, api_key)
            .with_layout(self.layout.unwrap_or_default())
            .with_timeout(Duration::from_secs(
                self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            )))
    }
}

pub fn api_key(lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    let key = lookup(API_KEY_ENV).unwrap_or_default();
    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(ConfigError::MissingApiKey);
    }
    Ok(key)
}
