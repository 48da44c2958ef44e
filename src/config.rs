//! Configuration: where the sheet lives, where memos and the ledger go,
//! and how to reach the analyst endpoint.
//!
//! Loaded from a JSON file (`~/.dealdesk/config.json` by default,
//! `--config` to override) and validated before any pass runs — a config
//! problem should fail at startup, not three network calls in.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::normalize_key;

/// Default memo directory, relative to the working directory.
const DEFAULT_ANALYSIS_DIR: &str = "analysis";

/// Default ledger file, relative to the working directory.
const DEFAULT_LEDGER_PATH: &str = "token_database.json";

/// Default cap on enrichments per sync pass.
const DEFAULT_MAX_BATCH: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google Sheets view/edit URL of the application form responses.
    pub sheet_url: String,

    #[serde(default = "default_analysis_dir")]
    pub analysis_dir: PathBuf,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Enrichments per sync invocation; the rest is deferred.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default)]
    pub analyst: AnalystConfig,

    /// Route aliases for names that simple transforms cannot unify:
    /// display alias → memo filename. Keys are normalized at load, so
    /// "Graphio.ai" and "GraphioAI" are the same alias.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        AnalystConfig {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_analysis_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ANALYSIS_DIR)
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_PATH)
}

fn default_max_batch() -> usize {
    DEFAULT_MAX_BATCH
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    8000
}

/// Default config location: `~/.dealdesk/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dealdesk")
        .join("config.json")
}

impl Config {
    /// Load and sanity-check a config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.display().to_string()))
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mut config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if config.sheet_url.trim().is_empty() {
            return Err(ConfigError::EmptyField("sheet_url"));
        }

        // Normalize alias keys once at load; lookups use the same form.
        config.aliases = config
            .aliases
            .into_iter()
            .map(|(alias, file)| (normalize_key(&alias), file))
            .collect();

        Ok(config)
    }
}
