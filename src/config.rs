//! Configuration loaded once at start-up from a JSON file.
//!
//! Secrets may come from the environment instead: `KGX_API_KEY` overrides
//! `llm.api_key` and `KGX_STORE_PASSWORD` overrides the Neo4j password.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ingestion::RetryPolicy;
use crate::memory::Neo4jStoreConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";
pub const DEFAULT_LLM_ENDPOINT: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "doubao-seed-1.6-250615";
pub const DEFAULT_NEO4J_URI: &str = "http://localhost:7474";

const API_KEY_ENV: &str = "KGX_API_KEY";
const STORE_PASSWORD_ENV: &str = "KGX_STORE_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `kgx=debug,warn`.
    pub level: String,
    pub format: LogFormat,
    pub sinks: Vec<LogSink>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            sinks: vec![
                LogSink::File {
                    path: PathBuf::from("log/graph.log"),
                },
                LogSink::Console,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Full,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum LogSink {
    File { path: PathBuf },
    Console,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout_secs: 120,
            max_attempts: 3,
            retry_base_delay_ms: 0,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum StoreConfig {
    Neo4j(Neo4jConfig),
    /// Local JSON file; handy without a database server.
    File { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Neo4j(Neo4jConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_NEO4J_URI.to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Neo4jConfig {
    pub fn to_store_config(&self) -> Neo4jStoreConfig {
        Neo4jStoreConfig {
            uri: self.uri.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl AppConfig {
    /// Reads, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.llm.api_key = key;
        }
        if let (Some(password), StoreConfig::Neo4j(neo4j)) =
            (lookup(STORE_PASSWORD_ENV), &mut self.store)
        {
            neo4j.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.endpoint est vide".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model est vide".to_string()));
        }
        if self.llm.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "llm.max_attempts doit être au moins 1".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "llm.timeout_secs doit être positif".to_string(),
            ));
        }
        if let StoreConfig::Neo4j(neo4j) = &self.store {
            if neo4j.uri.trim().is_empty() {
                return Err(ConfigError::Invalid("store.uri est vide".to_string()));
            }
            if neo4j.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "store.timeout_secs doit être positif".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(write_err)
    }
}
