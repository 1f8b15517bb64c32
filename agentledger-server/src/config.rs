// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_HTTP_ADDR: &str = "AGENTLEDGER_HTTP_ADDR";
pub const ENV_DB_PATH: &str = "AGENTLEDGER_DB_PATH";
pub const ENV_QUEUE_DIR: &str = agentledger_storage::QUEUE_DIR_ENV;
pub const ENV_FLUSH_INTERVAL: &str = "AGENTLEDGER_FLUSH_INTERVAL";
pub const ENV_RULES_PATH: &str = "AGENTLEDGER_RULES_PATH";

/// Agentledger Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:18730")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable permissive CORS for local dashboards
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Fallback queue directory. Unset resolves to `~/.agentledger/queue`.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Replay the queue once before serving
    #[serde(default = "default_flush_on_startup")]
    pub flush_on_startup: bool,

    /// Seconds between scheduled replays (0 disables)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: None,
            flush_on_startup: default_flush_on_startup(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Category rule file (JSON or TOML). Unset uses the built-in rules.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:18730".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./agentledger.db")
}

fn default_flush_on_startup() -> bool {
    true
}

fn default_flush_interval_secs() -> u64 {
    300
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - AGENTLEDGER_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:18730)
    /// - AGENTLEDGER_DB_PATH: SQLite database path (default: ./agentledger.db)
    /// - AGENTLEDGER_QUEUE_DIR: Fallback queue directory
    /// - AGENTLEDGER_FLUSH_INTERVAL: Seconds between queue replays (default: 300)
    /// - AGENTLEDGER_RULES_PATH: Category rule file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Override fields whose environment variable is set and non-blank.
    fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Same as [`Self::apply_env`], reading variables through `lookup`.
    fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(addr) = env_value(ENV_HTTP_ADDR) {
            self.server.listen_addr = addr;
        }
        if let Some(path) = env_value(ENV_DB_PATH) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(dir) = env_value(ENV_QUEUE_DIR) {
            self.queue.dir = Some(PathBuf::from(dir));
        }
        if let Some(interval) = env_value(ENV_FLUSH_INTERVAL) {
            match interval.parse() {
                Ok(secs) => self.queue.flush_interval_secs = secs,
                Err(_) => tracing::warn!(
                    "Ignoring {}={:?}: not a whole number of seconds",
                    ENV_FLUSH_INTERVAL,
                    interval
                ),
            }
        }
        if let Some(path) = env_value(ENV_RULES_PATH) {
            self.classifier.rules_path = Some(PathBuf::from(path));
        }
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Resolved fallback queue directory
    pub fn queue_dir(&self) -> PathBuf {
        agentledger_storage::resolve_queue_dir(self.queue.dir.as_deref())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()
            .map_err(|e| anyhow::anyhow!("invalid listen_addr {:?}: {}", self.server.listen_addr, e))?;

        if self.storage.db_path.as_os_str().is_empty() {
            anyhow::bail!("storage.db_path must not be empty");
        }

        if let Some(rules) = &self.classifier.rules_path {
            if !rules.exists() {
                anyhow::bail!("classifier rules file not found: {}", rules.display());
            }
        }

        Ok(())
    }
}
