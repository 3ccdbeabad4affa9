//! # Configuration Module
//!
//! Layered application configuration.
//!
//! ## Precedence (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config <path>`, or `gradebook.toml` in the working directory)
//! 3. `GRADEBOOK_*` environment variables
//! 4. CLI flags
//!
//! ## Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [storage]
//! backend = "redb"
//! database = "gradebook.db"
//!
//! [security]
//! api_key = "change-me"
//! rate_limit = 100
//! cors_origins = ["https://grades.example.edu"]
//!
//! [logging]
//! format = "json"
//! ```

use gradebook_core::GradebookError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "gradebook.toml";

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// SECTIONS
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// redb database file (ACID, persistent).
    #[default]
    Redb,
    /// In-memory store (volatile).
    Memory,
}

impl FromStr for Backend {
    type Err = GradebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => Err(GradebookError::Config(format!(
                "unknown backend '{}' (expected 'redb' or 'memory')",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => write!(f, "redb"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Backend,
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            database: PathBuf::from("gradebook.db"),
        }
    }
}

/// HTTP security settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// When set, every endpoint except `/health` requires this bearer key.
    pub api_key: Option<String>,
    /// Requests per second across all clients; `0` disables the limiter.
    pub rate_limit: u32,
    /// Allowed CORS origins; `["*"]` allows all, `None` allows localhost only.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = GradebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(GradebookError::Config(format!(
                "unknown log format '{}' (expected 'text' or 'json')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub filter: Option<String>,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, GradebookError> {
        toml::from_str(text).map_err(|e| GradebookError::Config(e.to_string()))
    }

    /// Load the file layer and the environment layer.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, GradebookError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, GradebookError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GradebookError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Apply `GRADEBOOK_*` variables read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), GradebookError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(database) = var("GRADEBOOK_DATABASE") {
            self.storage.database = PathBuf::from(database);
        }
        if let Some(backend) = var("GRADEBOOK_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(key) = var("GRADEBOOK_API_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(limit) = var("GRADEBOOK_RATE_LIMIT") {
            self.security.rate_limit = limit.trim().parse().map_err(|_| {
                GradebookError::Config(format!("GRADEBOOK_RATE_LIMIT is not a number: {}", limit))
            })?;
        }
        if let Some(origins) = var("GRADEBOOK_CORS_ORIGINS") {
            self.security.cors_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
        if let Some(format) = var("GRADEBOOK_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
