use serde::{Deserialize, Serialize};
use std::path::Path;

/// Registry capacity used when nothing else is configured
pub const DEFAULT_MAX_EXTENSIONS_PER_ACCOUNT: usize = 10;
/// Computation units granted to every extension invocation
pub const DEFAULT_EXTENSION_CALL_BUDGET: u64 = 200_000;
/// Bytes of return data the dispatcher will copy back from an extension
pub const DEFAULT_RETURN_DATA_CAP: usize = 32;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HookLedgerConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings fixed at ledger construction.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    #[serde(default = "default_max_extensions")]
    pub max_extensions_per_account: usize,
    #[serde(default = "default_call_budget")]
    pub extension_call_budget: u64,
    #[serde(default = "default_return_data_cap")]
    pub return_data_cap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_extensions() -> usize {
    DEFAULT_MAX_EXTENSIONS_PER_ACCOUNT
}

fn default_call_budget() -> u64 {
    DEFAULT_EXTENSION_CALL_BUDGET
}

fn default_return_data_cap() -> usize {
    DEFAULT_RETURN_DATA_CAP
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_extensions_per_account: DEFAULT_MAX_EXTENSIONS_PER_ACCOUNT,
            extension_call_budget: DEFAULT_EXTENSION_CALL_BUDGET,
            return_data_cap: DEFAULT_RETURN_DATA_CAP,
        }
    }
}

impl LedgerConfig {
    pub fn with_max_extensions(mut self, max: usize) -> Self {
        self.max_extensions_per_account = max;
        self
    }

    pub fn with_call_budget(mut self, budget: u64) -> Self {
        self.extension_call_budget = budget;
        self
    }

    pub fn with_return_data_cap(mut self, cap: usize) -> Self {
        self.return_data_cap = cap;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for HookLedgerConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write default config to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render default config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Where [`HookLedgerConfig::load_or_init`] got its configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    CreatedDefault,
}

impl HookLedgerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load `path`, or write the defaults there when it does not exist yet.
    ///
    /// Nothing is logged here: this runs before the subscriber is installed,
    /// so callers report the outcome once logging is up.
    pub fn load_or_init(path: &Path) -> Result<(Self, ConfigSource), ConfigError> {
        if path.exists() {
            return Ok((Self::load(path)?, ConfigSource::File));
        }

        let config = Self::default();
        let text = toml::to_string_pretty(&config)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok((config, ConfigSource::CreatedDefault))
    }
}
