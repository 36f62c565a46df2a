//! Configuration for the migration engine and its tooling
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (doc-schemas.toml)
//! - Environment variables (DOCSCHEMAS__*)
//!
//! ## Example config file (doc-schemas.toml):
//! ```toml
//! [validation]
//! unknown_props = "reject"
//! validate_after_migrate = true
//!
//! [ingest]
//! unknown_types = "drop"
//! invalid_records = "fail"
//!
//! [output]
//! format = "pretty"
//!
//! [logging]
//! filter = "info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validate::UnknownKeys;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// What to do with records that cannot be accepted on load
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Output settings for the CLI
    #[serde(default)]
    pub output: OutputConfig,

    /// Log filter settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Treatment of props a contract does not declare
    #[serde(default)]
    pub unknown_props: UnknownKeys,

    /// Validate every record after migrating
    #[serde(default = "default_true")]
    pub validate_after_migrate: bool,
}

/// Per-record policy applied by the ingest pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPolicy {
    /// Reject the whole snapshot
    #[default]
    Fail,
    /// Drop the offending record and keep going
    Drop,
}

/// Ingest configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Records whose type has no registered contract
    #[serde(default)]
    pub unknown_types: RecordPolicy,

    /// Records that fail their contract after migration
    #[serde(default)]
    pub invalid_records: RecordPolicy,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            unknown_props: UnknownKeys::Reject,
            validate_after_migrate: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl OutputFormat {
    /// Serialize a value according to this format
    pub fn render<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::Pretty => serde_json::to_string_pretty(value),
            OutputFormat::Compact => serde_json::to_string(value),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "doc-schemas.toml",
            ".doc-schemas.toml",
            "config/doc-schemas.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "doc-schemas") {
            let xdg_config = config_dir.config_dir().join("doc-schemas.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DOCSCHEMAS__INGEST__UNKNOWN_TYPES=drop
        builder = builder.add_source(
            Environment::with_prefix("DOCSCHEMAS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
