//! # Configuration
//!
//! Optional TOML file plus command-line overrides.
//!
//! ```toml
//! [storage]
//! database = "olympiad.redb"
//! backend = "redb"          # or "file"
//!
//! [generation]
//! default_group_count = 2
//!
//! [logging]
//! format = "text"           # or "json"
//! ```
//!
//! Precedence: command line, then file, then built-in defaults.

use olympiad_core::StageError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "olympiad.toml";

/// Database path used when neither the command line nor the file names one.
pub const DEFAULT_DATABASE: &str = "olympiad.redb";

/// Group count used by `generate` when neither `--groups` nor the file sets one.
pub const DEFAULT_GROUP_COUNT: usize = 2;

/// Largest config file accepted (64 KB).
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

// =============================================================================
// FILE MODEL
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub storage: StorageSection,
    pub generation: GenerationSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub database: Option<PathBuf>,
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSection {
    pub default_group_count: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub format: Option<String>,
}

impl FileConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, StageError> {
        toml::from_str(text)
            .map_err(|e| StageError::InvalidArgument(format!("Invalid config file: {}", e)))
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, StageError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            StageError::Storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(StageError::InvalidArgument(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            StageError::Storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `explicit` if given (it must exist), else `olympiad.toml` if present,
    /// else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, StageError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// Storage backend selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// redb database (ACID, updated in place).
    Redb,
    /// Snapshot file rewritten after every change.
    File,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Redb => f.write_str("redb"),
            Backend::File => f.write_str("file"),
        }
    }
}

impl FromStr for Backend {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Backend::Redb),
            "file" => Ok(Backend::File),
            other => Err(StageError::InvalidArgument(format!(
                "Unknown backend '{}' (expected 'redb' or 'file')",
                other
            ))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `OLYMPIAD_LOG_FORMAT` wins over the file; anything but "json" is text.
    #[must_use]
    pub fn resolve(env: Option<&str>, file: &FileConfig) -> Self {
        match env.or(file.logging.format.as_deref()) {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Everything a command needs to know about where and how to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub backend: Backend,
    pub default_group_count: usize,
    pub json_mode: bool,
}

impl Settings {
    pub fn resolve(
        database: Option<PathBuf>,
        backend: Option<&str>,
        json_mode: bool,
        file: &FileConfig,
    ) -> Result<Self, StageError> {
        let database = database
            .or_else(|| file.storage.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        let backend = match backend.or(file.storage.backend.as_deref()) {
            Some(name) => name.parse()?,
            None => Backend::Redb,
        };
        let default_group_count = file
            .generation
            .default_group_count
            .unwrap_or(DEFAULT_GROUP_COUNT);

        Ok(Self {
            database,
            backend,
            default_group_count,
            json_mode,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
