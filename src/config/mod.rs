//! Configuration management.
//!
//! Settings come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. A TOML file (`DUPFIND_CONFIG`, or `config.toml` in the platform config
//!    directory)
//! 3. Environment overrides (`DUPFIND_DATA_DIR`, `DUPFIND_BACKEND`,
//!    `DUPFIND_NEAR_THRESHOLD`)

use crate::services::{DEFAULT_NEAR_THRESHOLD, DEFAULT_NEIGHBORS, ResolverConfig};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DUPFIND_CONFIG";

/// Default vector dimension when none is configured.
pub const DEFAULT_DIMENSIONS: usize = 512;

/// Main configuration for dupfind.
#[derive(Debug, Clone, PartialEq)]
pub struct DupfindConfig {
    /// Directory holding the index database and vector artifacts.
    pub data_dir: PathBuf,
    /// Hash index database, relative to `data_dir` unless absolute.
    pub index_db: PathBuf,
    /// Vector artifact base path, relative to `data_dir` unless absolute.
    pub vector_path: PathBuf,
    /// Requested similarity backend name.
    pub backend: String,
    /// Vector dimension for new backends.
    pub dimensions: usize,
    /// Duplicate resolver settings.
    pub resolver: ResolverSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Resolver section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    /// Squared-L2 near-duplicate threshold.
    pub threshold: f32,
    /// Neighbours examined per vector.
    pub neighbors: usize,
    /// Byte-verify exact groups.
    pub verify_bytes: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_NEAR_THRESHOLD,
            neighbors: DEFAULT_NEIGHBORS,
            verify_bytes: false,
        }
    }
}

impl From<ResolverSettings> for ResolverConfig {
    fn from(settings: ResolverSettings) -> Self {
        Self::default()
            .with_threshold(settings.threshold)
            .with_neighbors(settings.neighbors)
            .with_verify_bytes(settings.verify_bytes)
    }
}

/// Logging section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive such as `info` or `dupfind=debug`.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Index database path.
    pub index_db: Option<String>,
    /// Vector artifact path.
    pub vector_path: Option<String>,
    /// Backend name.
    pub backend: Option<String>,
    /// Vector dimension.
    pub dimensions: Option<usize>,
    /// Resolver section.
    pub resolver: Option<ConfigFileResolver>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Resolver section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileResolver {
    /// Near-duplicate threshold.
    pub threshold: Option<f32>,
    /// Neighbour count.
    pub neighbors: Option<usize>,
    /// Byte verification.
    pub verify_bytes: Option<bool>,
}

impl Default for DupfindConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", "dupfind")
            .map_or_else(|| PathBuf::from(".dupfind"), |dirs| dirs.data_dir().to_path_buf());
        Self {
            data_dir,
            index_db: PathBuf::from("files.db"),
            vector_path: PathBuf::from("vectors.bin"),
            backend: "brute-force".to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            resolver: ResolverSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl DupfindConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::failed("read_config_file", e))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or has unknown keys.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::failed("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location, then applies
    /// environment overrides.
    ///
    /// Checks `DUPFIND_CONFIG` first, then `config.toml` in the platform
    /// config directory. Unreadable files are logged and skipped.
    #[must_use]
    pub fn load_default() -> Self {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let platform = directories::ProjectDirs::from("", "", "dupfind")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        let config = explicit
            .into_iter()
            .chain(platform)
            .filter(|path| path.exists())
            .find_map(|path| match Self::load_from_file(&path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "Loaded config file");
                    Some(config)
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring config file");
                    None
                },
            })
            .unwrap_or_default();

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `DUPFIND_*` overrides read through `lookup`.
    ///
    /// An unparsable threshold is logged and ignored.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DUPFIND_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("DUPFIND_BACKEND") {
            self.backend = backend;
        }
        if let Some(raw) = lookup("DUPFIND_NEAR_THRESHOLD") {
            match raw.trim().parse::<f32>() {
                Ok(threshold) => self.resolver.threshold = threshold,
                Err(e) => tracing::warn!(
                    value = %raw,
                    error = %e,
                    "Ignoring invalid DUPFIND_NEAR_THRESHOLD"
                ),
            }
        }
        self
    }

    /// Converts a `ConfigFile` to `DupfindConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(index_db) = file.index_db {
            config.index_db = PathBuf::from(index_db);
        }
        if let Some(vector_path) = file.vector_path {
            config.vector_path = PathBuf::from(vector_path);
        }
        if let Some(backend) = file.backend {
            config.backend = backend;
        }
        if let Some(dimensions) = file.dimensions {
            config.dimensions = dimensions;
        }
        if let Some(resolver) = file.resolver {
            if let Some(v) = resolver.threshold {
                config.resolver.threshold = v;
            }
            if let Some(v) = resolver.neighbors {
                config.resolver.neighbors = v;
            }
            if let Some(v) = resolver.verify_bytes {
                config.resolver.verify_bytes = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Absolute path of the hash index database.
    #[must_use]
    pub fn index_db_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_db)
    }

    /// Absolute path of the vector artifact.
    #[must_use]
    pub fn vector_artifact_path(&self) -> PathBuf {
        self.data_dir.join(&self.vector_path)
    }
}
