//! Configuration for the storage service.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `CLOUDSTORE__`)
//! 2. YAML configuration file
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `CLOUDSTORE__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `CLOUDSTORE__TIMEOUT=30s` sets the deadline for transfers
//! - `CLOUDSTORE__STORAGE__TYPE=filesystem` sets the storage type
//! - `CLOUDSTORE__STORAGE__PATH=/data` sets the directory name
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! timeout: 30s
//!
//! storage:
//!   type: filesystem
//!   path: /data
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CLOUDSTORE__";

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// [Google Cloud Storage] backend (type `"gcs"`).
    ///
    /// Authentication uses Application Default Credentials, which can be provided via the
    /// `GOOGLE_APPLICATION_CREDENTIALS` environment variable or the GCE/GKE metadata service.
    ///
    /// [Google Cloud Storage]: https://cloud.google.com/storage
    Gcs {
        /// Optional custom GCS endpoint URL.
        ///
        /// Useful for testing with emulators. If set, requests are sent without authentication.
        #[serde(default)]
        endpoint: Option<String>,
    },

    /// Local filesystem storage backend (type `"filesystem"`).
    ///
    /// Every bucket is a directory below `path`.
    FileSystem {
        /// Directory path for storing objects.
        path: PathBuf,
    },

    /// Non-persistent storage that lives as long as the service (type `"memory"`).
    Memory,
}

impl Default for Storage {
    fn default() -> Self {
        Self::Gcs { endpoint: None }
    }
}

/// Main configuration struct for the storage service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The backend that stores objects.
    pub storage: Storage,

    /// Deadline for a single transfer, metadata request, or network import.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Deadline for a complete prefix listing, across all of its pages.
    ///
    /// # Default
    ///
    /// `30s`
    #[serde(with = "humantime_serde")]
    pub list_timeout: Duration,

    /// Deadline for establishing a connection to the store or to a network file's host.
    ///
    /// # Default
    ///
    /// `10s`
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: Storage::default(),
            timeout: Duration::from_secs(60),
            list_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, and the environment.
    ///
    /// Later sources override earlier ones.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}
