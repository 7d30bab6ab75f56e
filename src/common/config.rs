//! Configuration for filedrop
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! `FILEDROP_*` environment variables. The binary applies CLI flags on top.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FILEDROP_CONFIG";

const ENV_PREFIX: &str = "FILEDROP";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Root directory holding the journal and the blob directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Journal file (defaults to `<data_dir>/journal.txt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,

    /// Blob directory (defaults to `<data_dir>/files`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blobs_dir: Option<PathBuf>,

    /// Durability of each journal append
    #[serde(default)]
    pub journal_sync: JournalSyncPolicy,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Value of `Access-Control-Allow-Origin`
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_upload_bytes() -> u64 {
    1024 * 1024 * 1024
}
fn default_cors_allow_origin() -> String {
    "*".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// How hard `Journal::append` pushes a record to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalSyncPolicy {
    /// Flush and fsync every record
    #[default]
    Always,
    /// Flush to the OS only
    Flush,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            journal_path: None,
            blobs_dir: None,
            journal_sync: JournalSyncPolicy::default(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_allow_origin: default_cors_allow_origin(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the environment.
    ///
    /// When `path` is `None` the file named by `FILEDROP_CONFIG` is used, if set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut builder = config::Config::builder();
        if let Some(file) = file {
            tracing::debug!("Loading config from {}", file.display());
            builder = builder.add_source(config::File::from(file).required(true));
        }
        let config: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.journal_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("journal.txt"))
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.blobs_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("files"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_upload_bytes must be greater than zero".into(),
            ));
        }
        if self.journal_path() == self.blobs_dir() {
            return Err(Error::InvalidConfig(
                "journal_path and blobs_dir must differ".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.journal_path(), PathBuf::from("./data/journal.txt"));
        assert_eq!(config.blobs_dir(), PathBuf::from("./data/files"));
        assert_eq!(config.journal_sync, JournalSyncPolicy::Always);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "bind_addr = '127.0.0.1:7000'\ndata_dir = '/srv/filedrop'\njournal_sync = 'flush'"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.journal_sync, JournalSyncPolicy::Flush);
        assert_eq!(
            config.blobs_dir(),
            PathBuf::from("/srv/filedrop").join("files")
        );
        assert_eq!(config.max_upload_bytes, default_max_upload_bytes());
    }

    #[test]
    fn test_validate_rejects_shared_path() {
        let config = Config {
            journal_path: Some(PathBuf::from("/tmp/x")),
            blobs_dir: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config {
            max_upload_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
