//! Configuration options.
//!
//! The controller reads an optional TOML file. Every key has a default, so an
//! empty file (or no file at all) yields a controller listening on all
//! interfaces on the standard OpenFlow port:
//! ```toml
//! listen_addr = "0.0.0.0"
//! port = 6633
//! tcp_nodelay = true
//! ```

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port switches connect to unless configured otherwise.
pub const DEFAULT_OFP_PORT: u16 = 6633;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ControllerConfig, ConfigError> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ControllerConfig::from_toml_str(&config_str)?;
    log::debug!("loaded {:?} from {}", config, path.display());
    Ok(config)
}

/// Loads the default configuration.
pub fn default_config() -> ControllerConfig {
    ControllerConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Controller configuration options.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Address to accept switch connections on. Defaults to `0.0.0.0`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    /// TCP port to accept switch connections on. Defaults to `6633`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Disable Nagle's algorithm on accepted connections. Defaults to `true`.
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// Seconds a session may wait for the next message before it is closed.
    /// Unset means wait forever.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,

    /// Seconds a single write may block before the session is closed.
    /// Unset means wait forever.
    #[serde(default)]
    pub write_timeout_secs: Option<u64>,
}

impl ControllerConfig {
    pub fn from_toml_str(s: &str) -> Result<ControllerConfig, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            listen_addr: default_listen_addr(),
            port: default_port(),
            tcp_nodelay: default_tcp_nodelay(),
            read_timeout_secs: None,
            write_timeout_secs: None,
        }
    }
}

fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_OFP_PORT
}

fn default_tcp_nodelay() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(config, default_config());
        assert_eq!(config.port, 6633);
        assert!(config.tcp_nodelay);
        assert_eq!(config.read_timeout(), None);
    }

    #[test]
    fn keys_override_defaults() {
        let config = ControllerConfig::from_toml_str(
            r#"
            listen_addr = "127.0.0.1"
            port = 16633
            tcp_nodelay = false
            read_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 16633);
        assert!(!config.tcp_nodelay);
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.write_timeout(), None);
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = ControllerConfig::from_toml_str("write_timeout_secs = 0").unwrap();
        assert_eq!(config.write_timeout(), None);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            ControllerConfig::from_toml_str("port = \"six\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            load_config("/nonexistent/oflow.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
