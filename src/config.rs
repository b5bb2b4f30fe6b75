//! Client configuration.
//!
//! [`ClientOptions`] is what callers fill in; every tunable is optional.
//! [`Settings`] is the resolved, immutable form a client runs with.
//! [`Profile`] is the TOML file format the `rft` binary reads.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};
use crate::path::RemoteOs;

/// Default FTP control port
pub const FTP_DEFAULT_PORT: u16 = 21;

/// Default SSH port
pub const SFTP_DEFAULT_PORT: u16 = 22;

/// Connection timeout used when none is given (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ftp => FTP_DEFAULT_PORT,
            Protocol::Sftp => SFTP_DEFAULT_PORT,
        }
    }
}

impl FromStr for Protocol {
    type Err = TransferError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            other => Err(TransferError::Configuration(format!(
                "unknown protocol '{}' (expected 'ftp' or 'sftp')",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ftp => f.write_str("ftp"),
            Protocol::Sftp => f.write_str("sftp"),
        }
    }
}

/// Construction parameters for a transfer client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Protocol driver to use
    pub protocol: Protocol,
    /// Remote server address
    pub hostname: String,
    /// Path convention of the remote server
    pub os: RemoteOs,
    /// Port; the protocol default when absent
    pub port: Option<u16>,
    /// Connection timeout; [`DEFAULT_TIMEOUT`] when absent
    pub timeout: Option<Duration>,
    /// Draw progress bars while transferring
    pub show_progress: bool,
}

impl ClientOptions {
    pub fn new(protocol: Protocol, hostname: impl Into<String>, os: RemoteOs) -> Self {
        Self {
            protocol,
            hostname: hostname.into(),
            os,
            port: None,
            timeout: None,
            show_progress: false,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Validate the options and fill in every default.
    pub fn resolve(self) -> Result<Settings> {
        let hostname = self.hostname.trim().to_string();
        if hostname.is_empty() {
            return Err(TransferError::Configuration(
                "hostname must not be empty".to_string(),
            ));
        }

        let port = match self.port {
            Some(0) => {
                return Err(TransferError::Configuration(
                    "port must be greater than 0".to_string(),
                ))
            }
            Some(port) => port,
            None => self.protocol.default_port(),
        };

        Ok(Settings {
            protocol: self.protocol,
            hostname,
            os: self.os,
            port,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            show_progress: self.show_progress,
        })
    }
}

/// Fully resolved client settings. Fixed for the life of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub protocol: Protocol,
    pub hostname: String,
    pub os: RemoteOs,
    pub port: u16,
    pub timeout: Duration,
    pub show_progress: bool,
}

impl Settings {
    /// `host:port` form used in logs and errors
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Connection profile stored as TOML.
///
/// ```toml
/// protocol = "sftp"
/// hostname = "test.rebex.net"
/// os = "unix"
/// username = "demo"
/// timeout_secs = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub protocol: Protocol,
    pub hostname: String,
    #[serde(default = "default_os")]
    pub os: RemoteOs,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
}

fn default_os() -> RemoteOs {
    RemoteOs::Unix
}

impl Profile {
    /// Load a profile from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            TransferError::Configuration(format!("cannot read profile {:?}: {}", path, e))
        })?;
        Self::parse(&contents).map_err(|reason| {
            TransferError::Configuration(format!("profile {:?}: {}", path, reason))
        })
    }

    /// Parse a profile from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Self::parse(contents).map_err(TransferError::Configuration)
    }

    fn parse(contents: &str) -> std::result::Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.message().to_string())
    }

    pub fn to_options(&self) -> ClientOptions {
        ClientOptions {
            protocol: self.protocol,
            hostname: self.hostname.clone(),
            os: self.os,
            port: self.port,
            timeout: self.timeout_secs.map(Duration::from_secs),
            show_progress: false,
        }
    }
}
