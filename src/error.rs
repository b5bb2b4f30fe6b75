//! Error taxonomy shared by the client and every protocol driver.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Every failure a transfer client can surface.
///
/// Each variant names a distinct cause so callers can branch on it
/// (a missing remote file is not the same as a dropped session).
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Authentication rejected for user '{username}': {reason}")]
    Authentication { username: String, reason: String },

    #[error("Client is already connected")]
    AlreadyConnected,

    #[error("Client is not connected")]
    NotConnected,

    #[error("Remote path unavailable: {path}: {reason}")]
    RemotePath { path: String, reason: String },

    #[error("Remote file not found: {0}")]
    RemoteFileNotFound(String),

    #[error("Failed to read remote file {path}: {reason}")]
    RemoteRead { path: String, reason: String },

    #[error("Failed to write remote file {path}: {reason}")]
    RemoteWrite { path: String, reason: String },

    #[error("Local file not found: {0:?}")]
    LocalFileNotFound(PathBuf),

    #[error("Failed to read local file {path:?}: {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write local file {path:?}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Session error: {0}")]
    Session(String),
}
