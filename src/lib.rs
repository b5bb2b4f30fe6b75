//! Remote File Transfer
//!
//! One blocking client API for uploading and downloading files over FTP or
//! SFTP.
//!
//! ## Features
//! - Protocol chosen once at construction; the client never branches on it
//! - Remote paths joined with the server's convention (`/` or `\`)
//! - Default ports (21/22) and connection timeout resolved up front
//! - Atomic downloads via temp file + rename
//! - SHA-256 digest and byte count for every transfer
//!
//! ## Usage
//!
//! ```no_run
//! use remote_file_transfer::{ClientOptions, Protocol, RemoteOs, TransferClient};
//!
//! # fn main() -> Result<(), remote_file_transfer::TransferError> {
//! let mut client = TransferClient::new(ClientOptions::new(
//!     Protocol::Sftp,
//!     "test.rebex.net",
//!     RemoteOs::Unix,
//! ))?;
//! client.connection("demo", "password")?;
//! client.cwd(Some("pub/example"))?;
//! client.get("readme.txt", None, None)?;
//! client.set_default_directory()?;
//! client.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod ftp;
pub mod path;
pub mod sftp;
pub mod stream;

pub use client::{TransferClient, TransferReport};
pub use config::{ClientOptions, Profile, Protocol, Settings};
pub use driver::ProtocolDriver;
pub use error::{Result, TransferError};
pub use ftp::FtpDriver;
pub use path::{PathPolicy, RemoteOs};
pub use sftp::SftpDriver;
