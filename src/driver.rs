//! Protocol driver abstraction.
//!
//! A [`ProtocolDriver`] is the capability set the client orchestrates:
//!
//! ```text
//!   connect ──> authenticate ──> { current_dir, change_dir, retrieve, store }* ──> close
//! ```
//!
//! The client picks a driver once at construction and never branches on the
//! protocol afterwards. Drivers report failures as [`TransferError`]s; the
//! client re-attributes a failed copy to the local file when the local
//! reader/writer recorded its own error.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::config::{Protocol, Settings};
use crate::error::{Result, TransferError};
use crate::ftp::FtpDriver;
use crate::sftp::SftpDriver;

/// Operations every wire protocol must provide.
pub trait ProtocolDriver {
    /// Protocol this driver speaks
    fn protocol(&self) -> Protocol;

    /// Open the transport and complete the protocol handshake.
    fn connect(&mut self, settings: &Settings) -> Result<()>;

    /// Log in on an open transport. Returns the initial working directory.
    fn authenticate(&mut self, username: &str, password: &str) -> Result<String>;

    /// Working directory as the driver currently knows it.
    fn current_dir(&mut self) -> Result<String>;

    /// Change the working directory. Returns the resolved directory.
    fn change_dir(&mut self, directory: &str) -> Result<String>;

    /// Stream the remote file at `remote_path` into `sink`.
    fn retrieve(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64>;

    /// Stream `source` into the remote file at `remote_path`, replacing it.
    fn store(&mut self, remote_path: &str, source: &mut dyn Read) -> Result<u64>;

    /// Tear down whatever transport is open. No-op when nothing is.
    fn close(&mut self) -> Result<()>;
}

/// Build the stock driver for a protocol.
pub fn driver_for(protocol: Protocol) -> Box<dyn ProtocolDriver> {
    match protocol {
        Protocol::Ftp => Box::new(FtpDriver::new()),
        Protocol::Sftp => Box::new(SftpDriver::new()),
    }
}

/// Resolve `hostname:port` to socket addresses.
pub(crate) fn resolve_addrs(settings: &Settings) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (settings.hostname.as_str(), settings.port)
        .to_socket_addrs()
        .map_err(|e| TransferError::Connection {
            endpoint: settings.endpoint(),
            reason: format!("address resolution failed: {}", e),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransferError::Connection {
            endpoint: settings.endpoint(),
            reason: "host resolved to no addresses".to_string(),
        });
    }

    debug!("{} resolved to {:?}", settings.endpoint(), addrs);
    Ok(addrs)
}

/// Try each resolved address in turn until one accepts.
pub(crate) fn connect_any<T, F>(settings: &Settings, mut attempt: F) -> Result<T>
where
    F: FnMut(SocketAddr) -> std::result::Result<T, String>,
{
    let mut last_error = String::new();

    for addr in resolve_addrs(settings)? {
        match attempt(addr) {
            Ok(connected) => return Ok(connected),
            Err(e) => {
                debug!("Connection attempt to {} failed: {}", addr, e);
                last_error = e;
            }
        }
    }

    Err(TransferError::Connection {
        endpoint: settings.endpoint(),
        reason: last_error,
    })
}

/// Open a plain TCP stream bounded by the settings' timeout.
pub(crate) fn open_tcp(settings: &Settings) -> Result<TcpStream> {
    connect_any(settings, |addr| {
        TcpStream::connect_timeout(&addr, settings.timeout).map_err(|e| e.to_string())
    })
}
