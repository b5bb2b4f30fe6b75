//! FTP driver built on `suppaftp`'s blocking client.
//!
//! The server keeps the working directory, so `change_dir` is a `CWD`
//! followed by a `PWD` to learn the resolved path. Transfers run in binary
//! mode over a fresh data connection each time.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use tracing::{debug, warn};

use crate::config::{Protocol, Settings};
use crate::driver::{open_tcp, ProtocolDriver};
use crate::error::{Result, TransferError};
use crate::stream::pump;

/// FTP implementation of [`ProtocolDriver`]
#[derive(Default)]
pub struct FtpDriver {
    stream: Option<FtpStream>,
    /// Handle on the control socket until its login deadline is lifted
    control: Option<TcpStream>,
    endpoint: String,
}

impl FtpDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> Result<&mut FtpStream> {
        self.stream.as_mut().ok_or(TransferError::NotConnected)
    }
}

/// Reply code carried by an FTP error, if the server sent one
fn reply_status(err: &FtpError) -> Option<Status> {
    match err {
        FtpError::UnexpectedResponse(response) => Some(response.status),
        _ => None,
    }
}

/// Only a 530 reply means the credentials were refused; anything else
/// during login is a transport or server failure.
fn login_error(endpoint: &str, username: &str, err: FtpError) -> TransferError {
    match reply_status(&err) {
        Some(Status::NotLoggedIn) => TransferError::Authentication {
            username: username.to_string(),
            reason: err.to_string(),
        },
        _ => TransferError::Connection {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        },
    }
}

fn set_control_timeout(tcp: &TcpStream, timeout: Option<Duration>) -> io::Result<()> {
    tcp.set_read_timeout(timeout)?;
    tcp.set_write_timeout(timeout)
}

fn session_error(err: FtpError) -> TransferError {
    match err {
        FtpError::ConnectionError(e) => {
            TransferError::Session(format!("control connection lost: {}", e))
        }
        other => TransferError::Session(other.to_string()),
    }
}

impl ProtocolDriver for FtpDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    fn connect(&mut self, settings: &Settings) -> Result<()> {
        if self.stream.is_some() {
            return Err(TransferError::AlreadyConnected);
        }

        let endpoint = settings.endpoint();
        let connection_error = |reason: String| TransferError::Connection {
            endpoint: endpoint.clone(),
            reason,
        };

        // The greeting and login are read under the same deadline as the
        // TCP connect; authenticate() lifts it afterwards.
        let tcp = open_tcp(settings)?;
        set_control_timeout(&tcp, Some(settings.timeout).filter(|t| !t.is_zero()))
            .map_err(|e| connection_error(e.to_string()))?;
        let control = tcp
            .try_clone()
            .map_err(|e| connection_error(e.to_string()))?;

        let stream = FtpStream::connect_with_stream(tcp)
            .map_err(|e| connection_error(format!("FTP greeting failed: {}", e)))?;

        if let Some(welcome) = stream.get_welcome_msg() {
            debug!("FTP welcome: {}", welcome.trim());
        }

        self.endpoint = endpoint;
        self.control = Some(control);
        self.stream = Some(stream);
        Ok(())
    }

    fn authenticate(&mut self, username: &str, password: &str) -> Result<String> {
        let endpoint = self.endpoint.clone();
        let stream = self.stream()?;

        stream
            .login(username, password)
            .map_err(|e| login_error(&endpoint, username, e))?;

        stream.transfer_type(FileType::Binary).map_err(session_error)?;

        let home = stream.pwd().map_err(session_error)?;
        debug!("FTP login directory: {}", home);

        if let Some(control) = self.control.take() {
            set_control_timeout(&control, None).map_err(|e| {
                TransferError::Session(format!("cannot clear control timeout: {}", e))
            })?;
        }
        Ok(home)
    }

    fn current_dir(&mut self) -> Result<String> {
        self.stream()?.pwd().map_err(session_error)
    }

    fn change_dir(&mut self, directory: &str) -> Result<String> {
        let stream = self.stream()?;

        stream.cwd(directory).map_err(|e| match reply_status(&e) {
            Some(_) => TransferError::RemotePath {
                path: directory.to_string(),
                reason: e.to_string(),
            },
            None => session_error(e),
        })?;

        stream.pwd().map_err(session_error)
    }

    fn retrieve(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64> {
        let stream = self.stream()?;

        let mut data = stream.retr_as_stream(remote_path).map_err(|e| {
            match reply_status(&e) {
                Some(Status::FileUnavailable) => {
                    TransferError::RemoteFileNotFound(remote_path.to_string())
                }
                Some(_) => TransferError::RemotePath {
                    path: remote_path.to_string(),
                    reason: e.to_string(),
                },
                None => session_error(e),
            }
        })?;

        let copied = pump(&mut data, sink);

        let finalized = stream.finalize_retr_stream(data);

        let bytes = copied.map_err(|e| {
            if let Err(close_err) = &finalized {
                warn!("RETR {} did not finish cleanly: {}", remote_path, close_err);
            }
            TransferError::RemoteRead {
                path: remote_path.to_string(),
                reason: e.to_string(),
            }
        })?;

        finalized.map_err(|e| TransferError::RemoteRead {
            path: remote_path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(bytes)
    }

    fn store(&mut self, remote_path: &str, mut source: &mut dyn Read) -> Result<u64> {
        self.stream()?
            .put_file(remote_path, &mut source)
            .map_err(|e| TransferError::RemoteWrite {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })
    }

    fn close(&mut self) -> Result<()> {
        self.control = None;
        match self.stream.take() {
            Some(mut stream) => stream.quit().map_err(session_error),
            None => Ok(()),
        }
    }
}
