//! SFTP driver built on `ssh2` (libssh2).
//!
//! ## Session Setup
//!
//! ```text
//! TCP connect (timeout) -> SSH handshake (timeout) -> password auth (timeout)
//!                       -> timeout cleared -> SFTP subsystem -> realpath(".")
//! ```
//!
//! The SFTP subsystem has no server-side working directory. The driver
//! keeps one itself and resolves relative paths against it.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ssh2::{ErrorCode, Session, Sftp};
use tracing::debug;

use crate::config::{Protocol, Settings};
use crate::driver::{open_tcp, ProtocolDriver};
use crate::error::{Result, TransferError};
use crate::path::{PathPolicy, RemoteOs};
use crate::stream::pump;

/// `SSH_FX_NO_SUCH_FILE`
const FX_NO_SUCH_FILE: i32 = 2;
/// `SSH_FX_PERMISSION_DENIED`
const FX_PERMISSION_DENIED: i32 = 3;
/// `SSH_FX_NO_SUCH_PATH`
const FX_NO_SUCH_PATH: i32 = 10;
/// `LIBSSH2_ERROR_AUTHENTICATION_FAILED`
const AUTHENTICATION_FAILED: i32 = -18;
/// `LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED`
const PUBLICKEY_UNVERIFIED: i32 = -19;

/// Authenticated SFTP channel plus the locally tracked directory
struct SftpChannel {
    sftp: Sftp,
    os: RemoteOs,
    cwd: String,
}

/// SFTP implementation of [`ProtocolDriver`]
#[derive(Default)]
pub struct SftpDriver {
    session: Option<Session>,
    channel: Option<SftpChannel>,
    /// Remote OS from the settings of the open session
    os: Option<RemoteOs>,
    endpoint: String,
}

impl SftpDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&mut self) -> Result<&mut SftpChannel> {
        self.channel.as_mut().ok_or(TransferError::NotConnected)
    }
}

impl SftpChannel {
    fn resolve(&self, path: &str) -> String {
        resolve_remote(self.os, &self.cwd, path)
    }
}

/// Rewrite a path built with the server's convention into SFTP wire form.
/// The wire always uses `/`; OpenSSH on Windows exposes drives as `/C:/...`.
fn wire_path(os: RemoteOs, path: &str) -> String {
    match os {
        RemoteOs::Unix => path.to_string(),
        RemoteOs::Windows => {
            let unified = path.replace('\\', "/");
            if PathPolicy::new(os).is_absolute(&unified) && !unified.starts_with('/') {
                format!("/{}", unified)
            } else {
                unified
            }
        }
    }
}

/// Wire path for `path` as seen from the working directory `cwd`
fn resolve_remote(os: RemoteOs, cwd: &str, path: &str) -> String {
    resolve_against(cwd, &wire_path(os, path))
}

/// Anchor a relative path at a working directory. SFTP paths always use `/`.
fn resolve_against(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else if cwd.ends_with('/') {
        format!("{}{}", cwd, path)
    } else {
        format!("{}/{}", cwd, path)
    }
}

fn sftp_status(err: &ssh2::Error) -> Option<i32> {
    match err.code() {
        ErrorCode::SFTP(code) => Some(code),
        ErrorCode::Session(_) => None,
    }
}

/// Only a refused credential is an authentication failure; timeouts and
/// dropped sockets during login are transport failures.
fn auth_error(endpoint: &str, username: &str, err: &ssh2::Error) -> TransferError {
    match err.code() {
        ErrorCode::Session(AUTHENTICATION_FAILED) | ErrorCode::Session(PUBLICKEY_UNVERIFIED) => {
            TransferError::Authentication {
                username: username.to_string(),
                reason: err.message().to_string(),
            }
        }
        _ => TransferError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!("SSH login failed: {}", err),
        },
    }
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

impl ProtocolDriver for SftpDriver {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    fn connect(&mut self, settings: &Settings) -> Result<()> {
        if self.session.is_some() {
            return Err(TransferError::AlreadyConnected);
        }

        let endpoint = settings.endpoint();
        let connection_error = |reason: String| TransferError::Connection {
            endpoint: endpoint.clone(),
            reason,
        };

        let tcp = open_tcp(settings)?;

        let mut session =
            Session::new().map_err(|e| connection_error(format!("SSH session: {}", e)))?;
        // libssh2 takes milliseconds; zero would mean "no limit"
        let timeout_ms = settings.timeout.as_millis().clamp(1, u32::MAX as u128) as u32;
        session.set_timeout(timeout_ms);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connection_error(format!("SSH handshake failed: {}", e)))?;

        if let Some(banner) = session.banner() {
            debug!("SSH banner: {}", banner);
        }

        self.endpoint = endpoint;
        self.os = Some(settings.os);
        self.session = Some(session);
        Ok(())
    }

    fn authenticate(&mut self, username: &str, password: &str) -> Result<String> {
        let session = self.session.as_ref().ok_or(TransferError::NotConnected)?;

        session
            .userauth_password(username, password)
            .map_err(|e| auth_error(&self.endpoint, username, &e))?;

        if !session.authenticated() {
            return Err(TransferError::Authentication {
                username: username.to_string(),
                reason: "server did not accept the credentials".to_string(),
            });
        }

        // The timeout only bounds connection setup
        session.set_timeout(0);

        let sftp = session
            .sftp()
            .map_err(|e| TransferError::Session(format!("SFTP subsystem unavailable: {}", e)))?;
        let home = sftp
            .realpath(Path::new("."))
            .map(path_string)
            .map_err(|e| TransferError::Session(format!("cannot resolve login directory: {}", e)))?;

        debug!("SFTP login directory on {}: {}", self.endpoint, home);
        self.channel = Some(SftpChannel {
            sftp,
            os: self.os.unwrap_or(RemoteOs::Unix),
            cwd: home.clone(),
        });
        Ok(home)
    }

    fn current_dir(&mut self) -> Result<String> {
        Ok(self.channel()?.cwd.clone())
    }

    fn change_dir(&mut self, directory: &str) -> Result<String> {
        let channel = self.channel()?;
        let target = channel.resolve(directory);
        let remote_path_error = |reason: String| TransferError::RemotePath {
            path: target.clone(),
            reason,
        };

        let real = channel
            .sftp
            .realpath(Path::new(&target))
            .map_err(|e| remote_path_error(e.message().to_string()))?;
        let stat = channel
            .sftp
            .stat(&real)
            .map_err(|e| remote_path_error(e.message().to_string()))?;
        if !stat.is_dir() {
            return Err(remote_path_error("not a directory".to_string()));
        }

        channel.cwd = path_string(real);
        Ok(channel.cwd.clone())
    }

    fn retrieve(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64> {
        let channel = self.channel()?;
        let path = channel.resolve(remote_path);

        let mut file = channel.sftp.open(Path::new(&path)).map_err(|e| {
            match sftp_status(&e) {
                Some(FX_NO_SUCH_FILE) | Some(FX_NO_SUCH_PATH) => {
                    TransferError::RemoteFileNotFound(path.clone())
                }
                Some(FX_PERMISSION_DENIED) => TransferError::RemotePath {
                    path: path.clone(),
                    reason: "permission denied".to_string(),
                },
                _ => TransferError::RemotePath {
                    path: path.clone(),
                    reason: e.message().to_string(),
                },
            }
        })?;

        pump(&mut file, sink).map_err(|e| TransferError::RemoteRead {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    fn store(&mut self, remote_path: &str, source: &mut dyn Read) -> Result<u64> {
        let channel = self.channel()?;
        let path = channel.resolve(remote_path);
        let remote_write_error = |reason: String| TransferError::RemoteWrite {
            path: path.clone(),
            reason,
        };

        let mut file = channel
            .sftp
            .create(Path::new(&path))
            .map_err(|e| remote_write_error(e.message().to_string()))?;

        pump(source, &mut file).map_err(|e| remote_write_error(e.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        // The SFTP channel must go before the session it runs on
        self.channel.take();
        self.os = None;

        match self.session.take() {
            Some(session) => session
                .disconnect(None, "closing session", None)
                .map_err(|e| TransferError::Session(format!("SSH disconnect failed: {}", e))),
            None => Ok(()),
        }
    }
}
