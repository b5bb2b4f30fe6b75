//! Protocol-agnostic transfer client.
//!
//! [`TransferClient`] owns exactly one protocol driver and one remote path
//! policy, both fixed at construction:
//!
//! ```text
//!                  TransferClient
//!   ┌───────────────────────────────────────────┐
//!   │  Settings (port/timeout resolved once)    │
//!   │  PathPolicy (unix "/" | win "\")          │
//!   │  SessionState ── Disconnected             │
//!   │               └─ Connected { home, cwd }  │
//!   └──────────────────────┬────────────────────┘
//!                          │ Box<dyn ProtocolDriver>
//!               ┌──────────┴──────────┐
//!           FtpDriver             SftpDriver
//!          (suppaftp)               (ssh2)
//! ```
//!
//! ## Download Safety
//!
//! `get` writes into a temporary file beside the target and renames it
//! into place only after the driver reports success. A failed download
//! removes the temporary file and leaves any existing target untouched.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::config::{ClientOptions, Protocol, Settings};
use crate::driver::{driver_for, ProtocolDriver};
use crate::error::{Result, TransferError};
use crate::path::PathPolicy;
use crate::stream::{validate_filename, HashingReader, HashingWriter};

/// Connection state as the client last commanded it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connected {
        /// Directory reported right after login
        home: String,
        /// Last directory commanded through `cwd`
        cwd: String,
    },
}

/// Outcome of a completed `get` or `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub bytes: u64,
    /// SHA-256 of the bytes transferred, hex encoded
    pub sha256: String,
}

/// FTP/SFTP client with one blocking session
pub struct TransferClient {
    settings: Settings,
    policy: PathPolicy,
    driver: Box<dyn ProtocolDriver>,
    state: SessionState,
    span: Span,
}

impl TransferClient {
    /// Create a disconnected client with the stock driver for
    /// `options.protocol`.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let driver = driver_for(options.protocol);
        Self::with_driver(options, driver)
    }

    /// Create a disconnected client around a caller-supplied driver
    pub fn with_driver(options: ClientOptions, driver: Box<dyn ProtocolDriver>) -> Result<Self> {
        if driver.protocol() != options.protocol {
            return Err(TransferError::Configuration(format!(
                "driver speaks {} but the client was configured for {}",
                driver.protocol(),
                options.protocol
            )));
        }

        let settings = options.resolve()?;
        let span = info_span!(
            "transfer",
            protocol = %settings.protocol,
            host = %settings.hostname,
            port = settings.port
        );

        span.in_scope(|| {
            debug!(
                "Client created (remote os: {}, timeout: {:?})",
                settings.os, settings.timeout
            )
        });

        Ok(Self {
            policy: PathPolicy::new(settings.os),
            settings,
            driver,
            state: SessionState::Disconnected,
            span,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn protocol(&self) -> Protocol {
        self.settings.protocol
    }

    pub fn port(&self) -> u16 {
        self.settings.port
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Open the session and log in.
    ///
    /// Handshake and authentication are one step: if either fails the
    /// transport is torn down and the client stays disconnected.
    pub fn connection(&mut self, username: &str, password: &str) -> Result<()> {
        let _enter = self.span.clone().entered();

        if self.is_connected() {
            return Err(TransferError::AlreadyConnected);
        }

        info!("🔗 Connecting to {}...", self.settings.endpoint());

        if let Err(e) = self.driver.connect(&self.settings) {
            error!("Connection failed: {}", e);
            return Err(e);
        }

        let home = match self.driver.authenticate(username, password) {
            Ok(home) => home,
            Err(e) => {
                error!("Login failed: {}", e);
                if let Err(close_err) = self.driver.close() {
                    warn!("Failed to close rejected session: {}", close_err);
                }
                return Err(e);
            }
        };

        info!("🔐 Logged in as {} (directory: {})", username, home);
        self.state = SessionState::Connected {
            cwd: home.clone(),
            home,
        };
        Ok(())
    }

    /// Change the remote working directory. `None` returns to the login
    /// directory.
    pub fn cwd(&mut self, remote_directory: Option<&str>) -> Result<&str> {
        let _enter = self.span.clone().entered();

        let target = match (&self.state, remote_directory) {
            (SessionState::Disconnected, _) => return Err(TransferError::NotConnected),
            (SessionState::Connected { .. }, Some(dir)) => dir.to_string(),
            (SessionState::Connected { home, .. }, None) => home.clone(),
        };

        let resolved = self.driver.change_dir(&target).inspect_err(|e| {
            error!("Cannot change directory to {}: {}", target, e);
        })?;
        debug!("Working directory is now {}", resolved);

        match &mut self.state {
            SessionState::Connected { cwd, .. } => {
                *cwd = resolved;
                Ok(cwd.as_str())
            }
            SessionState::Disconnected => Err(TransferError::NotConnected),
        }
    }

    /// Return to the login directory
    pub fn set_default_directory(&mut self) -> Result<&str> {
        self.cwd(None)
    }

    /// Last directory commanded through this client. Does not ask the
    /// server, so changes made out of band are not reflected.
    pub fn pwd(&self) -> Result<&str> {
        match &self.state {
            SessionState::Connected { cwd, .. } => Ok(cwd.as_str()),
            SessionState::Disconnected => Err(TransferError::NotConnected),
        }
    }

    /// Ask the driver for its working directory instead of the cache.
    pub fn remote_pwd(&mut self) -> Result<String> {
        let _enter = self.span.clone().entered();

        if !self.is_connected() {
            return Err(TransferError::NotConnected);
        }
        self.driver.current_dir()
    }

    /// Join remote path segments using the remote server's convention
    pub fn remote_path_join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        self.policy.join(segments)
    }

    /// Remote path for `filename` in `remote_directory` or the working dir
    fn remote_target(&self, filename: &str, remote_directory: Option<&str>) -> Result<String> {
        let cwd = self.pwd()?;
        Ok(self.policy.join(&[remote_directory.unwrap_or(cwd), filename]))
    }

    /// Download `filename` into `local_directory` (default: current dir).
    pub fn get(
        &mut self,
        filename: &str,
        remote_directory: Option<&str>,
        local_directory: Option<&Path>,
    ) -> Result<TransferReport> {
        let _enter = self.span.clone().entered();

        let remote_path = self.remote_target(filename, remote_directory)?;
        let filename = validate_filename(filename)?;
        let local_dir = local_directory.unwrap_or_else(|| Path::new("."));
        let local_path = local_dir.join(filename);

        if local_path.is_dir() {
            return Err(TransferError::LocalWrite {
                path: local_path,
                source: io::Error::new(io::ErrorKind::Other, "target is a directory"),
            });
        }

        let created = missing_dirs(local_dir);
        fs::create_dir_all(local_dir).map_err(|source| TransferError::LocalWrite {
            path: local_path.clone(),
            source,
        })?;
        if local_path.exists() {
            warn!("⚠️  Overwriting local file {:?}", local_path);
        }

        info!("📥 Downloading {} -> {:?}", remote_path, local_path);

        let (bytes, sha256) = match self.download(&remote_path, local_dir, &local_path) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Download of {} failed: {}", remote_path, e);
                remove_created_dirs(&created);
                return Err(e);
            }
        };

        info!("✅ Download complete: {} bytes, sha256 {}", bytes, sha256);

        Ok(TransferReport {
            remote_path,
            local_path,
            bytes,
            sha256,
        })
    }

    /// Stream `remote_path` into a temp file in `local_dir`, then rename it
    /// onto `local_path`. The temp file is gone when this returns an error.
    fn download(
        &mut self,
        remote_path: &str,
        local_dir: &Path,
        local_path: &Path,
    ) -> Result<(u64, String)> {
        let local_write_error = |source: io::Error| TransferError::LocalWrite {
            path: local_path.to_path_buf(),
            source,
        };

        let temp = NamedTempFile::new_in(local_dir).map_err(&local_write_error)?;
        let pb = create_progress_bar(self.settings.show_progress, None);
        if let Some(name) = local_path.file_name() {
            pb.set_message(format!("Downloading {}", name.to_string_lossy()));
        }

        let mut sink = HashingWriter::new(BufWriter::new(temp), pb.clone());
        let bytes = match self.driver.retrieve(remote_path, &mut sink) {
            Ok(bytes) => bytes,
            Err(e) => {
                pb.abandon_with_message("Download failed");
                return Err(match sink.take_error() {
                    Some(source) => local_write_error(source),
                    None => e,
                });
            }
        };

        if sink.bytes_written() != bytes {
            warn!(
                "Driver reported {} bytes but {} reached the local file",
                bytes,
                sink.bytes_written()
            );
        }
        let bytes = sink.bytes_written();

        let (writer, sha256) = sink.finish();
        let temp = writer
            .into_inner()
            .map_err(|e| local_write_error(e.into_error()))?;
        temp.as_file().sync_all().map_err(&local_write_error)?;
        temp.persist(local_path)
            .map_err(|e| local_write_error(e.error))?;

        pb.finish_with_message("Download complete");
        Ok((bytes, sha256))
    }

    /// Upload `filename` from `local_directory` (default: current dir).
    pub fn put(
        &mut self,
        filename: &str,
        remote_directory: Option<&str>,
        local_directory: Option<&Path>,
    ) -> Result<TransferReport> {
        let _enter = self.span.clone().entered();

        let remote_path = self.remote_target(filename, remote_directory)?;
        let filename = validate_filename(filename)?;
        let local_path = local_directory
            .unwrap_or_else(|| Path::new("."))
            .join(filename);

        let metadata = match fs::metadata(&local_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::LocalFileNotFound(local_path));
            }
            Err(source) => {
                return Err(TransferError::LocalRead {
                    path: local_path,
                    source,
                })
            }
        };

        if metadata.is_dir() {
            return Err(TransferError::LocalFileNotFound(local_path));
        }

        let file = File::open(&local_path).map_err(|source| TransferError::LocalRead {
            path: local_path.clone(),
            source,
        })?;

        let pb = create_progress_bar(self.settings.show_progress, Some(metadata.len()));
        pb.set_message(format!("Uploading {}", filename));

        info!("📤 Uploading {:?} -> {}", local_path, remote_path);

        let mut source = HashingReader::new(BufReader::new(file), pb.clone());
        let bytes = match self.driver.store(&remote_path, &mut source) {
            Ok(bytes) => bytes,
            Err(e) => {
                pb.abandon_with_message("Upload failed");
                let err = match source.take_error() {
                    Some(source) => TransferError::LocalRead {
                        path: local_path,
                        source,
                    },
                    None => e,
                };
                error!("Upload to {} failed: {}", remote_path, err);
                return Err(err);
            }
        };

        if source.bytes_read() != bytes {
            warn!(
                "Driver reported {} bytes but {} were read from {:?}",
                bytes,
                source.bytes_read(),
                local_path
            );
        }
        let bytes = source.bytes_read();
        let sha256 = source.finish();

        pb.finish_with_message("Upload complete");
        info!("✅ Upload complete: {} bytes, sha256 {}", bytes, sha256);

        Ok(TransferReport {
            remote_path,
            local_path,
            bytes,
            sha256,
        })
    }

    /// Close the session. Does nothing when already disconnected.
    ///
    /// The client is disconnected afterwards even if the close handshake
    /// fails; that failure is still returned.
    pub fn disconnect(&mut self) -> Result<()> {
        let _enter = self.span.clone().entered();

        if !self.is_connected() {
            debug!("disconnect() on a disconnected client");
            return Ok(());
        }

        self.state = SessionState::Disconnected;
        match self.driver.close() {
            Ok(()) => {
                info!("👋 Disconnected from {}", self.settings.endpoint());
                Ok(())
            }
            Err(e) => {
                warn!("Session closed uncleanly: {}", e);
                Err(e)
            }
        }
    }
}

impl Drop for TransferClient {
    fn drop(&mut self) {
        if self.is_connected() {
            // Failures are already logged by disconnect()
            let _ = self.disconnect();
        }
    }
}

/// Directories `create_dir_all(dir)` would create, deepest first
fn missing_dirs(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|d| !d.as_os_str().is_empty() && !d.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Undo directories created for a download that failed
fn remove_created_dirs(created: &[PathBuf]) {
    for dir in created {
        if let Err(e) = fs::remove_dir(dir) {
            warn!("Could not remove directory {:?}: {}", dir, e);
            break;
        }
    }
}

/// Create progress bar for transfers; hidden unless enabled
fn create_progress_bar(enabled: bool, total_size: Option<u64>) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    match total_size {
        Some(total) => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
            {
                pb.set_style(style);
            }
            pb
        }
    }
}

/// Format file size for display
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}
