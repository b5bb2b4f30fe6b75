//! Remote File Transfer CLI - Main Entry Point
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     rft (this binary)                    │
//! │   get · put · pwd · join          logging (tracing)      │
//! │   flags + TOML profile -> ClientOptions                  │
//! └──────────────────────────┬───────────────────────────────┘
//!                            │
//! ┌──────────────────────────┴───────────────────────────────┐
//! │                     TransferClient                       │
//! │   connection · cwd · pwd · get · put · disconnect        │
//! └───────────────┬──────────────────────────┬───────────────┘
//!            FtpDriver                   SftpDriver
//! ```

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use remote_file_transfer::client::format_size;
use remote_file_transfer::{
    ClientOptions, PathPolicy, Profile, Protocol, RemoteOs, TransferClient, TransferError,
    TransferReport,
};

/// Remote File Transfer
///
/// Upload and download files over FTP or SFTP with one set of commands.
#[derive(Parser)]
#[command(name = "rft")]
#[command(version)]
#[command(about = "FTP/SFTP file transfer client", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to a dated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection flags; each one overrides the profile
#[derive(Args)]
struct ConnectArgs {
    /// TOML connection profile
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Protocol: ftp or sftp
    #[arg(short = 'P', long, global = true)]
    protocol: Option<Protocol>,

    /// Remote host
    #[arg(short = 'H', long, global = true)]
    host: Option<String>,

    /// Remote operating system: unix or win
    #[arg(long, global = true)]
    os: Option<RemoteOs>,

    /// Port (default: 21 for FTP, 22 for SFTP)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Connection timeout in seconds (default: 30)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Login user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Login password
    #[arg(long, global = true, env = "RFT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Show transfer progress bars
    #[arg(long, global = true)]
    progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file
    Get {
        /// File to download
        filename: String,

        /// Remote directory (defaults to the login directory)
        #[arg(short, long)]
        remote_dir: Option<String>,

        /// Local directory to save into (defaults to the current directory)
        #[arg(short, long)]
        local_dir: Option<PathBuf>,
    },

    /// Upload a file
    Put {
        /// File to upload
        filename: String,

        /// Remote directory (defaults to the login directory)
        #[arg(short, long)]
        remote_dir: Option<String>,

        /// Local directory to read from (defaults to the current directory)
        #[arg(short, long)]
        local_dir: Option<PathBuf>,
    },

    /// Print the remote working directory
    Pwd {
        /// Change to this directory first
        #[arg(long)]
        cd: Option<String>,

        /// Ask the server instead of printing the client's cached directory
        #[arg(long)]
        live: bool,
    },

    /// Join remote path segments (no connection needed)
    Join {
        /// Path segments
        #[arg(required = true)]
        segments: Vec<String>,
    },
}

impl ConnectArgs {
    fn load_profile(&self) -> Result<Option<Profile>> {
        match &self.profile {
            Some(path) => {
                info!("Using profile {:?}", path);
                Ok(Some(Profile::load(path)?))
            }
            None => Ok(None),
        }
    }

    fn remote_os(&self, profile: Option<&Profile>) -> RemoteOs {
        self.os
            .or(profile.map(|p| p.os))
            .unwrap_or(RemoteOs::Unix)
    }

    /// Merge flags over the profile into client options and a username
    fn resolve(&self) -> Result<(ClientOptions, String)> {
        let profile = self.load_profile()?;
        let profile = profile.as_ref();

        let protocol = self
            .protocol
            .or(profile.map(|p| p.protocol))
            .context("No protocol given (use --protocol or a profile)")?;
        let host = self
            .host
            .clone()
            .or(profile.map(|p| p.hostname.clone()))
            .context("No host given (use --host or a profile)")?;
        let username = self
            .user
            .clone()
            .or(profile.and_then(|p| p.username.clone()))
            .context("No user given (use --user or a profile)")?;

        let mut options = ClientOptions::new(protocol, host, self.remote_os(profile))
            .show_progress(self.progress);
        options.port = self.port.or(profile.and_then(|p| p.port));
        options.timeout = self
            .timeout
            .or(profile.and_then(|p| p.timeout_secs))
            .map(Duration::from_secs);

        Ok((options, username))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Get {
            filename,
            remote_dir,
            local_dir,
        } => {
            let report = with_session(&cli.connect, |client| {
                client.get(&filename, remote_dir.as_deref(), local_dir.as_deref())
            })?;
            print_report(&report);
            Ok(())
        }
        Commands::Put {
            filename,
            remote_dir,
            local_dir,
        } => {
            let report = with_session(&cli.connect, |client| {
                client.put(&filename, remote_dir.as_deref(), local_dir.as_deref())
            })?;
            print_report(&report);
            Ok(())
        }
        Commands::Pwd { cd, live } => {
            let dir = with_session(&cli.connect, |client| {
                if let Some(dir) = cd.as_deref() {
                    client.cwd(Some(dir))?;
                }
                if live {
                    client.remote_pwd()
                } else {
                    client.pwd().map(str::to_string)
                }
            })?;
            println!("{}", dir);
            Ok(())
        }
        Commands::Join { segments } => {
            let profile = cli.connect.load_profile()?;
            let policy = PathPolicy::new(cli.connect.remote_os(profile.as_ref()));
            println!("{}", policy.join(&segments[..]));
            Ok(())
        }
    }
}

/// Connect, run one operation, and always disconnect
fn with_session<T, F>(args: &ConnectArgs, op: F) -> Result<T>
where
    F: FnOnce(&mut TransferClient) -> Result<T, TransferError>,
{
    let (options, username) = args.resolve()?;
    let password = args.password.clone().unwrap_or_default();

    let mut client = TransferClient::new(options)?;
    client.connection(&username, &password)?;

    let outcome = op(&mut client);
    let closed = client.disconnect();

    let value = outcome?;
    closed?;
    Ok(value)
}

fn print_report(report: &TransferReport) {
    println!(
        "{} <-> {}  {}  sha256:{}",
        report.remote_path,
        report.local_path.display(),
        format_size(report.bytes),
        report.sha256
    );
}
