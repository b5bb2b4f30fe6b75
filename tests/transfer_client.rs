//! Integration tests for the transfer client.
//!
//! These drive `TransferClient` end to end through a driver that serves a
//! temporary directory as the "remote" filesystem:
//! - Session lifecycle and state after failures
//! - Working directory tracking
//! - Upload/download round trips and atomic downloads
//! - Remote path joining per remote OS

use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use remote_file_transfer::stream::calculate_hash;
use remote_file_transfer::{
    ClientOptions, PathPolicy, Protocol, ProtocolDriver, RemoteOs, Settings, TransferClient,
    TransferError,
};
use tempfile::TempDir;

const HOME: &str = "/home/bob";
const PASSWORD: &str = "s3cret";

/// What the test driver saw
#[derive(Default)]
struct Journal {
    closes: usize,
    requested: Vec<String>,
}

/// Serves `root` as the remote filesystem. On a Windows remote the `C:`
/// drive maps onto `root`.
struct LocalDriver {
    protocol: Protocol,
    root: PathBuf,
    policy: PathPolicy,
    transport_open: bool,
    cwd: Option<String>,
    journal: Arc<Mutex<Journal>>,
}

impl LocalDriver {
    fn new(protocol: Protocol, root: &Path, journal: Arc<Mutex<Journal>>) -> Self {
        Self {
            protocol,
            root: root.to_path_buf(),
            policy: PathPolicy::new(RemoteOs::Unix),
            transport_open: false,
            cwd: None,
            journal,
        }
    }

    fn absolute(&self, path: &str) -> Result<String, TransferError> {
        let cwd = self.cwd.as_ref().ok_or(TransferError::NotConnected)?;
        Ok(if self.policy.is_absolute(path) {
            path.to_string()
        } else {
            format!("{}/{}", cwd.trim_end_matches('/'), path)
        })
    }

    fn local(&self, remote: &str) -> PathBuf {
        let relative = match self.policy.os() {
            RemoteOs::Unix => remote.trim_start_matches('/').to_string(),
            RemoteOs::Windows => {
                let unified = remote.replace('\\', "/");
                let unified = unified.trim_start_matches('/');
                unified
                    .strip_prefix("C:")
                    .unwrap_or(unified)
                    .trim_start_matches('/')
                    .to_string()
            }
        };
        self.root.join(relative)
    }

    fn record(&self, path: &str) {
        self.journal.lock().unwrap().requested.push(path.to_string());
    }
}

impl ProtocolDriver for LocalDriver {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn connect(&mut self, settings: &Settings) -> Result<(), TransferError> {
        if settings.hostname.ends_with(".invalid") {
            return Err(TransferError::Connection {
                endpoint: settings.endpoint(),
                reason: "no such host".to_string(),
            });
        }
        self.policy = PathPolicy::new(settings.os);
        self.transport_open = true;
        Ok(())
    }

    fn authenticate(&mut self, username: &str, password: &str) -> Result<String, TransferError> {
        if !self.transport_open {
            return Err(TransferError::NotConnected);
        }
        if password != PASSWORD {
            return Err(TransferError::Authentication {
                username: username.to_string(),
                reason: "password rejected".to_string(),
            });
        }
        self.cwd = Some(HOME.to_string());
        Ok(HOME.to_string())
    }

    fn current_dir(&mut self) -> Result<String, TransferError> {
        self.cwd.clone().ok_or(TransferError::NotConnected)
    }

    fn change_dir(&mut self, directory: &str) -> Result<String, TransferError> {
        let target = self.absolute(directory)?;
        if !self.local(&target).is_dir() {
            return Err(TransferError::RemotePath {
                path: target,
                reason: "no such directory".to_string(),
            });
        }
        self.cwd = Some(target.clone());
        Ok(target)
    }

    fn retrieve(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64, TransferError> {
        let path = self.absolute(remote_path)?;
        self.record(&path);

        if path.ends_with("broken.bin") {
            sink.write_all(b"partial")
                .map_err(|_| TransferError::Session("sink refused".to_string()))?;
            return Err(TransferError::RemoteRead {
                path,
                reason: "data connection reset".to_string(),
            });
        }

        let mut file = fs::File::open(self.local(&path))
            .map_err(|_| TransferError::RemoteFileNotFound(path.clone()))?;
        io::copy(&mut file, sink).map_err(|e| TransferError::RemoteRead {
            path,
            reason: e.to_string(),
        })
    }

    fn store(&mut self, remote_path: &str, source: &mut dyn Read) -> Result<u64, TransferError> {
        let path = self.absolute(remote_path)?;
        self.record(&path);

        let remote_write = |e: io::Error| TransferError::RemoteWrite {
            path: path.clone(),
            reason: e.to_string(),
        };
        let mut file = fs::File::create(self.local(&path)).map_err(remote_write)?;
        io::copy(source, &mut file).map_err(remote_write)
    }

    fn close(&mut self) -> Result<(), TransferError> {
        self.transport_open = false;
        self.cwd = None;
        self.journal.lock().unwrap().closes += 1;
        Ok(())
    }
}

struct Fixture {
    remote: TempDir,
    local: TempDir,
    journal: Arc<Mutex<Journal>>,
}

impl Fixture {
    fn new() -> Self {
        let remote = TempDir::new().unwrap();
        for dir in ["home/bob/docs", "pub/example"] {
            fs::create_dir_all(remote.path().join(dir)).unwrap();
        }
        fs::write(remote.path().join("pub/example/readme.txt"), b"hello from the server\n").unwrap();

        Self {
            remote,
            local: TempDir::new().unwrap(),
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    fn client(&self, protocol: Protocol, os: RemoteOs) -> TransferClient {
        let driver = LocalDriver::new(protocol, self.remote.path(), self.journal.clone());
        TransferClient::with_driver(ClientOptions::new(protocol, "example.org", os), Box::new(driver))
            .unwrap()
    }

    fn connected(&self, protocol: Protocol) -> TransferClient {
        let mut client = self.client(protocol, RemoteOs::Unix);
        client.connection("bob", PASSWORD).unwrap();
        client
    }

    fn closes(&self) -> usize {
        self.journal.lock().unwrap().closes
    }

    fn local_entries(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

// =============================================================================
// Session Lifecycle
// =============================================================================

#[test]
fn test_connection_starts_in_login_directory() {
    let fixture = Fixture::new();
    let client = fixture.connected(Protocol::Ftp);

    assert!(client.is_connected());
    assert_eq!(client.pwd().unwrap(), HOME);
}

#[test]
fn test_sftp_rejected_password_stays_disconnected() {
    let fixture = Fixture::new();
    let mut client = fixture.client(Protocol::Sftp, RemoteOs::Unix);
    assert_eq!(client.port(), 22);

    let err = client.connection("bob", "wrong-pass").unwrap_err();

    assert!(matches!(err, TransferError::Authentication { .. }));
    assert!(!client.is_connected());
    assert_eq!(fixture.closes(), 1, "rejected transport must be torn down");
    assert!(matches!(client.pwd(), Err(TransferError::NotConnected)));
}

#[test]
fn test_unreachable_host_is_connection_error() {
    let fixture = Fixture::new();
    let driver = LocalDriver::new(Protocol::Ftp, fixture.remote.path(), fixture.journal.clone());
    let options = ClientOptions::new(Protocol::Ftp, "nowhere.invalid", RemoteOs::Unix);
    let mut client = TransferClient::with_driver(options, Box::new(driver)).unwrap();

    let err = client.connection("bob", PASSWORD).unwrap_err();

    assert!(matches!(err, TransferError::Connection { .. }));
    assert!(!client.is_connected());
}

#[test]
fn test_ftp_closed_port_is_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let options = ClientOptions::new(Protocol::Ftp, "127.0.0.1", RemoteOs::Unix).port(port);
    let mut client = TransferClient::new(options).unwrap();

    let err = client.connection("anonymous", "").unwrap_err();

    assert!(matches!(err, TransferError::Connection { .. }));
    assert!(!client.is_connected());
}

#[test]
fn test_second_connection_rejected() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Sftp);

    assert!(matches!(
        client.connection("bob", PASSWORD),
        Err(TransferError::AlreadyConnected)
    ));
    assert!(client.is_connected());
}

#[test]
fn test_disconnect_twice_then_operations_fail() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Ftp);

    client.disconnect().unwrap();
    client.disconnect().unwrap();
    assert_eq!(fixture.closes(), 1);

    assert!(matches!(client.pwd(), Err(TransferError::NotConnected)));
    assert!(matches!(
        client.get("readme.txt", Some("/pub/example"), Some(fixture.local.path())),
        Err(TransferError::NotConnected)
    ));
    assert!(matches!(
        client.put("readme.txt", None, Some(fixture.local.path())),
        Err(TransferError::NotConnected)
    ));
    assert!(matches!(client.remote_pwd(), Err(TransferError::NotConnected)));
}

#[test]
fn test_reconnect_after_disconnect() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Sftp);
    client.cwd(Some("/pub")).unwrap();
    client.disconnect().unwrap();

    client.connection("bob", PASSWORD).unwrap();

    assert_eq!(client.pwd().unwrap(), HOME);
}

#[test]
fn test_drop_closes_open_session() {
    let fixture = Fixture::new();
    {
        let _client = fixture.connected(Protocol::Ftp);
    }
    assert_eq!(fixture.closes(), 1);
}

// =============================================================================
// Working Directory
// =============================================================================

#[test]
fn test_cwd_none_restores_login_directory() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Sftp);

    assert_eq!(client.cwd(Some("docs")).unwrap(), "/home/bob/docs");
    assert_eq!(client.pwd().unwrap(), "/home/bob/docs");

    assert_eq!(client.cwd(None).unwrap(), HOME);
    assert_eq!(client.pwd().unwrap(), HOME);
}

#[test]
fn test_set_default_directory_matches_cwd_none() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Ftp);

    client.cwd(Some("/pub/example")).unwrap();
    assert_eq!(client.set_default_directory().unwrap(), HOME);
    assert_eq!(client.remote_pwd().unwrap(), HOME);
}

#[test]
fn test_cwd_to_missing_directory_keeps_previous() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Ftp);
    client.cwd(Some("/pub")).unwrap();

    let err = client.cwd(Some("/does/not/exist")).unwrap_err();

    assert!(matches!(err, TransferError::RemotePath { .. }));
    assert_eq!(client.pwd().unwrap(), "/pub");
    assert!(client.is_connected());
}

// =============================================================================
// Transfers
// =============================================================================

#[test]
fn test_put_then_get_round_trip() {
    let fixture = Fixture::new();
    let upload_dir = fixture.local.path().join("upload");
    let download_dir = fixture.local.path().join("download");
    fs::create_dir_all(&upload_dir).unwrap();

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i * 31 % 251) as u8).collect();
    fs::write(upload_dir.join("data.bin"), &payload).unwrap();

    for protocol in [Protocol::Ftp, Protocol::Sftp] {
        let mut client = fixture.connected(protocol);

        let sent = client.put("data.bin", Some("/pub"), Some(&upload_dir)).unwrap();
        assert_eq!(sent.remote_path, "/pub/data.bin");
        assert_eq!(sent.bytes, payload.len() as u64);

        let received = client.get("data.bin", Some("/pub"), Some(&download_dir)).unwrap();
        assert_eq!(received.local_path, download_dir.join("data.bin"));
        assert_eq!(received.sha256, sent.sha256);
        assert_eq!(received.sha256, calculate_hash(&payload));

        let downloaded = fs::read(download_dir.join("data.bin")).unwrap();
        assert_eq!(downloaded, payload);
        client.disconnect().unwrap();
    }
}

#[test]
fn test_get_uses_working_directory_by_default() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Sftp);
    client.cwd(Some("/pub/example")).unwrap();

    let report = client.get("readme.txt", None, Some(fixture.local.path())).unwrap();

    assert_eq!(report.remote_path, "/pub/example/readme.txt");
    assert_eq!(
        fs::read(fixture.local.path().join("readme.txt")).unwrap(),
        b"hello from the server\n"
    );
}

#[test]
fn test_get_creates_missing_local_directory() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Ftp);
    let nested = fixture.local.path().join("a").join("b");

    client.get("readme.txt", Some("/pub/example"), Some(&nested)).unwrap();

    assert!(nested.join("readme.txt").is_file());
}

#[test]
fn test_get_missing_remote_file() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Ftp);

    let err = client
        .get("nope.txt", Some("/pub"), Some(fixture.local.path()))
        .unwrap_err();

    assert!(matches!(err, TransferError::RemoteFileNotFound(_)));
    assert!(fixture.local_entries(fixture.local.path()).is_empty());
    assert!(client.is_connected());
}

#[test]
fn test_get_missing_remote_file_creates_no_local_dirs() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Sftp);
    let nested = fixture.local.path().join("a").join("b");

    let err = client.get("nope.txt", Some("/pub"), Some(&nested)).unwrap_err();

    assert!(matches!(err, TransferError::RemoteFileNotFound(_)));
    assert!(!fixture.local.path().join("a").exists());
    assert!(fixture.local_entries(fixture.local.path()).is_empty());
}

#[test]
fn test_failed_get_leaves_existing_file_untouched() {
    let fixture = Fixture::new();
    fs::write(fixture.remote.path().join("pub/broken.bin"), b"unused").unwrap();
    let target = fixture.local.path().join("broken.bin");
    fs::write(&target, b"previous contents").unwrap();
    let mut client = fixture.connected(Protocol::Sftp);

    let err = client
        .get("broken.bin", Some("/pub"), Some(fixture.local.path()))
        .unwrap_err();

    assert!(matches!(err, TransferError::RemoteRead { .. }));
    assert_eq!(fs::read(&target).unwrap(), b"previous contents");
    assert_eq!(fixture.local_entries(fixture.local.path()), vec!["broken.bin"]);
}

#[test]
fn test_get_onto_directory_is_local_write_error() {
    let fixture = Fixture::new();
    fs::create_dir(fixture.local.path().join("readme.txt")).unwrap();
    let mut client = fixture.connected(Protocol::Ftp);

    let err = client
        .get("readme.txt", Some("/pub/example"), Some(fixture.local.path()))
        .unwrap_err();

    assert!(matches!(err, TransferError::LocalWrite { .. }));
}

#[test]
fn test_put_missing_local_file() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Sftp);

    let err = client
        .put("ghost.txt", None, Some(fixture.local.path()))
        .unwrap_err();

    assert!(matches!(err, TransferError::LocalFileNotFound(_)));
    assert!(fixture.journal.lock().unwrap().requested.is_empty());
}

#[test]
fn test_put_into_missing_remote_directory() {
    let fixture = Fixture::new();
    fs::write(fixture.local.path().join("a.txt"), b"a").unwrap();
    let mut client = fixture.connected(Protocol::Ftp);

    let err = client
        .put("a.txt", Some("/no/such/dir"), Some(fixture.local.path()))
        .unwrap_err();

    assert!(matches!(err, TransferError::RemoteWrite { .. }));
}

#[test]
fn test_filename_with_separator_rejected() {
    let fixture = Fixture::new();
    let mut client = fixture.connected(Protocol::Ftp);

    let err = client
        .get("example/readme.txt", Some("/pub"), Some(fixture.local.path()))
        .unwrap_err();

    assert!(matches!(err, TransferError::InvalidFilename(_)));
}

// =============================================================================
// Remote Path Convention
// =============================================================================

#[test]
fn test_windows_remote_gets_backslash_paths() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.remote.path().join("data/in")).unwrap();
    fs::write(fixture.remote.path().join("data/in/a.txt"), b"from the C drive").unwrap();
    let mut client = fixture.client(Protocol::Sftp, RemoteOs::Windows);
    client.connection("bob", PASSWORD).unwrap();

    let report = client
        .get("a.txt", Some("C:\\data\\in"), Some(fixture.local.path()))
        .unwrap();

    assert_eq!(report.remote_path, "C:\\data\\in\\a.txt");
    let requested = fixture.journal.lock().unwrap().requested.clone();
    assert_eq!(requested, vec!["C:\\data\\in\\a.txt".to_string()]);
    assert_eq!(
        fs::read(fixture.local.path().join("a.txt")).unwrap(),
        b"from the C drive"
    );
}

#[test]
fn test_remote_path_join_without_connection() {
    let fixture = Fixture::new();
    let unix = fixture.client(Protocol::Ftp, RemoteOs::Unix);
    let win = fixture.client(Protocol::Ftp, RemoteOs::Windows);

    assert_eq!(unix.remote_path_join(&["a", "b", "c"]), "a/b/c");
    assert_eq!(win.remote_path_join(&["a", "b", "c"]), "a\\b\\c");
}
