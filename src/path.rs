//! Remote path joining.
//!
//! Remote paths follow the convention of the server's operating system, not
//! the machine this code runs on, so nothing here touches `std::path`.
//!
//! ```text
//! RemoteOs::Unix     ["/srv/", "/pub//", "a.txt"]  ->  /srv/pub/a.txt
//! RemoteOs::Windows  ["C:\\data", "in/x", "a.txt"] ->  C:\data\in\x\a.txt
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Operating system family of the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteOs {
    #[serde(alias = "linux")]
    Unix,
    #[serde(alias = "win")]
    Windows,
}

impl FromStr for RemoteOs {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unix" | "linux" => Ok(RemoteOs::Unix),
            "win" | "windows" => Ok(RemoteOs::Windows),
            other => Err(TransferError::Configuration(format!(
                "unknown remote OS '{}' (expected 'unix' or 'win')",
                other
            ))),
        }
    }
}

impl fmt::Display for RemoteOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOs::Unix => f.write_str("unix"),
            RemoteOs::Windows => f.write_str("win"),
        }
    }
}

/// Stateless join rule for one remote OS family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPolicy {
    os: RemoteOs,
}

impl PathPolicy {
    pub fn new(os: RemoteOs) -> Self {
        Self { os }
    }

    pub fn os(&self) -> RemoteOs {
        self.os
    }

    /// Separator emitted between segments.
    pub fn separator(&self) -> char {
        match self.os {
            RemoteOs::Unix => '/',
            RemoteOs::Windows => '\\',
        }
    }

    fn is_separator(&self, c: char) -> bool {
        match self.os {
            // A backslash is an ordinary filename character on Unix
            RemoteOs::Unix => c == '/',
            RemoteOs::Windows => c == '/' || c == '\\',
        }
    }

    /// Whether `path` is anchored at a root rather than relative to a
    /// working directory.
    pub fn is_absolute(&self, path: &str) -> bool {
        if path.starts_with(|c| self.is_separator(c)) {
            return true;
        }
        match self.os {
            RemoteOs::Unix => false,
            RemoteOs::Windows => {
                let bytes = path.as_bytes();
                bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
            }
        }
    }

    /// Join segments into one remote path.
    ///
    /// Empty segments are skipped and runs of separators collapse to one.
    /// A root on the first non-empty segment is kept, including a UNC
    /// `\\` prefix on Windows. Zero segments produce an empty string.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let sep = self.separator();
        let mut joined = String::new();

        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                continue;
            }

            if joined.is_empty() {
                if self.os == RemoteOs::Windows
                    && segment.len() >= 2
                    && segment.chars().take(2).all(|c| self.is_separator(c))
                {
                    joined.push(sep);
                    joined.push(sep);
                } else if segment.starts_with(|c| self.is_separator(c)) {
                    joined.push(sep);
                }
            }

            for part in segment.split(|c| self.is_separator(c)).filter(|p| !p.is_empty()) {
                if !joined.is_empty() && !joined.ends_with(sep) {
                    joined.push(sep);
                }
                joined.push_str(part);
            }
        }

        joined
    }
}

impl From<RemoteOs> for PathPolicy {
    fn from(os: RemoteOs) -> Self {
        Self::new(os)
    }
}
