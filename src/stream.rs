//! Byte streaming helpers shared by uploads and downloads.
//!
//! Drivers copy between a remote handle and a local reader/writer they know
//! nothing about. The local side is wrapped in [`HashingReader`] or
//! [`HashingWriter`], which:
//! - Hash every byte with SHA-256 as it passes through
//! - Advance the progress bar
//! - Remember their own I/O failure, so a failed copy can be blamed on the
//!   local file rather than the remote session

use std::io::{self, Read, Write};

use indicatif::ProgressBar;
use sha2::{Digest, Sha256};

use crate::error::TransferError;

/// Buffer size for file transfers (64 KB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Calculate SHA-256 hash of data
pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streaming hash calculator for large files
pub struct StreamingHasher {
    hasher: Sha256,
    bytes_processed: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes_processed: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `reader` into `writer` through a [`CHUNK_SIZE`] buffer.
pub fn pump<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..bytes_read])?;
        total += bytes_read as u64;
    }

    writer.flush()?;
    Ok(total)
}

/// Rebuild an owned copy of an I/O error; `io::Error` is not `Clone`.
fn copy_error(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}

/// Local writer instrumented for downloads.
pub struct HashingWriter<W> {
    inner: W,
    hasher: StreamingHasher,
    progress: ProgressBar,
    error: Option<io::Error>,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, progress: ProgressBar) -> Self {
        Self {
            inner,
            hasher: StreamingHasher::new(),
            progress,
            error: None,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.hasher.bytes_processed()
    }

    /// The local I/O failure seen during the copy, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Consume the writer, returning the inner writer and the digest
    pub fn finish(self) -> (W, String) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => {
                self.hasher.update(&buf[..n]);
                self.progress.inc(n as u64);
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.error = Some(copy_error(&e));
                }
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|e| {
            self.error = Some(copy_error(e));
        })
    }
}

/// Local reader instrumented for uploads.
pub struct HashingReader<R> {
    inner: R,
    hasher: StreamingHasher,
    progress: ProgressBar,
    error: Option<io::Error>,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, progress: ProgressBar) -> Self {
        Self {
            inner,
            hasher: StreamingHasher::new(),
            progress,
            error: None,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.hasher.bytes_processed()
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn finish(self) -> String {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.hasher.update(&buf[..n]);
                self.progress.inc(n as u64);
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.error = Some(copy_error(&e));
                }
                Err(e)
            }
        }
    }
}

/// Validate a transfer filename.
///
/// The same name is used on both ends, so it must be a single path
/// component under either convention.
pub fn validate_filename(filename: &str) -> Result<&str, TransferError> {
    if filename.is_empty() {
        return Err(TransferError::InvalidFilename("Empty filename".to_string()));
    }

    if filename == "." || filename == ".." {
        return Err(TransferError::InvalidFilename(format!(
            "'{}' is not a file name",
            filename
        )));
    }

    if filename.contains(['/', '\\']) {
        return Err(TransferError::InvalidFilename(format!(
            "'{}' contains a path separator; pass the directory separately",
            filename
        )));
    }

    if filename.contains('\0') {
        return Err(TransferError::InvalidFilename(
            "Filename contains a NUL byte".to_string(),
        ));
    }

    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_validate_filename_valid() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename(".profile").is_ok());
        assert!(validate_filename("WinFormClient.png").is_ok());
    }

    #[test]
    fn test_validate_filename_rejects_paths() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("pub/example.txt").is_err());
        assert!(validate_filename("pub\\example.txt").is_err());
    }

    #[test]
    fn test_hash_calculation() {
        let hash = calculate_hash(b"Hello, World!");
        assert_eq!(
            hash,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_streaming_hasher() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.bytes_processed(), 13);
        assert_eq!(
            hasher.finalize(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_pump_through_hashing_adaptors() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 11];
        let mut reader = HashingReader::new(&data[..], ProgressBar::hidden());
        let mut writer = HashingWriter::new(Vec::new(), ProgressBar::hidden());

        let copied = pump(&mut reader, &mut writer).unwrap();

        assert_eq!(copied, data.len() as u64);
        assert_eq!(reader.bytes_read(), data.len() as u64);
        assert_eq!(writer.bytes_written(), data.len() as u64);
        let source_hash = reader.finish();
        let (written, sink_hash) = writer.finish();
        assert_eq!(written, data);
        assert_eq!(source_hash, sink_hash);
        assert_eq!(sink_hash, calculate_hash(&data));
    }

    #[test]
    fn test_hashing_writer_records_local_failure() {
        let mut writer = HashingWriter::new(FailingWriter, ProgressBar::hidden());
        let err = pump(&mut &b"payload"[..], &mut writer).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        let recorded = writer.take_error().expect("local error recorded");
        assert_eq!(recorded.kind(), io::ErrorKind::PermissionDenied);
        assert!(writer.take_error().is_none());
    }
}
