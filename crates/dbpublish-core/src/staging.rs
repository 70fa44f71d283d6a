//! Local staging of untrusted input.
//!
//! An edition is first copied to a staging file while an MD5 digest is
//! accumulated over the same bytes. Only a [`ValidatedFile`], obtained by
//! checking that digest with [`StagedFile::validate_hash`], can be handed to
//! the publisher, so nothing reaches the remote store without a successful
//! hash check.
//!
//! # Resource handling
//!
//! [`StagingWriter::stage`] takes the input stream by value and drops it
//! before returning, on every path. When staging fails before the stream is
//! exhausted, the rest of the stream is read and discarded first so that the
//! producer (typically an HTTP body) is never left half-consumed.
//!
//! The staging file itself is never deleted here. Retention is decided by the
//! publisher's [`StagingRetention`](crate::config::StagingRetention) policy.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::checksums::StreamingHasher;
use crate::error::{HashMismatch, StagingError};
use crate::types::{ContentHash, EditionId};

/// Default staging directory, relative to the working directory.
pub const DEFAULT_STAGING_DIR: &str = "tmp";

/// Chunk size used when copying the input stream.
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// StagingArea
// ---------------------------------------------------------------------------

/// Directory holding staging files, one per edition.
///
/// # Examples
///
/// ```
/// use std::path::Path;
///
/// use dbpublish_core::staging::StagingArea;
/// use dbpublish_core::types::EditionId;
///
/// let area = StagingArea::default();
/// let edition = EditionId::new("GeoLite2-City").unwrap();
/// assert_eq!(
///     area.path_for(&edition),
///     Path::new("tmp/GeoLite2-City.mmdb.temporary")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Use `dir` as the staging directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The staging directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staging file path for `edition`.
    #[must_use]
    pub fn path_for(&self, edition: &EditionId) -> PathBuf {
        self.dir.join(edition.staging_file_name())
    }
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_DIR)
    }
}

// ---------------------------------------------------------------------------
// StagedFile / ValidatedFile
// ---------------------------------------------------------------------------

/// A fully written staging file whose hash has not been checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    path: PathBuf,
    hash: ContentHash,
    size: u64,
}

impl StagedFile {
    /// Re-read an existing staging file from disk and hash it.
    ///
    /// Used to resume a publish from a file left by an earlier attempt.
    pub async fn from_disk(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let mut file = tokio::fs::File::open(&path).await?;
        let mut hasher = StreamingHasher::new();
        let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let (hash, size) = hasher.finish();
        trace!(path = %path.display(), size, %hash, "hashed staging file from disk");
        Ok(Self { path, hash, size })
    }

    /// Path of the staging file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MD5 of the staged bytes.
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Number of bytes staged.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Check the staged bytes against `expected`.
    ///
    /// Both sides are lowercase hex, so the comparison is case-insensitive
    /// with respect to the caller's original input.
    pub fn validate_hash(self, expected: &ContentHash) -> Result<ValidatedFile, HashMismatch> {
        if &self.hash != expected {
            return Err(HashMismatch {
                expected: expected.clone(),
                actual: self.hash,
            });
        }
        Ok(ValidatedFile {
            path: self.path,
            hash: self.hash,
            size: self.size,
        })
    }
}

/// A staging file whose content matched the expected hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    path: PathBuf,
    hash: ContentHash,
    size: u64,
}

impl ValidatedFile {
    /// Path of the staging file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verified MD5 of the content.
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Content length in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open the staging file read-only.
    pub async fn open(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path).await
    }
}

// ---------------------------------------------------------------------------
// StagingWriter
// ---------------------------------------------------------------------------

/// Copies an input stream to a staging file, hashing as it goes.
#[derive(Debug, Clone, Copy)]
pub struct StagingWriter {
    buffer_size: usize,
}

impl Default for StagingWriter {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StagingWriter {
    /// Create a writer with the default copy buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with a specific copy buffer size (at least one byte).
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Stage `reader` into the file at `path`.
    ///
    /// Parent directories are created as needed and an existing file is
    /// truncated. The file is flushed and synced before returning. `reader`
    /// is consumed to the end and dropped whatever the outcome.
    pub async fn stage<R>(&self, path: &Path, mut reader: R) -> Result<StagedFile, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self.copy_to_file(path, &mut reader).await {
            Ok(staged) => Ok(staged),
            Err(primary) => Err(drain(&mut reader, primary).await),
        }
    }

    async fn copy_to_file<R>(&self, path: &Path, reader: &mut R) -> Result<StagedFile, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StagingError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| StagingError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let write_err = |source| StagingError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut hasher = StreamingHasher::new();
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let n = reader.read(&mut buf).await.map_err(StagingError::Read)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await.map_err(write_err)?;
            hasher.update(&buf[..n]);
        }
        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        let (hash, size) = hasher.finish();
        debug!(path = %path.display(), size, %hash, "staged input stream");
        Ok(StagedFile {
            path: path.to_path_buf(),
            hash,
            size,
        })
    }
}

/// Discard whatever is left of `reader`, joining any failure to `primary`.
///
/// A stream that already failed to read is not read again.
async fn drain<R>(reader: &mut R, primary: StagingError) -> StagingError
where
    R: AsyncRead + Unpin + Send,
{
    if matches!(primary, StagingError::Read(_)) {
        return primary;
    }
    match tokio::io::copy(reader, &mut tokio::io::sink()).await {
        Ok(discarded) => {
            trace!(discarded, "drained input stream after staging failure");
            primary
        }
        Err(drain) => {
            warn!(error = %drain, "failed to drain input stream after staging failure");
            StagingError::Drain {
                primary: Box::new(primary),
                drain,
            }
        }
    }
}
