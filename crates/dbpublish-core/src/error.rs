//! Error types for staging and publishing editions.
//!
//! Three layers:
//!
//! - [`StagingError`] and [`HashMismatch`] come from the local staging writer.
//! - [`StoreError`] comes from an [`ObjectStore`](crate::store::ObjectStore)
//!   backend.
//! - [`PublishError`] is what callers of
//!   [`EditionPublisher`](crate::publisher::EditionPublisher) see. Every
//!   variant carries the edition it concerns, and [`PublishError::kind`] lets
//!   batch callers branch on the failure class without matching on messages.

use std::fmt;
use std::path::PathBuf;

use crate::types::{ContentHash, EditionId};

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Local filesystem failure while staging an edition.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The staging directory could not be created.
    #[error("creating staging directory {}: {source}", path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The staging file could not be created or opened.
    #[error("opening staging file {}: {source}", path.display())]
    Open {
        /// Staging file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from the input stream failed.
    #[error("reading input stream: {0}")]
    Read(#[source] std::io::Error),

    /// Writing or syncing the staging file failed.
    #[error("writing staging file {}: {source}", path.display())]
    Write {
        /// Staging file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Draining the remaining input after a failure also failed.
    #[error("{primary}; draining input stream: {drain}")]
    Drain {
        /// The failure that interrupted staging.
        primary: Box<StagingError>,
        /// The error hit while discarding the rest of the stream.
        drain: std::io::Error,
    },
}

/// The staged bytes do not hash to the expected value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("MD5 of staged file {actual} does not match expected {expected}")]
pub struct HashMismatch {
    /// Hash the caller expected.
    pub expected: ContentHash,
    /// Hash of the bytes actually staged.
    pub actual: ContentHash,
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Error from an object store backend.
///
/// "Object not found" is deliberately absent: a missing object is reported as
/// [`RemoteHash::Absent`](crate::store::RemoteHash::Absent), never as an error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bucket does not exist.
    #[error("bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// Bucket name.
        bucket: String,
    },

    /// The credentials in use may not access the object.
    #[error("access denied to {bucket}/{key}")]
    AccessDenied {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },

    /// The body received by the store does not match the declared MD5 or
    /// length.
    #[error("the Content-MD5 or length specified for {key} did not match what was received")]
    BadDigest {
        /// Object key.
        key: String,
    },

    /// Reading the upload body failed.
    #[error("reading upload body: {0}")]
    Body(#[from] std::io::Error),

    /// Any other backend, transport or protocol failure.
    #[error("object store request failed: {message}")]
    Backend {
        /// Human-readable description including backend context.
        message: String,
        /// The originating error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Build a [`StoreError::Backend`] from a message alone.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// Failure class of a [`PublishError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishErrorKind {
    /// Local filesystem failure; nothing was uploaded.
    Staging,
    /// Staged content did not match the expected hash; nothing was uploaded.
    HashMismatch,
    /// Remote metadata lookup failed for a reason other than absence.
    RemoteQuery,
    /// The atomic put failed; the staged file is still on disk.
    RemoteUpload,
    /// A cleanup step failed after the main work finished.
    Cleanup,
}

impl fmt::Display for PublishErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staging => "staging",
            Self::HashMismatch => "hash mismatch",
            Self::RemoteQuery => "remote query",
            Self::RemoteUpload => "remote upload",
            Self::Cleanup => "cleanup",
        })
    }
}

/// Error returned by [`EditionPublisher`](crate::publisher::EditionPublisher).
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Writing the input to the staging file failed.
    #[error("writing to the temp file for {edition}: {source}")]
    Staging {
        /// Edition being staged.
        edition: EditionId,
        /// Underlying staging failure.
        #[source]
        source: StagingError,
    },

    /// The staged file could not be opened for upload.
    #[error("opening temp file to read for {edition}: {source}")]
    OpenStaged {
        /// Edition being published.
        edition: EditionId,
        /// Staging file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The staged content does not match the expected hash.
    #[error("validating hash for {edition}: {source}")]
    HashMismatch {
        /// Edition being validated.
        edition: EditionId,
        /// Expected and actual digests.
        #[source]
        source: HashMismatch,
    },

    /// Looking up the remote object failed.
    #[error("querying hash for {edition} ({key} in bucket {bucket}): {source}")]
    RemoteQuery {
        /// Edition being queried.
        edition: EditionId,
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Backend error.
        #[source]
        source: StoreError,
    },

    /// Uploading the staged file failed.
    #[error("uploading {edition} to {key} in bucket {bucket}: {source}")]
    RemoteUpload {
        /// Edition being uploaded.
        edition: EditionId,
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Backend error.
        #[source]
        source: StoreError,
    },

    /// A cleanup step failed.
    #[error("{action} for {edition}: {source}")]
    Cleanup {
        /// Edition the cleanup belonged to.
        edition: EditionId,
        /// What was being cleaned up.
        action: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// Failure class of this error.
    #[must_use]
    pub fn kind(&self) -> PublishErrorKind {
        match self {
            Self::Staging { .. } | Self::OpenStaged { .. } => PublishErrorKind::Staging,
            Self::HashMismatch { .. } => PublishErrorKind::HashMismatch,
            Self::RemoteQuery { .. } => PublishErrorKind::RemoteQuery,
            Self::RemoteUpload { .. } => PublishErrorKind::RemoteUpload,
            Self::Cleanup { .. } => PublishErrorKind::Cleanup,
        }
    }
}
