//! Object store abstraction used by the publisher.
//!
//! The publisher needs exactly two things from a remote store: the content
//! identifier of one object, and an atomic whole-object put. [`ObjectStore`]
//! exposes just those. Implementations:
//!
//! - [`InMemoryObjectStore`](crate::memory::InMemoryObjectStore) in this crate.
//! - `S3ObjectStore` in the `dbpublish-s3` crate.
//!
//! A missing object is a normal outcome ([`RemoteHash::Absent`]), kept apart
//! from failures so that an outage is never mistaken for a first publish.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::ContentHash;

/// Tag carrying the source's last-modified date on a published object.
pub const DATE_MODIFIED_TAG: &str = "DateOfSourceDatabaseModification";

/// User metadata key carrying the expected MD5 of a published object.
pub const MD5_METADATA_KEY: &str = "md5";

// ---------------------------------------------------------------------------
// ServerSideEncryption
// ---------------------------------------------------------------------------

/// Server-side encryption algorithm requested on upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerSideEncryption {
    /// S3-managed AES-256 keys.
    #[default]
    #[serde(rename = "AES256")]
    Aes256,
    /// KMS-managed keys.
    #[serde(rename = "aws:kms")]
    AwsKms,
}

impl ServerSideEncryption {
    /// Wire representation used in the `x-amz-server-side-encryption` header.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256 => "AES256",
            Self::AwsKms => "aws:kms",
        }
    }
}

impl fmt::Display for ServerSideEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`ServerSideEncryption`] fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown server-side encryption algorithm: {0}")]
pub struct ParseServerSideEncryptionError(String);

impl FromStr for ServerSideEncryption {
    type Err = ParseServerSideEncryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes256" => Ok(Self::Aes256),
            "aws:kms" | "kms" => Ok(Self::AwsKms),
            _ => Err(ParseServerSideEncryptionError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Result of looking up an edition's remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteHash {
    /// The object exists with this content identifier.
    Found(ContentHash),
    /// No object exists under the key.
    Absent,
}

impl RemoteHash {
    /// Collapse into a hash, using the zero hash for [`RemoteHash::Absent`].
    #[must_use]
    pub fn into_hash(self) -> ContentHash {
        match self {
            Self::Found(hash) => hash,
            Self::Absent => ContentHash::zero(),
        }
    }
}

// ---------------------------------------------------------------------------
// Put
// ---------------------------------------------------------------------------

/// A whole-object upload.
///
/// The body is an open read-only handle on the validated staging file; the
/// store reads it to the end and drops it.
#[derive(Debug)]
pub struct PutRequest {
    /// Target bucket.
    pub bucket: String,
    /// Target key.
    pub key: String,
    /// Body of the object.
    pub body: tokio::fs::File,
    /// Exact length of `body` in bytes.
    pub content_length: u64,
    /// Expected MD5 of the body; stores verify it where they can.
    pub content_md5: ContentHash,
    /// Server-side encryption, or `None` when disabled.
    pub server_side_encryption: Option<ServerSideEncryption>,
    /// User metadata.
    pub metadata: BTreeMap<String, String>,
    /// Object tags.
    pub tags: BTreeMap<String, String>,
}

/// Outcome of a successful put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Content identifier assigned by the store.
    pub hash: ContentHash,
}

/// Format a modification time for use as a tag value.
///
/// Tag values only allow a restricted character set; RFC 3339 in UTC with
/// second precision stays within it.
#[must_use]
pub fn format_modified_tag(modified: DateTime<Utc>) -> String {
    modified.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Encode tags as a URL query string (`k1=v1&k2=v2`).
#[must_use]
pub fn encode_tagging(tags: &BTreeMap<String, String>) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(tags.iter())
        .finish()
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Remote object store holding published editions.
///
/// Implementations must make [`put`](Self::put) atomic from a reader's point
/// of view: a concurrent [`head`](Self::head) observes either the previous
/// object or the new one, never a partial write.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Look up the content identifier of `bucket/key`.
    async fn head(&self, bucket: &str, key: &str) -> Result<RemoteHash, StoreError>;

    /// Replace `bucket/key` with the request body.
    async fn put(&self, request: PutRequest) -> Result<PutOutcome, StoreError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    async fn head(&self, bucket: &str, key: &str) -> Result<RemoteHash, StoreError> {
        (**self).head(bucket, key).await
    }

    async fn put(&self, request: PutRequest) -> Result<PutOutcome, StoreError> {
        (**self).put(request).await
    }
}
