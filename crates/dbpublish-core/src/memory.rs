//! In-memory object store.
//!
//! [`InMemoryObjectStore`] keeps published objects as [`Bytes`] in a
//! [`DashMap`] keyed by `(bucket, key)`. A put reads the whole body first and
//! swaps the map entry only once the body is complete and its MD5 verified,
//! so readers never see a partial object. ETags follow S3's single-part rule:
//! the quoted hex MD5 of the body.
//!
//! Buckets must be created explicitly; operations on an unknown bucket fail
//! with [`StoreError::NoSuchBucket`] rather than reporting the object absent.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::checksums;
use crate::error::StoreError;
use crate::store::{ObjectStore, PutOutcome, PutRequest, RemoteHash, ServerSideEncryption};
use crate::types::ContentHash;

/// Upper bound on the buffer reserved up front from a declared content length.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Composite key identifying a stored object: `(bucket, key)`.
type StorageKey = (String, String);

/// A stored object with the attributes it was uploaded with.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object body.
    pub data: Bytes,
    /// Quoted hex MD5 of `data`.
    pub etag: String,
    /// Encryption requested on upload.
    pub server_side_encryption: Option<ServerSideEncryption>,
    /// User metadata.
    pub metadata: BTreeMap<String, String>,
    /// Object tags.
    pub tags: BTreeMap<String, String>,
    /// Time of the put.
    pub last_modified: DateTime<Utc>,
}

/// Thread-safe in-memory [`ObjectStore`].
///
/// # Examples
///
/// ```
/// use dbpublish_core::memory::InMemoryObjectStore;
/// use dbpublish_core::store::{ObjectStore, RemoteHash};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryObjectStore::new();
/// store.create_bucket("databases");
/// let found = store.head("databases", "NOPE.mmdb").await.unwrap();
/// assert_eq!(found, RemoteHash::Absent);
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: DashSet<String>,
    objects: DashMap<StorageKey, StoredObject>,
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("buckets_count", &self.buckets.len())
            .field("objects_count", &self.objects.len())
            .finish()
    }
}

impl InMemoryObjectStore {
    /// Create an empty store with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `bucket` if it does not exist yet.
    pub fn create_bucket(&self, bucket: &str) {
        if self.buckets.insert(bucket.to_owned()) {
            debug!(bucket, "created bucket");
        }
    }

    /// Fetch a copy of a stored object.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|entry| entry.value().clone())
    }

    /// Number of objects across all buckets.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn ensure_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(StoreError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<RemoteHash, StoreError> {
        self.ensure_bucket(bucket)?;
        let found = self
            .objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|entry| ContentHash::from_etag(&entry.value().etag));
        trace!(bucket, key, found = found.is_some(), "head object");
        Ok(found.map_or(RemoteHash::Absent, RemoteHash::Found))
    }

    async fn put(&self, request: PutRequest) -> Result<PutOutcome, StoreError> {
        let PutRequest {
            bucket,
            key,
            mut body,
            content_length,
            content_md5,
            server_side_encryption,
            metadata,
            tags,
        } = request;
        self.ensure_bucket(&bucket)?;

        let capacity = content_length.min(MAX_PREALLOCATION);
        let mut buf = BytesMut::with_capacity(usize::try_from(capacity).unwrap_or(0));
        while body.read_buf(&mut buf).await? > 0 {}
        drop(body);
        let data = buf.freeze();

        let received = checksums::compute_md5(&data);
        if data.len() as u64 != content_length || received != content_md5 {
            return Err(StoreError::BadDigest { key });
        }

        let etag = format!("\"{received}\"");
        let size = data.len();
        self.objects.insert(
            (bucket.clone(), key.clone()),
            StoredObject {
                data,
                etag,
                server_side_encryption,
                metadata,
                tags,
                last_modified: Utc::now(),
            },
        );
        debug!(%bucket, %key, size, "stored object");

        Ok(PutOutcome { hash: received })
    }
}
