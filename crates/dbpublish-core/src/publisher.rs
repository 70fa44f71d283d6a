//! Stage, validate and publish editions.
//!
//! [`EditionPublisher`] runs one attempt per call as a strictly linear
//! sequence:
//!
//! ```text
//! Idle -> Staging -> Validated -> Uploading -> Published
//!            |           |            |
//!            +-----------+------------+--> Failed
//! ```
//!
//! Staging failures and hash mismatches end the attempt before any remote
//! call. An upload failure leaves the staging file on disk so that
//! [`EditionPublisher::republish`] can retry without fetching the edition
//! again.
//!
//! The publisher never decides whether an upload is needed. Callers compare
//! [`EditionPublisher::query_hash`] with the hash they expect (or use
//! [`EditionPublisher::needs_update`]) and only then fetch and
//! [`write`](EditionPublisher::write).
//!
//! # Concurrency
//!
//! Distinct editions may be published concurrently through one publisher.
//! Attempts for the *same* edition share a staging path and must be
//! serialized by the caller.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::config::{PublisherConfig, StagingRetention};
use crate::error::PublishError;
use crate::staging::{StagedFile, StagingArea, StagingWriter, ValidatedFile};
use crate::store::{
    DATE_MODIFIED_TAG, MD5_METADATA_KEY, ObjectStore, PutRequest, RemoteHash, format_modified_tag,
};
use crate::types::{ContentHash, EditionId};

/// Publishes editions to an [`ObjectStore`].
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use dbpublish_core::checksums::compute_md5;
/// use dbpublish_core::config::PublisherConfig;
/// use dbpublish_core::memory::InMemoryObjectStore;
/// use dbpublish_core::publisher::EditionPublisher;
/// use dbpublish_core::staging::StagingArea;
/// use dbpublish_core::types::EditionId;
///
/// # tokio_test::block_on(async {
/// let scratch = tempfile::tempdir().unwrap();
/// let store = InMemoryObjectStore::new();
/// store.create_bucket("databases");
/// let publisher = EditionPublisher::new(store, PublisherConfig::default())
///     .with_staging_area(StagingArea::new(scratch.path()));
///
/// let edition = EditionId::new("edition").unwrap();
/// assert!(publisher.query_hash(&edition).await.unwrap().is_zero());
///
/// let expected = compute_md5(b"helloworld");
/// publisher
///     .write(&edition, &b"helloworld"[..], &expected, Utc::now())
///     .await
///     .unwrap();
/// assert_eq!(publisher.query_hash(&edition).await.unwrap(), expected);
/// # });
/// ```
#[derive(Debug)]
pub struct EditionPublisher<S> {
    store: S,
    config: Arc<PublisherConfig>,
    staging: StagingArea,
    writer: StagingWriter,
}

impl<S: ObjectStore> EditionPublisher<S> {
    /// Create a publisher staging under `config.staging_dir`.
    #[must_use]
    pub fn new(store: S, config: PublisherConfig) -> Self {
        let staging = config.staging_area();
        Self {
            store,
            config: Arc::new(config),
            staging,
            writer: StagingWriter::new(),
        }
    }

    /// Replace the staging area, e.g. with a scratch directory in tests.
    #[must_use]
    pub fn with_staging_area(mut self, staging: StagingArea) -> Self {
        self.staging = staging;
        self
    }

    /// Replace the staging writer.
    #[must_use]
    pub fn with_staging_writer(mut self, writer: StagingWriter) -> Self {
        self.writer = writer;
        self
    }

    /// The publisher configuration.
    #[must_use]
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// The underlying object store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The staging area in use.
    #[must_use]
    pub fn staging_area(&self) -> &StagingArea {
        &self.staging
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Look up the remote content identifier of `edition`.
    ///
    /// A missing object is [`RemoteHash::Absent`]; every other failure,
    /// including a missing bucket, is an error.
    pub async fn lookup(&self, edition: &EditionId) -> Result<RemoteHash, PublishError> {
        let key = edition.object_key();
        let result = self
            .store
            .head(&self.config.bucket, &key)
            .await
            .map_err(|source| PublishError::RemoteQuery {
                edition: edition.clone(),
                bucket: self.config.bucket.clone(),
                key: key.clone(),
                source,
            })?;
        debug!(%edition, %key, bucket = %self.config.bucket, ?result, "looked up remote hash");
        Ok(result)
    }

    /// Remote hash of `edition`, or the zero hash if nothing is published.
    pub async fn query_hash(&self, edition: &EditionId) -> Result<ContentHash, PublishError> {
        self.lookup(edition).await.map(RemoteHash::into_hash)
    }

    /// Whether the published content of `edition` differs from `expected`.
    pub async fn needs_update(
        &self,
        edition: &EditionId,
        expected: &ContentHash,
    ) -> Result<bool, PublishError> {
        Ok(&self.query_hash(edition).await? != expected)
    }

    // -----------------------------------------------------------------------
    // Publish
    // -----------------------------------------------------------------------

    /// Run a full attempt: stage `reader`, check it against `expected`, then
    /// upload it under the canonical key of `edition`.
    ///
    /// `reader` is consumed and dropped whatever the outcome. `modified` is
    /// the source's last-modified time, recorded as a tag when enabled.
    pub async fn write<R>(
        &self,
        edition: &EditionId,
        reader: R,
        expected: &ContentHash,
        modified: DateTime<Utc>,
    ) -> Result<(), PublishError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.staging.path_for(edition);
        let staged = self
            .writer
            .stage(&path, reader)
            .await
            .map_err(|source| PublishError::Staging {
                edition: edition.clone(),
                source,
            })?;
        self.validate_and_publish(edition, staged, expected, modified)
            .await
    }

    /// Retry the upload of `edition` from the staging file left on disk by an
    /// earlier attempt.
    ///
    /// The file is hashed again and checked against `expected` before
    /// uploading.
    pub async fn republish(
        &self,
        edition: &EditionId,
        expected: &ContentHash,
        modified: DateTime<Utc>,
    ) -> Result<(), PublishError> {
        let path = self.staging.path_for(edition);
        let staged = StagedFile::from_disk(&path)
            .await
            .map_err(|source| PublishError::OpenStaged {
                edition: edition.clone(),
                path: path.clone(),
                source,
            })?;
        self.validate_and_publish(edition, staged, expected, modified)
            .await
    }

    /// Upload an already validated staging file.
    ///
    /// The put replaces the object wholesale. On failure the staging file is
    /// left untouched. Returns the content identifier reported by the store.
    pub async fn publish(
        &self,
        edition: &EditionId,
        file: &ValidatedFile,
        modified: DateTime<Utc>,
    ) -> Result<ContentHash, PublishError> {
        let key = edition.object_key();
        let body = file
            .open()
            .await
            .map_err(|source| PublishError::OpenStaged {
                edition: edition.clone(),
                path: file.path().to_path_buf(),
                source,
            })?;

        let request = PutRequest {
            bucket: self.config.bucket.clone(),
            key: key.clone(),
            body,
            content_length: file.size(),
            content_md5: file.hash().clone(),
            server_side_encryption: self.config.server_side_encryption(),
            metadata: BTreeMap::from([(MD5_METADATA_KEY.to_owned(), file.hash().to_string())]),
            tags: self.provenance_tags(modified),
        };

        debug!(
            %edition,
            %key,
            bucket = %self.config.bucket,
            size = file.size(),
            sse = ?request.server_side_encryption,
            "uploading edition"
        );
        let outcome = self
            .store
            .put(request)
            .await
            .map_err(|source| PublishError::RemoteUpload {
                edition: edition.clone(),
                bucket: self.config.bucket.clone(),
                key,
                source,
            })?;

        if self.config.verbose {
            info!(%edition, hash = %file.hash(), "database successfully updated");
        } else {
            debug!(%edition, hash = %file.hash(), "database successfully updated");
        }
        Ok(outcome.hash)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn validate_and_publish(
        &self,
        edition: &EditionId,
        staged: StagedFile,
        expected: &ContentHash,
        modified: DateTime<Utc>,
    ) -> Result<(), PublishError> {
        let validated = staged
            .validate_hash(expected)
            .map_err(|source| PublishError::HashMismatch {
                edition: edition.clone(),
                source,
            })?;
        self.publish(edition, &validated, modified).await?;
        self.apply_retention(edition, validated.path()).await
    }

    fn provenance_tags(&self, modified: DateTime<Utc>) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if self.config.tag_modification_date {
            tags.insert(DATE_MODIFIED_TAG.to_owned(), format_modified_tag(modified));
        }
        tags
    }

    async fn apply_retention(&self, edition: &EditionId, path: &Path) -> Result<(), PublishError> {
        match self.config.staging_retention {
            StagingRetention::Keep => Ok(()),
            StagingRetention::RemoveOnSuccess => {
                tokio::fs::remove_file(path)
                    .await
                    .map_err(|source| PublishError::Cleanup {
                        edition: edition.clone(),
                        action: "removing staged file",
                        source,
                    })?;
                debug!(%edition, path = %path.display(), "removed staged file");
                Ok(())
            }
        }
    }
}
