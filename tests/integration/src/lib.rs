//! Integration tests for dbpublish against an S3-compatible server.
//!
//! These tests require a server listening at `S3_ENDPOINT_URL`
//! (default `localhost:4566`). They are marked `#[ignore]` so they don't run
//! during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p dbpublish-integration -- --ignored
//! ```

use std::sync::Once;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use dbpublish_core::types::DATABASE_EXTENSION;
use dbpublish_core::{EditionId, EditionPublisher, PublisherConfig};
use dbpublish_s3::S3ObjectStore;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// S3 client for the server at `S3_ENDPOINT_URL`, with static test credentials.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let endpoint =
        std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned());
    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "dbpublish-it"))
        .endpoint_url(endpoint)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Unique bucket name for editions published by one test.
#[must_use]
pub fn editions_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("editions-{prefix}-{}", &id[..8])
}

/// One test's publishing environment: a client, a bucket of editions and a
/// private staging directory.
#[derive(Debug)]
pub struct PublishContext {
    /// Raw client, for checking what was published.
    pub client: aws_sdk_s3::Client,
    /// Bucket editions are published to.
    pub bucket: String,
    staging: tempfile::TempDir,
}

impl PublishContext {
    /// Context whose bucket exists on the server.
    pub async fn new(prefix: &str) -> Self {
        let context = Self::without_bucket(prefix);
        context
            .client
            .create_bucket()
            .bucket(&context.bucket)
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to create bucket {}: {e}", context.bucket));
        context
    }

    /// Context whose bucket was never created.
    #[must_use]
    pub fn without_bucket(prefix: &str) -> Self {
        Self {
            client: s3_client(),
            bucket: editions_bucket_name(prefix),
            staging: tempfile::tempdir().unwrap_or_else(|e| panic!("staging dir: {e}")),
        }
    }

    /// Publisher targeting this context's bucket and staging directory.
    #[must_use]
    pub fn publisher(&self) -> EditionPublisher<S3ObjectStore> {
        let config = PublisherConfig::builder()
            .bucket(self.bucket.clone())
            .staging_dir(self.staging.path().display().to_string())
            .build();
        EditionPublisher::new(S3ObjectStore::new(self.client.clone()), config)
    }

    /// Raw `GetObject` of the published copy of `edition`.
    pub async fn fetch(
        &self,
        edition: &EditionId,
    ) -> Option<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(edition.object_key())
            .send()
            .await
            .ok()
    }

    /// Remove every published edition, then the bucket.
    pub async fn cleanup(self) {
        if let Ok(listing) = self.client.list_objects_v2().bucket(&self.bucket).send().await {
            let editions = listing
                .contents()
                .iter()
                .filter_map(|obj| obj.key())
                .filter(|key| key.ends_with(DATABASE_EXTENSION));
            for key in editions {
                let _ = self
                    .client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await;
            }
        }
        let _ = self.client.delete_bucket().bucket(&self.bucket).send().await;
    }
}

mod test_publish;
mod test_query;
