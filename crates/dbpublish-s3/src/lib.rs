//! Amazon S3 backend for the dbpublish [`ObjectStore`] seam.
//!
//! [`S3ObjectStore`] wraps an [`aws_sdk_s3::Client`]. The remote content
//! identifier of an object is its ETag, which S3 sets to the hex MD5 of the
//! body for single-part uploads encrypted with `AES256` (or not encrypted).
//! Objects encrypted with `aws:kms` carry an opaque ETag, so their hash never
//! equals an expected MD5 and they are always considered stale.
//!
//! Lookups use `GetObject` and drop the body unread. Unlike `HeadObject`,
//! whose 404 carries no error code, a failed `GetObject` says whether the key
//! or the whole bucket is missing.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use dbpublish_core::checksums::content_md5_header;
use dbpublish_core::error::StoreError;
use dbpublish_core::store::{
    ObjectStore, PutOutcome, PutRequest, RemoteHash, ServerSideEncryption, encode_tagging,
};
use dbpublish_core::types::ContentHash;
use tracing::{debug, trace};

/// [`ObjectStore`] backed by Amazon S3 or an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS configuration chain
    /// (environment, profile, instance metadata).
    ///
    /// `endpoint_url` points the client at an S3-compatible service;
    /// `force_path_style` is usually needed alongside it.
    pub async fn from_env(endpoint_url: Option<&str>, force_path_style: bool) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(force_path_style);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        Self::new(aws_sdk_s3::Client::from_conf(builder.build()))
    }

    /// The underlying SDK client.
    #[must_use]
    pub fn client(&self) -> &aws_sdk_s3::Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<RemoteHash, StoreError> {
        let result = self.client.get_object().bucket(bucket).key(key).send().await;

        match result {
            Ok(output) => {
                // Only the ETag is needed; the body is closed unread.
                let etag = output.e_tag().map(ContentHash::from_etag);
                drop(output.body);
                trace!(bucket, key, ?etag, "fetched object metadata");
                etag.map(RemoteHash::Found).ok_or_else(|| {
                    StoreError::backend(format!("response for {bucket}/{key} has no ETag"))
                })
            }
            Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => {
                trace!(bucket, key, "object does not exist");
                Ok(RemoteHash::Absent)
            }
            Err(e) => Err(map_sdk_error(&e, bucket, key)),
        }
    }

    async fn put(&self, request: PutRequest) -> Result<PutOutcome, StoreError> {
        let PutRequest {
            bucket,
            key,
            body,
            content_length,
            content_md5,
            server_side_encryption,
            metadata,
            tags,
        } = request;

        let content_md5_b64 = content_md5_header(&content_md5)
            .ok_or_else(|| StoreError::backend(format!("invalid content MD5 {content_md5}")))?;
        let length = i64::try_from(content_length)
            .map_err(|_| StoreError::backend(format!("object too large: {content_length} bytes")))?;
        let body = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("preparing upload body for {key}"),
                source: Some(Box::new(e)),
            })?;

        let mut op = self
            .client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(body)
            .content_length(length)
            .content_md5(content_md5_b64);
        if let Some(sse) = server_side_encryption {
            op = op.server_side_encryption(sdk_encryption(sse));
        }
        for (name, value) in metadata {
            op = op.metadata(name, value);
        }
        if !tags.is_empty() {
            op = op.tagging(encode_tagging(&tags));
        }

        let output = op
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &bucket, &key))?;
        let hash = output
            .e_tag()
            .map_or_else(|| content_md5.clone(), ContentHash::from_etag);
        debug!(%bucket, %key, %hash, "put object");
        Ok(PutOutcome { hash })
    }
}

fn sdk_encryption(sse: ServerSideEncryption) -> aws_sdk_s3::types::ServerSideEncryption {
    match sse {
        ServerSideEncryption::Aes256 => aws_sdk_s3::types::ServerSideEncryption::Aes256,
        ServerSideEncryption::AwsKms => aws_sdk_s3::types::ServerSideEncryption::AwsKms,
    }
}

fn map_sdk_error<E, R>(err: &SdkError<E, R>, bucket: &str, key: &str) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    classify(err.code(), bucket, key)
        .unwrap_or_else(|| StoreError::backend(DisplayErrorContext(err).to_string()))
}

/// Map a well-known S3 error code onto a [`StoreError`] variant.
fn classify(code: Option<&str>, bucket: &str, key: &str) -> Option<StoreError> {
    match code? {
        "NoSuchBucket" => Some(StoreError::NoSuchBucket {
            bucket: bucket.to_owned(),
        }),
        "AccessDenied" | "AllAccessDisabled" => Some(StoreError::AccessDenied {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        }),
        "BadDigest" | "InvalidDigest" => Some(StoreError::BadDigest {
            key: key.to_owned(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    use super::*;

    #[test]
    fn test_should_classify_missing_bucket() {
        let err = classify(Some("NoSuchBucket"), "databases", "a.mmdb").unwrap();
        assert!(matches!(err, StoreError::NoSuchBucket { bucket } if bucket == "databases"));
    }

    #[test]
    fn test_should_classify_access_denied() {
        let err = classify(Some("AccessDenied"), "databases", "a.mmdb").unwrap();
        assert!(matches!(err, StoreError::AccessDenied { .. }));
        assert_eq!(err.to_string(), "access denied to databases/a.mmdb");
    }

    #[test]
    fn test_should_classify_bad_digest() {
        let err = classify(Some("BadDigest"), "databases", "a.mmdb").unwrap();
        assert!(matches!(err, StoreError::BadDigest { .. }));
    }

    #[test]
    fn test_should_leave_unknown_codes_to_backend() {
        assert!(classify(Some("SlowDown"), "b", "k").is_none());
        assert!(classify(None, "b", "k").is_none());
    }

    #[test]
    fn test_should_map_encryption_to_sdk_type() {
        assert_eq!(
            sdk_encryption(ServerSideEncryption::Aes256).as_str(),
            "AES256"
        );
        assert_eq!(
            sdk_encryption(ServerSideEncryption::AwsKms).as_str(),
            "aws:kms"
        );
    }

    #[test]
    fn test_should_wrap_existing_client() {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "unit-test"))
            .endpoint_url("http://localhost:4566")
            .force_path_style(true)
            .build();
        let store = S3ObjectStore::new(aws_sdk_s3::Client::from_conf(config));
        assert_eq!(
            store.client().config().region().map(ToString::to_string),
            Some("us-east-1".to_owned())
        );
    }
}
