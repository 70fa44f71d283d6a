//! Publish integration tests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::types::ServerSideEncryption;
    use chrono::{TimeZone, Utc};
    use dbpublish_core::checksums::compute_md5;
    use dbpublish_core::store::{DATE_MODIFIED_TAG, MD5_METADATA_KEY};
    use dbpublish_core::{EditionId, PublishErrorKind};

    use crate::PublishContext;

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_publish_verified_edition() {
        let ctx = PublishContext::new("publish").await;
        let publisher = ctx.publisher();

        let edition = EditionId::new("edition").unwrap();
        let expected = compute_md5(b"helloworld");
        let modified = Utc.with_ymd_and_hms(2024, 6, 11, 14, 30, 0).unwrap();
        publisher
            .write(&edition, &b"helloworld"[..], &expected, modified)
            .await
            .unwrap_or_else(|e| panic!("publish failed: {e}"));

        let object = ctx.fetch(&edition).await.expect("published object");
        assert_eq!(object.e_tag(), Some(format!("\"{expected}\"").as_str()));
        assert_eq!(
            object.server_side_encryption(),
            Some(&ServerSideEncryption::Aes256)
        );
        assert_eq!(
            object
                .metadata()
                .and_then(|m| m.get(MD5_METADATA_KEY))
                .map(String::as_str),
            Some(expected.as_str())
        );
        let body = object.body.collect().await.unwrap().into_bytes();
        assert_eq!(body.as_ref(), b"helloworld");

        let tagging = ctx
            .client
            .get_object_tagging()
            .bucket(&ctx.bucket)
            .key(edition.object_key())
            .send()
            .await
            .unwrap();
        let tag = tagging
            .tag_set()
            .iter()
            .find(|t| t.key() == DATE_MODIFIED_TAG)
            .expect("modification date tag");
        assert_eq!(tag.value(), "2024-06-11T14:30:00Z");

        ctx.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_not_upload_mismatched_edition() {
        let ctx = PublishContext::new("mismatch").await;
        let publisher = ctx.publisher();

        let edition = EditionId::new("edition").unwrap();
        let err = publisher
            .write(&edition, &b"helloworld"[..], &compute_md5(b"other"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PublishErrorKind::HashMismatch);
        assert!(
            ctx.fetch(&edition).await.is_none(),
            "mismatched edition must not be uploaded"
        );

        ctx.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_replace_published_edition() {
        let ctx = PublishContext::new("replace").await;
        let publisher = ctx.publisher();
        let edition = EditionId::new("edition").unwrap();

        for body in [&b"first release"[..], &b"second release"[..]] {
            publisher
                .write(&edition, body, &compute_md5(body), Utc::now())
                .await
                .unwrap();
        }

        let hash = publisher.query_hash(&edition).await.unwrap();
        assert_eq!(hash, compute_md5(b"second release"));

        ctx.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_keep_staged_file_when_upload_fails() {
        let ctx = PublishContext::without_bucket("ghost");
        let publisher = ctx.publisher();
        let edition = EditionId::new("edition").unwrap();

        let err = publisher
            .write(&edition, &b"helloworld"[..], &compute_md5(b"helloworld"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PublishErrorKind::RemoteUpload);
        assert!(publisher.staging_area().path_for(&edition).exists());
    }
}
