//! Remote hash query integration tests.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use dbpublish_core::checksums::compute_md5;
    use dbpublish_core::{EditionId, PublishErrorKind};

    use crate::PublishContext;

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_zero_hash_for_missing_edition() {
        let ctx = PublishContext::new("nope").await;

        let hash = ctx
            .publisher()
            .query_hash(&EditionId::new("NOPE").unwrap())
            .await
            .unwrap();
        assert!(hash.is_zero());

        ctx.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_fail_query_on_missing_bucket() {
        let ctx = PublishContext::without_bucket("ghost");

        let err = ctx
            .publisher()
            .query_hash(&EditionId::new("NOPE").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PublishErrorKind::RemoteQuery);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_published_hash_consistently() {
        let ctx = PublishContext::new("query").await;
        let publisher = ctx.publisher();
        let edition = EditionId::new("edition").unwrap();
        let expected = compute_md5(b"helloworld");

        assert!(publisher.needs_update(&edition, &expected).await.unwrap());
        publisher
            .write(&edition, &b"helloworld"[..], &expected, Utc::now())
            .await
            .unwrap();

        let first = publisher.query_hash(&edition).await.unwrap();
        let second = publisher.query_hash(&edition).await.unwrap();
        assert_eq!(first, expected);
        assert_eq!(first, second);
        assert!(!publisher.needs_update(&edition, &expected).await.unwrap());

        ctx.cleanup().await;
    }
}
