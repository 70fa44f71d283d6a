//! MD5 computation for staged editions.
//!
//! The remote store identifies single-part objects by the MD5 of their bytes
//! (the ETag), so MD5 is the only digest needed here. Staging feeds a
//! [`StreamingHasher`] chunk by chunk while writing to disk, which avoids a
//! second pass over the file.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

use crate::types::ContentHash;

/// Compute the MD5 content hash of `data`.
///
/// # Examples
///
/// ```
/// use dbpublish_core::checksums::compute_md5;
///
/// let digest = compute_md5(b"hello");
/// assert_eq!(digest.as_str(), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> ContentHash {
    ContentHash::from_digest(&md5::Md5::digest(data))
}

/// Compute the quoted ETag a store reports for a single-part object.
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", compute_md5(data))
}

/// Base64 encoding of the raw digest, as sent in a `Content-MD5` header.
///
/// Returns `None` for hashes that are not plain MD5 digests.
///
/// # Examples
///
/// ```
/// use dbpublish_core::checksums::{compute_md5, content_md5_header};
///
/// let header = content_md5_header(&compute_md5(b"")).unwrap();
/// assert_eq!(header, "1B2M2Y8AsgTpgAmY7PhCfg==");
/// ```
#[must_use]
pub fn content_md5_header(hash: &ContentHash) -> Option<String> {
    hash.to_bytes().map(|raw| BASE64_STANDARD.encode(raw))
}

// ---------------------------------------------------------------------------
// StreamingHasher
// ---------------------------------------------------------------------------

/// Incremental MD5 hasher that also counts the bytes fed to it.
///
/// # Examples
///
/// ```
/// use dbpublish_core::checksums::{StreamingHasher, compute_md5};
///
/// let mut hasher = StreamingHasher::new();
/// hasher.update(b"hello ");
/// hasher.update(b"world");
/// let (hash, size) = hasher.finish();
/// assert_eq!(hash, compute_md5(b"hello world"));
/// assert_eq!(size, 11);
/// ```
#[derive(Default)]
pub struct StreamingHasher {
    md5: md5::Md5,
    size: u64,
}

impl std::fmt::Debug for StreamingHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingHasher")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl StreamingHasher {
    /// Create an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.md5, data);
        self.size += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Finalize, returning the digest and the total byte count.
    #[must_use]
    pub fn finish(self) -> (ContentHash, u64) {
        let digest = Digest::finalize(self.md5);
        (ContentHash::from_digest(&digest), self.size)
    }
}
