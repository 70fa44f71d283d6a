//! Edition identifiers and content hashes.
//!
//! An [`EditionId`] names one logical database. It maps deterministically to
//! the canonical remote key (`<id>.mmdb`) and to the file name used while the
//! edition is staged locally (`<id>.mmdb.temporary`).
//!
//! A [`ContentHash`] is the lowercase hex MD5 of an edition's bytes. The
//! all-zero hash stands for "no content published yet".

use std::fmt;
use std::str::FromStr;

/// Extension appended to an edition identifier to form its remote key.
pub const DATABASE_EXTENSION: &str = ".mmdb";

/// Suffix appended to the remote key to form the staging file name.
pub const STAGING_SUFFIX: &str = ".temporary";

/// Length of a hex-encoded MD5 digest.
const MD5_HEX_LEN: usize = 32;

// ---------------------------------------------------------------------------
// EditionId
// ---------------------------------------------------------------------------

/// Identifier of a database edition, e.g. `GeoLite2-City`.
///
/// Identifiers are used verbatim as the prefix of both the remote key and the
/// staging file name, so anything that could escape the staging directory
/// (path separators, NUL, `.`/`..`) is rejected at construction.
///
/// # Examples
///
/// ```
/// use dbpublish_core::types::EditionId;
///
/// let edition = EditionId::new("GeoLite2-City").unwrap();
/// assert_eq!(edition.object_key(), "GeoLite2-City.mmdb");
/// assert!(EditionId::new("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditionId(String);

/// Error returned when an edition identifier is not usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid edition id {id:?}: {reason}")]
pub struct InvalidEditionId {
    /// The rejected identifier.
    pub id: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl EditionId {
    /// Create an edition identifier.
    ///
    /// # Errors
    /// Returns [`InvalidEditionId`] for empty identifiers, `.`/`..`, and
    /// identifiers containing `/`, `\` or NUL.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidEditionId> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id == "." || id == ".." {
            Some("must not be a relative directory name")
        } else if id.contains(['/', '\\', '\0']) {
            Some("must not contain path separators or NUL")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(InvalidEditionId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical remote key for this edition.
    #[must_use]
    pub fn object_key(&self) -> String {
        format!("{}{DATABASE_EXTENSION}", self.0)
    }

    /// File name used while this edition is being staged.
    #[must_use]
    pub fn staging_file_name(&self) -> String {
        format!("{}{STAGING_SUFFIX}", self.object_key())
    }
}

impl fmt::Display for EditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EditionId {
    type Err = InvalidEditionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// Lowercase hex MD5 digest of an edition's content.
///
/// Values parsed from user input are validated with [`ContentHash::from_hex`].
/// Values read back from an object store go through
/// [`ContentHash::from_etag`], which only normalizes: a multipart ETag such as
/// `"9b2cf535f27731c974343645a3985328-2"` is kept as-is and simply never
/// equals a plain MD5.
///
/// # Examples
///
/// ```
/// use dbpublish_core::types::ContentHash;
///
/// let expected = ContentHash::from_hex("FC5E038D38A57032085441E7FE7010B0").unwrap();
/// let remote = ContentHash::from_etag("\"fc5e038d38a57032085441e7fe7010b0\"");
/// assert_eq!(expected, remote);
/// assert!(ContentHash::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

/// Error returned when a string is not a hex MD5 digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MD5 hex digest: {0:?}")]
pub struct InvalidContentHash(pub String);

impl ContentHash {
    /// The sentinel value meaning "no content exists".
    pub const ZERO_HEX: &str = "00000000000000000000000000000000";

    /// The zero hash.
    #[must_use]
    pub fn zero() -> Self {
        Self(Self::ZERO_HEX.to_owned())
    }

    /// Parse a 32-character hex digest, case-insensitively.
    ///
    /// # Errors
    /// Returns [`InvalidContentHash`] if the input is not 32 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, InvalidContentHash> {
        let s = s.trim();
        if s.len() != MD5_HEX_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidContentHash(s.to_owned()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Normalize an ETag (quoted or not) into a content hash.
    #[must_use]
    pub fn from_etag(etag: &str) -> Self {
        Self(etag.trim().trim_matches('"').to_ascii_lowercase())
    }

    /// Hex-encode a raw 16-byte digest.
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Whether this is the "no content" sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO_HEX
    }

    /// Get the hex digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw digest bytes, if this hash is a plain hex MD5.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.0.len() != MD5_HEX_LEN {
            return None;
        }
        hex::decode(&self.0).ok()
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = InvalidContentHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
