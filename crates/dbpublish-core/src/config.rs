//! Publisher configuration.
//!
//! Provides [`PublisherConfig`], fixed for the lifetime of an
//! [`EditionPublisher`](crate::publisher::EditionPublisher). Values can be
//! loaded from environment variables via [`PublisherConfig::from_env`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::staging::{DEFAULT_STAGING_DIR, StagingArea};
use crate::store::ServerSideEncryption;

// ---------------------------------------------------------------------------
// StagingRetention
// ---------------------------------------------------------------------------

/// What happens to a staging file once an attempt is over.
///
/// Files from failed attempts are always kept, so that a failed upload can be
/// retried from disk without fetching the edition again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StagingRetention {
    /// Leave the staging file in place after a successful publish.
    #[default]
    Keep,
    /// Delete the staging file after a successful publish.
    RemoveOnSuccess,
}

impl StagingRetention {
    /// Configuration string for this policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::RemoveOnSuccess => "remove-on-success",
        }
    }
}

impl fmt::Display for StagingRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`StagingRetention`] fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown staging retention policy: {0}")]
pub struct ParseStagingRetentionError(String);

impl FromStr for StagingRetention {
    type Err = ParseStagingRetentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "remove-on-success" | "remove" => Ok(Self::RemoveOnSuccess),
            _ => Err(ParseStagingRetentionError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// PublisherConfig
// ---------------------------------------------------------------------------

/// Edition publisher configuration.
///
/// # Examples
///
/// ```
/// use dbpublish_core::config::PublisherConfig;
///
/// let config = PublisherConfig::builder()
///     .bucket("databases".into())
///     .disable_encryption(true)
///     .build();
/// assert!(config.server_side_encryption().is_none());
/// assert_eq!(config.staging_dir, "tmp");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Bucket holding published editions.
    #[builder(default = String::from("databases"))]
    pub bucket: String,

    /// Upload without server-side encryption, for stores that manage
    /// encryption themselves or do not support the header.
    #[builder(default = false)]
    pub disable_encryption: bool,

    /// Encryption algorithm requested when encryption is enabled.
    #[builder(default)]
    pub sse_algorithm: ServerSideEncryption,

    /// Directory holding staging files.
    #[builder(default = String::from(DEFAULT_STAGING_DIR))]
    pub staging_dir: String,

    /// Staging file retention after a successful publish.
    #[builder(default)]
    pub staging_retention: StagingRetention,

    /// Tag published objects with the source's modification date.
    #[builder(default = true)]
    pub tag_modification_date: bool,

    /// Log each successful publish at `info` instead of `debug`.
    #[builder(default = false)]
    pub verbose: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            bucket: String::from("databases"),
            disable_encryption: false,
            sse_algorithm: ServerSideEncryption::default(),
            staging_dir: String::from(DEFAULT_STAGING_DIR),
            staging_retention: StagingRetention::default(),
            tag_modification_date: true,
            verbose: false,
            log_level: String::from("info"),
        }
    }
}

impl PublisherConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PUBLISH_BUCKET` | `databases` |
    /// | `PUBLISH_DISABLE_ENCRYPTION` | `false` |
    /// | `PUBLISH_SSE_ALGORITHM` | `AES256` |
    /// | `PUBLISH_STAGING_DIR` | `tmp` |
    /// | `PUBLISH_STAGING_RETENTION` | `keep` |
    /// | `PUBLISH_TAG_MODIFICATION_DATE` | `true` |
    /// | `PUBLISH_VERBOSE` | `false` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable enum values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("PUBLISH_BUCKET") {
            config.bucket = v;
        }
        if let Some(v) = lookup("PUBLISH_DISABLE_ENCRYPTION") {
            config.disable_encryption = parse_bool(&v);
        }
        if let Some(v) = lookup("PUBLISH_SSE_ALGORITHM") {
            match v.parse() {
                Ok(algorithm) => config.sse_algorithm = algorithm,
                Err(e) => warn!(error = %e, "ignoring PUBLISH_SSE_ALGORITHM"),
            }
        }
        if let Some(v) = lookup("PUBLISH_STAGING_DIR") {
            config.staging_dir = v;
        }
        if let Some(v) = lookup("PUBLISH_STAGING_RETENTION") {
            match v.parse() {
                Ok(retention) => config.staging_retention = retention,
                Err(e) => warn!(error = %e, "ignoring PUBLISH_STAGING_RETENTION"),
            }
        }
        if let Some(v) = lookup("PUBLISH_TAG_MODIFICATION_DATE") {
            config.tag_modification_date = parse_bool(&v);
        }
        if let Some(v) = lookup("PUBLISH_VERBOSE") {
            config.verbose = parse_bool(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Encryption to request on upload, or `None` when disabled.
    #[must_use]
    pub fn server_side_encryption(&self) -> Option<ServerSideEncryption> {
        (!self.disable_encryption).then_some(self.sse_algorithm)
    }

    /// Staging area rooted at [`staging_dir`](Self::staging_dir).
    #[must_use]
    pub fn staging_area(&self) -> StagingArea {
        StagingArea::new(&self.staging_dir)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
