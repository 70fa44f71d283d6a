//! Content-verified publishing of database editions to an object store.
//!
//! An edition's bytes arrive as an untrusted stream. They are staged to a
//! local file while an MD5 digest is computed, checked against the digest the
//! caller expects, and only then uploaded with a single atomic put under the
//! edition's canonical key. The remote hash of an edition can be queried
//! beforehand so that unchanged editions are never fetched or uploaded.
//!
//! # Architecture
//!
//! ```text
//!   input stream (AsyncRead)
//!        |
//!        v
//!   StagingWriter  --->  <staging_dir>/<edition>.mmdb.temporary
//!        |
//!        v
//!   StagedFile --validate_hash--> ValidatedFile
//!        |
//!        v
//!   EditionPublisher (query / write / republish)
//!        |
//!        v
//!   ObjectStore (in-memory, S3)
//! ```

pub mod checksums;
pub mod config;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod staging;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{PublisherConfig, StagingRetention};
pub use error::{PublishError, PublishErrorKind, StoreError};
pub use memory::InMemoryObjectStore;
pub use publisher::EditionPublisher;
pub use store::{ObjectStore, RemoteHash};
pub use types::{ContentHash, EditionId};
