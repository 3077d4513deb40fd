//! Content-addressable bundle storage and name bindings for Stevedore.
//!
//! This crate provides the storage layer: a content-addressable `BundleStore`
//! keyed by the blake3 digest of canonical bundle bytes, a mutable
//! `ReferenceStore` mapping human-readable references to digests, a
//! `StoreLayout` for directory structure management, and `StoreLock` for
//! cross-process exclusion. Writes are atomic via `NamedTempFile` and made
//! durable with a parent-directory fsync.

pub mod bundles;
pub mod layout;
pub mod lock;
pub mod references;

pub use bundles::BundleStore;
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use references::ReferenceStore;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
/// Calling `fsync()` on the parent directory makes the rename durable on
/// all filesystems and mount configurations.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bundle not found: {0}")]
    BundleNotFound(String),
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),
    #[error("prefix '{0}' matches more than one bundle")]
    AmbiguousPrefix(String),
    #[error("reference '{reference}' is already bound to {existing}")]
    Conflict { reference: String, existing: String },
    #[error("cannot bind '{reference}' to {digest}: a digest reference must point at its own digest")]
    InvalidBinding { reference: String, digest: String },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid bundle: {0}")]
    Schema(#[from] stevedore_schema::SchemaError),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
}
