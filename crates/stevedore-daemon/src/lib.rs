//! Daemon core for Stevedore.
//!
//! Ties the manifest store, reference store, and registry transport together
//! behind one [`Daemon`] type: resolution of names and digest prefixes,
//! listing with filters, ingestion of new bundles, pushes to a registry, and
//! cascading deletion.

pub mod daemon;
pub mod ingest;
pub mod list;
pub mod push;

pub use daemon::{BundleDetails, Daemon, ServiceDetails};
pub use ingest::BundleSource;
pub use list::{BundleSummary, Filters};

use thiserror::Error;

use stevedore_remote::RemoteError;
use stevedore_schema::SchemaError;
use stevedore_store::StoreError;

/// Version string stamped into manifests that arrive without one.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors surfaced by daemon operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("no such bundle: {0}")]
    RefDoesNotExist(String),

    #[error("invalid filter '{0}'")]
    InvalidFilter(String),

    #[error("invalid bundle source: {0}")]
    InvalidInput(String),

    #[error("no such image: {0}")]
    ImageNotFound(String),

    #[error("refusing to tag a digest reference: digests are derived from content, never assigned")]
    CannotTagDigest,

    #[error("push by digest is not supported; push a tagged reference instead")]
    DigestPushUnsupported,

    #[error("pulling bundles is not supported by this engine")]
    PullUnsupported,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("transport failure: {0}")]
    Transport(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A resolved engine image, as reported by the image backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    /// Content-addressed image identifier.
    pub id: String,
    /// The reference the lookup was performed with.
    pub reference: String,
}

/// Read-only view of the engine's image backend.
///
/// Ingestion refuses manifests whose services name images the backend does
/// not know, and inspection reports the resolved identifier per service.
pub trait ImageStore: Send + Sync {
    /// Looks up an image by reference. `None` means the backend has no such
    /// image.
    fn get(&self, reference: &str) -> Option<ImageSummary>;
}
