//! Registry transport boundary for Stevedore bundle distribution.
//!
//! This crate owns the seam between the daemon and the wire: the
//! `RegistryClient` trait a transport must implement, the progress-event
//! types and bounded-channel plumbing used to stream transfer status to a
//! caller, cooperative cancellation, and an HTTP client implementation.
//! The wire protocol itself is the transport's concern, not the daemon's.

pub mod config;
pub mod http;
pub mod progress;

pub use config::RegistryConfig;
pub use http::HttpRegistryClient;
pub use progress::{
    progress_channel, stream_progress, ChannelSink, ProgressEvent, ProgressSink,
    PROGRESS_CHANNEL_CAPACITY,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stevedore_schema::BundleRef;
use thiserror::Error;

/// Protocol version sent as `X-Stevedore-Protocol` header on all HTTP requests.
/// Servers can reject clients with incompatible protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("transfer cancelled")]
    Cancelled,
}

/// Credentials presented to a registry for one transfer.
#[derive(Debug, Clone, Default)]
pub struct RegistryCredentials {
    pub token: Option<String>,
}

impl RegistryCredentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a transfer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trait for registry transports capable of uploading a bundle.
///
/// Implementations own the wire protocol and retry policy; the daemon owns
/// only the progress-sink wiring and cancellation plumbing around a call.
pub trait RegistryClient: Send + Sync {
    /// Upload canonical bundle bytes under a tagged reference, reporting
    /// progress to `sink` and honouring `cancel` between protocol steps.
    fn push(
        &self,
        cancel: &CancelToken,
        reference: &BundleRef,
        payload: &[u8],
        sink: &dyn ProgressSink,
        creds: &RegistryCredentials,
    ) -> Result<(), RemoteError>;
}
