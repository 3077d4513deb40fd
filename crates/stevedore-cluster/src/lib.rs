//! Stack deployment for Stevedore clusters.
//!
//! A stack is one deployed instance of a bundle: every service the bundle
//! declares becomes one orchestrator service named `stack-service`. This
//! crate owns only the expansion and submission; resolving references to
//! manifests and actually scheduling services are injected at the seams.

pub mod names;
pub mod stack;

pub use stack::{Cluster, CreateServiceRequest, ServiceMode, StackDeployment};

use thiserror::Error;

use stevedore_schema::Bundle;

/// Errors surfaced by cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("this node is not an active cluster manager")]
    NoManager,

    #[error("a bundle reference is required to deploy a stack")]
    EmptyReference,

    #[error("cannot resolve bundle '{reference}': {reason}")]
    Resolve { reference: String, reason: String },

    #[error("failed to create service '{name}': {reason}")]
    ServiceCreate { name: String, reason: String },
}

/// Role this node currently holds in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Not part of a cluster.
    Inactive,
    /// Cluster member without scheduling authority.
    Worker,
    /// Active manager; the only role that may deploy stacks.
    Manager,
}

/// Resolves a bundle reference to its decoded manifest.
///
/// On an engine node this is backed by the local bundle daemon; tests swap
/// in a fixed table.
pub trait BundleResolver: Send + Sync {
    fn resolve_bundle(&self, reference: &str) -> Result<Bundle, ClusterError>;
}

/// Submits service specs to the cluster orchestrator.
pub trait OrchestratorClient: Send + Sync {
    fn create_service(
        &self,
        request: CreateServiceRequest,
    ) -> Result<stevedore_schema::ServiceId, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            ClusterError::NoManager.to_string(),
            "this node is not an active cluster manager"
        );
        let err = ClusterError::ServiceCreate {
            name: "web-frontend".into(),
            reason: "quota exceeded".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to create service 'web-frontend': quota exceeded"
        );
    }
}
