//! Bundle manifest parsing, reference grammar, and content identity for Stevedore.
//!
//! This crate defines the application-bundle wire format (a JSON document listing
//! the services of an application), the `name[:tag|@digest]` reference grammar used
//! to address stored bundles, and the blake3 content digest that serves as a
//! bundle's identity.

pub mod bundle;
pub mod reference;
pub mod types;

pub use bundle::{compute_bundle_id, Bundle, ServiceSpec};
pub use reference::{is_bundle_id, parse_ref_or_id, BundleRef, RefOrId, DEFAULT_TAG};
pub use types::{BundleId, ServiceId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to decode bundle manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid reference format: '{0}'")]
    InvalidReference(String),
    #[error("invalid tag: '{0}'")]
    InvalidTag(String),
    #[error("invalid digest: '{0}'")]
    InvalidDigest(String),
    #[error("service name must not be empty")]
    EmptyServiceName,
    #[error("service '{0}' has an empty image reference")]
    EmptyServiceImage(String),
    #[error("duplicate service name: '{0}'")]
    DuplicateService(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display_invalid_reference() {
        let e = SchemaError::InvalidReference("UP PER".to_owned());
        assert!(e.to_string().contains("UP PER"));
    }

    #[test]
    fn schema_error_display_empty_image() {
        let e = SchemaError::EmptyServiceImage("web".to_owned());
        assert!(e.to_string().contains("web"));
    }

    #[test]
    fn schema_error_display_duplicate_service() {
        let e = SchemaError::DuplicateService("db".to_owned());
        assert!(e.to_string().contains("duplicate"));
        assert!(e.to_string().contains("db"));
    }
}
