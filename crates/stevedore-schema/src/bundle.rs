use crate::types::BundleId;
use crate::SchemaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An application bundle: a named collection of service definitions, each
/// referencing a container image.
///
/// Bundles are immutable once stored. The identity of a bundle is the blake3
/// digest of its canonical JSON bytes, so any field change produces a new
/// bundle. `created` and `engine_version` may be absent on ingestion input;
/// the daemon stamps them before the digest is computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

/// One service declared by a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Bundle {
    /// Decode a bundle from its JSON wire form and validate it.
    pub fn from_json(data: &[u8]) -> Result<Self, SchemaError> {
        let bundle: Bundle = serde_json::from_slice(data)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Serialize to canonical JSON bytes. Decoding and re-encoding an
    /// unmodified bundle reproduces these bytes exactly: field order is fixed
    /// by the struct, maps are `BTreeMap`, and absent optionals are skipped.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::BTreeSet::new();
        for s in &self.services {
            if s.name.is_empty() {
                return Err(SchemaError::EmptyServiceName);
            }
            if s.image.is_empty() {
                return Err(SchemaError::EmptyServiceImage(s.name.clone()));
            }
            if !seen.insert(s.name.as_str()) {
                return Err(SchemaError::DuplicateService(s.name.clone()));
            }
        }
        Ok(())
    }
}

/// Compute the content identity of a bundle's canonical bytes.
pub fn compute_bundle_id(canonical: &[u8]) -> BundleId {
    BundleId::new(blake3::hash(canonical).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static [u8] {
        br#"{
            "Created": "2025-03-01T12:00:00Z",
            "EngineVersion": "0.1.0",
            "Labels": {"team": "infra"},
            "Services": [
                {"Name": "web", "Image": "nginx:latest", "Env": ["PORT=80"]},
                {"Name": "db", "Image": "postgres:16", "Command": ["postgres"]}
            ]
        }"#
    }

    #[test]
    fn parses_full_bundle() {
        let b = Bundle::from_json(sample_json()).expect("should parse");
        assert_eq!(b.services.len(), 2);
        assert_eq!(b.services[0].name, "web");
        assert_eq!(b.services[0].image, "nginx:latest");
        assert_eq!(b.labels.get("team").map(String::as_str), Some("infra"));
        assert!(b.created.is_some());
    }

    #[test]
    fn parses_minimal_bundle() {
        let b = Bundle::from_json(br#"{"Services": [{"Name": "a", "Image": "img"}]}"#).unwrap();
        assert!(b.created.is_none());
        assert!(b.engine_version.is_none());
        assert!(b.labels.is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Bundle::from_json(br#"{"Bogus": 1}"#).is_err());
    }

    #[test]
    fn rejects_empty_service_name() {
        let r = Bundle::from_json(br#"{"Services": [{"Name": "", "Image": "img"}]}"#);
        assert!(matches!(r, Err(SchemaError::EmptyServiceName)));
    }

    #[test]
    fn rejects_empty_image() {
        let r = Bundle::from_json(br#"{"Services": [{"Name": "web", "Image": ""}]}"#);
        assert!(matches!(r, Err(SchemaError::EmptyServiceImage(_))));
    }

    #[test]
    fn rejects_duplicate_service_names() {
        let r = Bundle::from_json(
            br#"{"Services": [
                {"Name": "web", "Image": "a"},
                {"Name": "web", "Image": "b"}
            ]}"#,
        );
        assert!(matches!(r, Err(SchemaError::DuplicateService(_))));
    }

    #[test]
    fn canonical_roundtrip_is_stable() {
        let b = Bundle::from_json(sample_json()).unwrap();
        let once = b.to_canonical_json().unwrap();
        let again = Bundle::from_json(&once)
            .unwrap()
            .to_canonical_json()
            .unwrap();
        assert_eq!(once, again);
    }

    #[test]
    fn identical_canonical_bytes_share_an_id() {
        let b = Bundle::from_json(sample_json()).unwrap();
        let bytes = b.to_canonical_json().unwrap();
        assert_eq!(compute_bundle_id(&bytes), compute_bundle_id(&bytes));
    }

    #[test]
    fn any_field_change_changes_the_id() {
        let b = Bundle::from_json(sample_json()).unwrap();
        let mut modified = b.clone();
        modified
            .labels
            .insert("extra".to_owned(), "yes".to_owned());
        let id_a = compute_bundle_id(&b.to_canonical_json().unwrap());
        let id_b = compute_bundle_id(&modified.to_canonical_json().unwrap());
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn created_serializes_as_rfc3339() {
        let b = Bundle::from_json(sample_json()).unwrap();
        let json = String::from_utf8(b.to_canonical_json().unwrap()).unwrap();
        assert!(json.contains("2025-03-01T12:00:00Z"));
    }
}
