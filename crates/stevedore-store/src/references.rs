use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::sync::RwLock;
use stevedore_schema::{BundleId, BundleRef};
use tempfile::NamedTempFile;

/// Mutable mapping from human-readable references to bundle digests.
///
/// A reference is bound to exactly one digest at any instant; rebinding a
/// name moves it, so `references(digest)` is always exactly the set of names
/// currently pointing there. The table is persisted as a single JSON document
/// rewritten atomically on every mutation.
pub struct ReferenceStore {
    layout: StoreLayout,
    bindings: RwLock<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RefTable {
    bindings: BTreeMap<String, String>,
}

impl ReferenceStore {
    pub fn open(layout: StoreLayout) -> Result<Self, StoreError> {
        let path = layout.references_file();
        let bindings = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let table: RefTable = serde_json::from_str(&content)?;
            table.bindings
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            layout,
            bindings: RwLock::new(bindings),
        })
    }

    /// Bind `reference` to `digest`. If the reference is already bound to a
    /// different digest, the binding only moves when `force` is true.
    pub fn add_tag(
        &self,
        reference: &BundleRef,
        digest: &BundleId,
        force: bool,
    ) -> Result<(), StoreError> {
        if let Some(bound) = reference.digest() {
            if bound != digest.as_str() {
                return Err(StoreError::InvalidBinding {
                    reference: reference.to_string(),
                    digest: digest.to_string(),
                });
            }
        }

        let key = reference.to_string();
        let mut bindings = self.bindings.write().expect("reference table poisoned");
        if let Some(existing) = bindings.get(&key) {
            if existing != digest.as_str() && !force {
                return Err(StoreError::Conflict {
                    reference: key,
                    existing: existing.clone(),
                });
            }
        }
        bindings.insert(key, digest.to_string());
        self.save(&bindings)
    }

    pub fn get(&self, reference: &BundleRef) -> Result<BundleId, StoreError> {
        let bindings = self.bindings.read().expect("reference table poisoned");
        bindings
            .get(&reference.to_string())
            .map(BundleId::new)
            .ok_or_else(|| StoreError::ReferenceNotFound(reference.to_string()))
    }

    /// All references currently bound to `digest`, sorted by their canonical
    /// string form. An unbound digest yields an empty set, not an error.
    pub fn references(&self, digest: &BundleId) -> Vec<BundleRef> {
        let bindings = self.bindings.read().expect("reference table poisoned");
        bindings
            .iter()
            .filter(|(_, d)| d.as_str() == digest.as_str())
            .filter_map(|(r, _)| BundleRef::parse(r).ok())
            .collect()
    }

    /// Remove a binding, returning the digest it pointed to.
    pub fn delete(&self, reference: &BundleRef) -> Result<BundleId, StoreError> {
        let key = reference.to_string();
        let mut bindings = self.bindings.write().expect("reference table poisoned");
        let digest = bindings
            .remove(&key)
            .ok_or(StoreError::ReferenceNotFound(key))?;
        self.save(&bindings)?;
        Ok(BundleId::new(digest))
    }

    fn save(&self, bindings: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let table = RefTable {
            bindings: bindings.clone(),
        };
        let content = serde_json::to_string_pretty(&table)?;
        let root = self.layout.root().to_path_buf();
        let mut tmp = NamedTempFile::new_in(&root)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.references_file())
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&root)?;
        Ok(())
    }
}
