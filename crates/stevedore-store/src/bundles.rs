use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::RwLock;
use stevedore_schema::{compute_bundle_id, Bundle, BundleId};
use tempfile::NamedTempFile;

/// Content-addressable store of application bundles.
///
/// Bundles are stored as files named by the blake3 digest of their canonical
/// bytes, with a guarded in-memory index for lookups. Writes are atomic via
/// `NamedTempFile`; entries are immutable once stored (re-creating identical
/// bytes is a no-op returning the same ID).
pub struct BundleStore {
    layout: StoreLayout,
    index: RwLock<HashMap<String, Entry>>,
}

#[derive(Clone)]
struct Entry {
    bundle: Bundle,
    raw: Vec<u8>,
}

impl BundleStore {
    /// Open the store rooted at `layout`, loading all persisted bundles into
    /// the index. Files whose contents no longer match their digest name are
    /// skipped with a warning rather than poisoning the whole store.
    pub fn open(layout: StoreLayout) -> Result<Self, StoreError> {
        let mut index = HashMap::new();
        let dir = layout.bundles_dir();
        if dir.exists() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(id) = name.to_str() else { continue };
                if id.starts_with('.') {
                    continue;
                }
                let raw = fs::read(entry.path())?;
                if compute_bundle_id(&raw).as_str() != id {
                    tracing::warn!("skipping corrupted bundle entry '{id}': digest mismatch");
                    continue;
                }
                match Bundle::from_json(&raw) {
                    Ok(bundle) => {
                        index.insert(id.to_owned(), Entry { bundle, raw });
                    }
                    Err(e) => {
                        tracing::warn!("skipping undecodable bundle entry '{id}': {e}");
                    }
                }
            }
        }
        Ok(Self {
            layout,
            index: RwLock::new(index),
        })
    }

    /// Store canonical bundle bytes and return their content digest.
    /// Idempotent — re-creating identical bytes returns the same ID.
    pub fn create(&self, data: &[u8]) -> Result<BundleId, StoreError> {
        let bundle = Bundle::from_json(data)?;
        let id = compute_bundle_id(data);

        let mut index = self.index.write().expect("bundle index poisoned");
        if index.contains_key(id.as_str()) {
            return Ok(id);
        }

        let dir = self.layout.bundles_dir();
        let dest = self.layout.bundle_path(id.as_str());
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        index.insert(
            id.to_string(),
            Entry {
                bundle,
                raw: data.to_vec(),
            },
        );
        tracing::debug!("stored bundle {}", id.short());
        Ok(id)
    }

    pub fn get(&self, id: &BundleId) -> Result<Bundle, StoreError> {
        let index = self.index.read().expect("bundle index poisoned");
        index
            .get(id.as_str())
            .map(|e| e.bundle.clone())
            .ok_or_else(|| StoreError::BundleNotFound(id.to_string()))
    }

    /// The canonical bytes stored under `id`, as needed for registry transfer.
    pub fn get_bytes(&self, id: &BundleId) -> Result<Vec<u8>, StoreError> {
        let index = self.index.read().expect("bundle index poisoned");
        index
            .get(id.as_str())
            .map(|e| e.raw.clone())
            .ok_or_else(|| StoreError::BundleNotFound(id.to_string()))
    }

    pub fn delete(&self, id: &BundleId) -> Result<(), StoreError> {
        let mut index = self.index.write().expect("bundle index poisoned");
        if index.remove(id.as_str()).is_none() {
            return Err(StoreError::BundleNotFound(id.to_string()));
        }
        let path = self.layout.bundle_path(id.as_str());
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Resolve a (possibly partial) ID prefix to exactly one stored bundle.
    pub fn search(&self, prefix: &str) -> Result<BundleId, StoreError> {
        if prefix.is_empty() {
            return Err(StoreError::BundleNotFound(prefix.to_owned()));
        }
        let index = self.index.read().expect("bundle index poisoned");
        let mut found: Option<&str> = None;
        for id in index.keys() {
            if id.starts_with(prefix) {
                if found.is_some() {
                    return Err(StoreError::AmbiguousPrefix(prefix.to_owned()));
                }
                found = Some(id);
            }
        }
        found
            .map(BundleId::new)
            .ok_or_else(|| StoreError::BundleNotFound(prefix.to_owned()))
    }

    /// Point-in-time snapshot of the full ID → bundle mapping. The copy is
    /// taken under a read lock only, so enumeration never blocks writers.
    pub fn map(&self) -> HashMap<BundleId, Bundle> {
        let index = self.index.read().expect("bundle index poisoned");
        index
            .iter()
            .map(|(id, e)| (BundleId::new(id.clone()), e.bundle.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().expect("bundle index poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, BundleStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let store = BundleStore::open(layout).unwrap();
        (dir, store)
    }

    fn bundle_bytes(name: &str) -> Vec<u8> {
        format!(r#"{{"Services": [{{"Name": "{name}", "Image": "img:latest"}}]}}"#).into_bytes()
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (_dir, store) = test_store();
        let id = store.create(&bundle_bytes("web")).unwrap();
        let bundle = store.get(&id).unwrap();
        assert_eq!(bundle.services[0].name, "web");
    }

    #[test]
    fn create_is_idempotent() {
        let (_dir, store) = test_store();
        let data = bundle_bytes("web");
        let a = store.create(&data).unwrap();
        let b = store.create(&data).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_bytes_returns_stored_bytes_unchanged() {
        let (_dir, store) = test_store();
        let data = bundle_bytes("web");
        let id = store.create(&data).unwrap();
        assert_eq!(store.get_bytes(&id).unwrap(), data);
    }

    #[test]
    fn get_nonexistent_fails() {
        let (_dir, store) = test_store();
        let r = store.get(&BundleId::new("nope"));
        assert!(matches!(r, Err(StoreError::BundleNotFound(_))));
    }

    #[test]
    fn delete_removes_entry() {
        let (_dir, store) = test_store();
        let id = store.create(&bundle_bytes("web")).unwrap();
        store.delete(&id).unwrap();
        assert!(store.get(&id).is_err());
        assert!(matches!(
            store.delete(&id),
            Err(StoreError::BundleNotFound(_))
        ));
    }

    #[test]
    fn search_resolves_unique_prefix() {
        let (_dir, store) = test_store();
        let id = store.create(&bundle_bytes("web")).unwrap();
        let found = store.search(&id.as_str()[..12]).unwrap();
        assert_eq!(found, id);
    }

    #[test]
    fn search_missing_prefix_fails() {
        let (_dir, store) = test_store();
        store.create(&bundle_bytes("web")).unwrap();
        assert!(matches!(
            store.search("zzzz"),
            Err(StoreError::BundleNotFound(_))
        ));
    }

    #[test]
    fn search_ambiguous_prefix_fails() {
        let (_dir, store) = test_store();
        // Store bundles until two share a first hex character; with sixteen
        // distinct bundles a collision on the 1-char prefix is guaranteed.
        let mut first_chars = std::collections::HashMap::new();
        for i in 0..17 {
            let id = store.create(&bundle_bytes(&format!("svc{i}"))).unwrap();
            let c = id.as_str()[..1].to_owned();
            if let Some(()) = first_chars.insert(c.clone(), ()) {
                assert!(matches!(
                    store.search(&c),
                    Err(StoreError::AmbiguousPrefix(_))
                ));
                return;
            }
        }
        panic!("expected a shared 1-char prefix among 17 bundles");
    }

    #[test]
    fn map_is_a_snapshot() {
        let (_dir, store) = test_store();
        let id = store.create(&bundle_bytes("web")).unwrap();
        let snapshot = store.map();
        store.delete(&id).unwrap();
        // The snapshot still holds the deleted bundle.
        assert!(snapshot.contains_key(&id));
        assert!(store.map().is_empty());
    }

    #[test]
    fn open_reloads_persisted_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let id = {
            let store = BundleStore::open(layout.clone()).unwrap();
            store.create(&bundle_bytes("web")).unwrap()
        };
        let reopened = BundleStore::open(layout).unwrap();
        assert!(reopened.get(&id).is_ok());
    }

    #[test]
    fn open_skips_corrupted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        {
            let store = BundleStore::open(layout.clone()).unwrap();
            store.create(&bundle_bytes("web")).unwrap();
        }
        std::fs::write(layout.bundle_path("not-a-digest"), b"garbage").unwrap();
        let reopened = BundleStore::open(layout).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn create_rejects_undecodable_bytes() {
        let (_dir, store) = test_store();
        assert!(store.create(b"NOT JSON").is_err());
    }

    #[test]
    fn hash_is_deterministic() {
        let (_dir, store) = test_store();
        let a = store.create(&bundle_bytes("same")).unwrap();
        let b = store.create(&bundle_bytes("same")).unwrap();
        assert_eq!(a, b);
        let c = store.create(&bundle_bytes("other")).unwrap();
        assert_ne!(a, c);
    }
}
