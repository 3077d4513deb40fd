//! The [`Daemon`] type and the operations that act on a single bundle:
//! resolution, tagging, inspection, and deletion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use stevedore_remote::RegistryClient;
use stevedore_schema::{parse_ref_or_id, Bundle, BundleId, BundleRef, RefOrId};
use stevedore_store::{BundleStore, ReferenceStore, StoreError, StoreLayout, StoreLock};

use crate::{DaemonError, ImageStore, ImageSummary};

/// Engine-side bundle subsystem.
///
/// Owns the manifest and reference stores under one on-disk root, holds the
/// store lock for its lifetime, and borrows the image backend and registry
/// transport from the surrounding engine.
pub struct Daemon {
    bundles: BundleStore,
    references: ReferenceStore,
    images: Arc<dyn ImageStore>,
    registry: Arc<dyn RegistryClient>,
    _lock: StoreLock,
}

/// Full inspection report for one bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BundleDetails {
    pub id: BundleId,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    pub labels: std::collections::BTreeMap<String, String>,
    pub services: Vec<ServiceDetails>,
}

/// One service from an inspected bundle, with its image resolved against the
/// engine's image backend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDetails {
    pub name: String,
    pub image: String,
    pub image_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    pub labels: std::collections::BTreeMap<String, String>,
}

impl Daemon {
    /// Open (creating if absent) the bundle stores under `root` and take the
    /// store lock. The lock is released when the daemon is dropped.
    pub fn open(
        root: impl Into<std::path::PathBuf>,
        images: Arc<dyn ImageStore>,
        registry: Arc<dyn RegistryClient>,
    ) -> Result<Self, DaemonError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        let lock = StoreLock::acquire(&layout.lock_file())?;
        let bundles = BundleStore::open(layout.clone())?;
        let references = ReferenceStore::open(layout)?;
        info!(bundles = bundles.len(), "bundle store opened");
        Ok(Self {
            bundles,
            references,
            images,
            registry,
            _lock: lock,
        })
    }

    pub fn bundles(&self) -> &BundleStore {
        &self.bundles
    }

    pub fn references(&self) -> &ReferenceStore {
        &self.references
    }

    pub(crate) fn registry(&self) -> &dyn RegistryClient {
        self.registry.as_ref()
    }

    /// Resolve user input to a stored bundle's content ID.
    ///
    /// Precedence: full digest, then exact reference binding, then the tag
    /// text reinterpreted as an ID prefix (only honoured when the resulting
    /// bundle already carries a binding for the same repository name), then
    /// the whole input as an ID prefix. An ambiguous prefix is an error, not
    /// a miss.
    pub fn resolve(&self, ref_or_id: &str) -> Result<BundleId, DaemonError> {
        match parse_ref_or_id(ref_or_id)? {
            RefOrId::Id(id) => match self.bundles.get(&id) {
                Ok(_) => Ok(id),
                Err(StoreError::BundleNotFound(_)) => {
                    Err(DaemonError::RefDoesNotExist(ref_or_id.to_owned()))
                }
                Err(err) => Err(err.into()),
            },
            RefOrId::Ref(reference) => self.resolve_reference(ref_or_id, &reference),
        }
    }

    fn resolve_reference(
        &self,
        input: &str,
        reference: &BundleRef,
    ) -> Result<BundleId, DaemonError> {
        // Binding lookup uses the canonical string, so a bare name is
        // normalized to `name:latest` first.
        let canonical = reference.clone().with_default_tag();
        if let Ok(id) = self.references.get(&canonical) {
            return Ok(id);
        }

        // Legacy shorthand: `name:prefix` where the tag text is really an ID
        // prefix. Only honoured when the matched bundle is already bound
        // under the same repository name, so unrelated repositories cannot
        // capture each other's prefixes.
        if let Some(tag) = reference.tag() {
            if let Ok(id) = self.bundles.search(tag) {
                let same_repo = self
                    .references
                    .references(&id)
                    .iter()
                    .any(|bound| bound.name() == reference.name());
                if same_repo {
                    debug!(input, id = %id.short(), "resolved via tag-as-prefix");
                    return Ok(id);
                }
            }
        }

        match self.bundles.search(input) {
            Ok(id) => Ok(id),
            Err(StoreError::BundleNotFound(_)) => {
                Err(DaemonError::RefDoesNotExist(input.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve and fetch the decoded manifest in one step.
    pub fn get_bundle(&self, ref_or_id: &str) -> Result<(BundleId, Bundle), DaemonError> {
        let id = self.resolve(ref_or_id)?;
        let bundle = self.bundles.get(&id)?;
        Ok((id, bundle))
    }

    /// Bind `repository[:tag]` to the bundle `ref_or_id` resolves to,
    /// displacing any existing binding. Digest-form targets are rejected:
    /// digests are derived, never assigned.
    pub fn tag(
        &self,
        ref_or_id: &str,
        repository: &str,
        tag: Option<&str>,
    ) -> Result<BundleRef, DaemonError> {
        let id = self.resolve(ref_or_id)?;

        let target = BundleRef::parse(repository)?;
        if target.is_canonical() {
            return Err(DaemonError::CannotTagDigest);
        }
        let target = match tag {
            Some(tag) => target.with_tag(tag)?,
            None => target.with_default_tag(),
        };

        self.references.add_tag(&target, &id, true)?;
        info!(reference = %target, id = %id.short(), "bundle tagged");
        Ok(target)
    }

    /// Inspect a bundle: manifest fields, every bound reference, and each
    /// service's image resolved against the image backend.
    pub fn inspect(&self, ref_or_id: &str) -> Result<BundleDetails, DaemonError> {
        let (id, bundle) = self.get_bundle(ref_or_id)?;

        let mut repo_tags = Vec::new();
        let mut repo_digests = Vec::new();
        for reference in self.references.references(&id) {
            if reference.is_canonical() {
                repo_digests.push(reference.to_string());
            } else {
                repo_tags.push(reference.to_string());
            }
        }

        let mut services = Vec::with_capacity(bundle.services.len());
        for spec in &bundle.services {
            let image = self.lookup_image(&spec.image)?;
            services.push(ServiceDetails {
                name: spec.name.clone(),
                image: spec.image.clone(),
                image_id: image.id,
                command: spec.command.clone(),
                args: spec.args.clone(),
                env: spec.env.clone(),
                labels: spec.labels.clone(),
            });
        }

        Ok(BundleDetails {
            id,
            repo_tags,
            repo_digests,
            created: bundle.created,
            engine_version: bundle.engine_version,
            labels: bundle.labels,
            services,
        })
    }

    pub(crate) fn lookup_image(&self, reference: &str) -> Result<ImageSummary, DaemonError> {
        self.images
            .get(reference)
            .ok_or_else(|| DaemonError::ImageNotFound(reference.to_owned()))
    }

    /// Delete a bundle and every reference bound to it. References fall
    /// first so a crash can strand an unreferenced manifest but never a
    /// dangling binding. Returns the deleted ID and the references removed.
    pub fn delete_bundle(
        &self,
        ref_or_id: &str,
    ) -> Result<(BundleId, Vec<BundleRef>), DaemonError> {
        let id = self.resolve(ref_or_id)?;

        let bound = self.references.references(&id);
        for reference in &bound {
            self.references.delete(reference)?;
        }
        self.bundles.delete(&id)?;
        info!(id = %id.short(), untagged = bound.len(), "bundle deleted");
        Ok((id, bound))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use stevedore_remote::{
        CancelToken, ProgressEvent, ProgressSink, RegistryClient, RegistryCredentials,
        RemoteError,
    };
    use stevedore_schema::BundleRef;

    use crate::{Daemon, ImageStore, ImageSummary};

    /// Image backend with a fixed set of known references.
    pub struct MockImages {
        known: HashMap<String, String>,
    }

    impl MockImages {
        pub fn with(references: &[&str]) -> Arc<Self> {
            let known = references
                .iter()
                .map(|r| ((*r).to_owned(), format!("img-{}", r.len())))
                .collect();
            Arc::new(Self { known })
        }
    }

    impl ImageStore for MockImages {
        fn get(&self, reference: &str) -> Option<ImageSummary> {
            self.known.get(reference).map(|id| ImageSummary {
                id: id.clone(),
                reference: reference.to_owned(),
            })
        }
    }

    /// Registry transport that records pushes instead of performing them.
    #[derive(Default)]
    pub struct MockRegistry {
        pub pushed: Mutex<Vec<(String, Vec<u8>)>>,
        pub fail_with: Mutex<Option<RemoteError>>,
    }

    impl RegistryClient for MockRegistry {
        fn push(
            &self,
            _cancel: &CancelToken,
            reference: &BundleRef,
            payload: &[u8],
            sink: &dyn ProgressSink,
            _creds: &RegistryCredentials,
        ) -> Result<(), RemoteError> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            sink.report(ProgressEvent::status(reference.to_string(), "Pushing"));
            self.pushed
                .lock()
                .unwrap()
                .push((reference.to_string(), payload.to_vec()));
            sink.report(ProgressEvent::status(reference.to_string(), "Pushed"));
            Ok(())
        }
    }

    pub fn daemon_in(dir: &std::path::Path, images: &[&str]) -> (Daemon, Arc<MockRegistry>) {
        let registry = Arc::new(MockRegistry::default());
        let daemon = Daemon::open(dir, MockImages::with(images), registry.clone())
            .expect("open daemon");
        (daemon, registry)
    }

    pub const NGINX: &str = "nginx:1.27";
    pub const REDIS: &str = "redis:7";

    pub fn two_service_manifest() -> Vec<u8> {
        format!(
            r#"{{
  "Services": [
    {{"Name": "web", "Image": "{NGINX}", "Env": ["PORT=8080"]}},
    {{"Name": "cache", "Image": "{REDIS}"}}
  ],
  "Labels": {{"env": "prod"}}
}}"#
        )
        .into_bytes()
    }
}
