//! Local backends wired into the daemon when running as a standalone CLI:
//! an image catalog standing in for an engine's image store, and a
//! file-backed orchestrator that records created services.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use stevedore_cluster::{BundleResolver, ClusterError, CreateServiceRequest, OrchestratorClient};
use stevedore_daemon::{Daemon, ImageStore, ImageSummary};
use stevedore_schema::{Bundle, ServiceId};

const IMAGE_CATALOG_FILE: &str = "images.json";
const SERVICES_FILE: &str = "services.json";

/// Image backend fed by an optional `images.json` catalog in the store root,
/// mapping image references to their IDs.
///
/// Without a catalog file every reference is accepted as-is: a standalone
/// CLI has no engine to validate against, and refusing all ingestion would
/// make the tool useless. With a catalog, validation is strict.
pub struct CatalogImages {
    catalog: Option<BTreeMap<String, String>>,
}

impl CatalogImages {
    pub fn load(store_root: &Path) -> Result<Self, String> {
        let path = store_root.join(IMAGE_CATALOG_FILE);
        if !path.exists() {
            debug!("no image catalog; accepting all image references");
            return Ok(Self { catalog: None });
        }
        let data = std::fs::read(&path)
            .map_err(|e| format!("failed to read image catalog {}: {e}", path.display()))?;
        let catalog = serde_json::from_slice(&data)
            .map_err(|e| format!("failed to parse image catalog {}: {e}", path.display()))?;
        Ok(Self {
            catalog: Some(catalog),
        })
    }
}

impl ImageStore for CatalogImages {
    fn get(&self, reference: &str) -> Option<ImageSummary> {
        match &self.catalog {
            Some(catalog) => catalog.get(reference).map(|id| ImageSummary {
                id: id.clone(),
                reference: reference.to_owned(),
            }),
            None => Some(ImageSummary {
                id: reference.to_owned(),
                reference: reference.to_owned(),
            }),
        }
    }
}

/// One service created by [`LocalOrchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Orchestrator that records created services in `services.json` under the
/// store root. Stands in for a cluster scheduler on a single node.
pub struct LocalOrchestrator {
    path: PathBuf,
    records: Mutex<Vec<ServiceRecord>>,
}

impl LocalOrchestrator {
    pub fn open(store_root: &Path) -> Result<Self, String> {
        let path = store_root.join(SERVICES_FILE);
        let records = if path.exists() {
            let data = std::fs::read(&path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            serde_json::from_slice(&data)
                .map_err(|e| format!("failed to parse {}: {e}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }
}

impl OrchestratorClient for LocalOrchestrator {
    fn create_service(&self, request: CreateServiceRequest) -> Result<ServiceId, ClusterError> {
        let mut records = self.records.lock().expect("service records poisoned");

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let id = ServiceId::new(format!("{nanos:x}-{}", records.len()));

        records.push(ServiceRecord {
            id: id.clone(),
            name: request.name.clone(),
            image: request.image.clone(),
            labels: request.container_labels.clone(),
        });

        let data = serde_json::to_vec_pretty(&*records).map_err(|e| {
            ClusterError::ServiceCreate {
                name: request.name.clone(),
                reason: e.to_string(),
            }
        })?;
        std::fs::write(&self.path, data).map_err(|e| ClusterError::ServiceCreate {
            name: request.name,
            reason: e.to_string(),
        })?;
        Ok(id)
    }
}

/// Resolves bundle references for the stack deployer through the daemon.
pub struct DaemonResolver {
    daemon: Arc<Daemon>,
}

impl DaemonResolver {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self { daemon }
    }
}

impl BundleResolver for DaemonResolver {
    fn resolve_bundle(&self, reference: &str) -> Result<Bundle, ClusterError> {
        self.daemon
            .get_bundle(reference)
            .map(|(_, bundle)| bundle)
            .map_err(|e| ClusterError::Resolve {
                reference: reference.to_owned(),
                reason: e.to_string(),
            })
    }
}
