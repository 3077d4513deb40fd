//! Expansion of a bundle into orchestrator services.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use stevedore_schema::{Bundle, ServiceId, ServiceSpec};

use crate::names::random_stack_name;
use crate::{BundleResolver, ClusterError, NodeRole, OrchestratorClient};

/// Service spec as submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateServiceRequest {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<String>,
    /// Labels on the service object; carries the bundle's labels.
    pub service_labels: BTreeMap<String, String>,
    /// Labels on each container; carries the declaring service's labels.
    pub container_labels: BTreeMap<String, String>,
    pub mode: ServiceMode,
}

/// Scheduling mode for a created service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Replicated { replicas: u64 },
}

impl Default for ServiceMode {
    fn default() -> Self {
        Self::Replicated { replicas: 1 }
    }
}

/// Outcome of a stack deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDeployment {
    pub name: String,
    pub service_ids: Vec<ServiceId>,
}

/// Cluster-side handle for deploying stacks.
pub struct Cluster {
    role: RwLock<NodeRole>,
    resolver: Arc<dyn BundleResolver>,
    orchestrator: Arc<dyn OrchestratorClient>,
}

impl Cluster {
    pub fn new(
        role: NodeRole,
        resolver: Arc<dyn BundleResolver>,
        orchestrator: Arc<dyn OrchestratorClient>,
    ) -> Self {
        Self {
            role: RwLock::new(role),
            resolver,
            orchestrator,
        }
    }

    /// Record a role change, e.g. after a cluster join or demotion.
    pub fn set_role(&self, role: NodeRole) {
        *self.role.write().expect("role lock poisoned") = role;
    }

    pub fn role(&self) -> NodeRole {
        *self.role.read().expect("role lock poisoned")
    }

    /// Deploy a bundle as a stack, one orchestrator service per declared
    /// service. Without `stack_name` a random one is generated.
    ///
    /// Submissions are sequential and happen outside the role lock, so a
    /// long deployment never blocks role changes. A mid-deployment failure
    /// returns immediately: services already created stay running and the
    /// error names the one that failed.
    pub fn deploy(
        &self,
        stack_name: Option<&str>,
        bundle_ref: &str,
    ) -> Result<StackDeployment, ClusterError> {
        // Role check and spec expansion under the read lock; the lock is
        // released before any service is submitted.
        let (name, requests) = {
            let role = self.role.read().expect("role lock poisoned");
            if *role != NodeRole::Manager {
                return Err(ClusterError::NoManager);
            }
            // Only a manager gets to learn whether the reference was even
            // well-formed.
            if bundle_ref.is_empty() {
                return Err(ClusterError::EmptyReference);
            }

            let bundle = self.resolver.resolve_bundle(bundle_ref)?;
            let name = match stack_name {
                Some(name) => name.to_owned(),
                None => random_stack_name(),
            };
            let requests: Vec<_> = bundle
                .services
                .iter()
                .map(|spec| service_request(&name, &bundle, spec))
                .collect();
            (name, requests)
        };

        info!(stack = %name, services = requests.len(), bundle = bundle_ref, "deploying stack");

        let mut service_ids = Vec::with_capacity(requests.len());
        for request in requests {
            let service = request.name.clone();
            match self.orchestrator.create_service(request) {
                Ok(id) => service_ids.push(id),
                Err(err) => {
                    warn!(stack = %name, service = %service, deployed = service_ids.len(),
                        "stack deployment aborted; earlier services are left running");
                    return Err(err);
                }
            }
        }

        Ok(StackDeployment { name, service_ids })
    }
}

fn service_request(stack: &str, bundle: &Bundle, spec: &ServiceSpec) -> CreateServiceRequest {
    CreateServiceRequest {
        name: format!("{stack}-{}", spec.name),
        image: spec.image.clone(),
        command: spec.command.clone(),
        args: spec.args.clone(),
        env: spec.env.clone(),
        service_labels: bundle.labels.clone(),
        container_labels: spec.labels.clone(),
        mode: ServiceMode::default(),
    }
}
