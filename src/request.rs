//! Generator request and response envelopes.
//!
//! A module generator receives one [`GeneratorRequest`] per application and
//! returns resources plus an optional workload patch. Config arrives in two
//! tiers: the developer tier (from the application config) and the platform
//! tier (from the workspace). Both are loosely typed maps; each module decodes
//! them into its own typed config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::{self, Patch, Resource};

/// A loosely typed config tier, as delivered by the orchestrator.
pub type GenericConfig = serde_json::Map<String, serde_json::Value>;

/// Everything a module generator needs to produce resources for one
/// application in one stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorRequest {
    /// Project the application belongs to; doubles as the Kubernetes
    /// namespace for generated objects.
    pub project: String,
    /// Stack within the project (e.g. `dev`, `prod`).
    pub stack: String,
    /// Application name.
    pub app: String,
    /// Descriptor of the workload the application runs as, when one exists.
    /// Accessory modules use it to decide applicability and to pick up
    /// selector labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadDescriptor>,
    /// Developer-tier config for the module, absent when the application
    /// config does not mention the module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_config: Option<GenericConfig>,
    /// Platform-tier config for the module, absent when the workspace does
    /// not configure it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_config: Option<GenericConfig>,
}

impl GeneratorRequest {
    /// Globally unique application name: `{project}-{stack}-{app}`.
    pub fn unique_app_name(&self) -> String {
        resource::unique_app_name(&self.project, &self.stack, &self.app)
    }

    /// Canonical identifying labels for resources owned by this application.
    pub fn unique_app_labels(&self) -> BTreeMap<String, String> {
        resource::unique_app_labels(&self.project, &self.app)
    }
}

/// What a module generator hands back: zero or more resources and an
/// optional patch the orchestrator merges into the owning workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorResponse {
    /// Generated resources, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    /// Env vars, labels and annotations for the owning workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

impl GeneratorResponse {
    /// Response carrying only resources.
    pub fn with_resources(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            patch: None,
        }
    }
}

/// Coarse shape of the application's workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadProfile {
    /// Long-running service.
    Service,
    /// Run-to-completion job.
    Job,
}

/// Concrete kind a service workload renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Standard `apps/v1` Deployment.
    Deployment,
    /// KusionStack CollaSet, for in-place update semantics.
    CollaSet,
}

/// Summary of the workload that accessory modules patch or select against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDescriptor {
    /// Whether the workload is a service or a job.
    pub profile: WorkloadProfile,
    /// Concrete service kind; only meaningful for the service profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_kind: Option<ServiceKind>,
    /// Labels declared on the workload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations declared on the workload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadDescriptor {
    /// Descriptor for a service workload of the given kind.
    pub fn service(kind: ServiceKind) -> Self {
        Self {
            profile: WorkloadProfile::Service,
            service_kind: Some(kind),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Descriptor for a job workload.
    pub fn job() -> Self {
        Self {
            profile: WorkloadProfile::Job,
            service_kind: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}
