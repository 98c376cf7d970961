//! Resource envelope and deterministic identity.
//!
//! Every generated object, Kubernetes or Terraform, is wrapped in a
//! [`Resource`] with a deterministic id. Ids are pure functions of the
//! object's identity so repeated generation of the same request yields
//! byte-identical output, which is what makes plan diffs meaningful.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::k8s::EnvVar;

/// Registry host prefixed to Terraform provider sources in extensions.
const TERRAFORM_REGISTRY: &str = "registry.terraform.io";

/// Runtime that owns a generated resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    /// Applied to a Kubernetes cluster.
    Kubernetes,
    /// Applied through Terraform.
    Terraform,
}

/// One generated object plus the metadata the orchestrator needs to apply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Deterministic identity, unique within a spec.
    pub id: String,
    /// Owning runtime.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Full object payload (a Kubernetes manifest or Terraform arguments).
    pub attributes: Value,
    /// Ids of resources that must be applied first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Runtime-specific extras (provider info, GVK).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extensions: serde_json::Map<String, Value>,
}

/// Terraform provider coordinates for a family of resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider source, `namespace/name` (e.g. `hashicorp/aws`).
    pub source: &'static str,
    /// Pinned provider version.
    pub version: &'static str,
}

/// Build the deterministic id of a Kubernetes resource:
/// `{apiVersion}:{kind}:{namespace}:{name}`, with the namespace segment
/// omitted for cluster-scoped objects.
pub fn kubernetes_resource_id(
    api_version: &str,
    kind: &str,
    namespace: &str,
    name: &str,
) -> String {
    if namespace.is_empty() {
        format!("{api_version}:{kind}:{name}")
    } else {
        format!("{api_version}:{kind}:{namespace}:{name}")
    }
}

/// Wrap a typed Kubernetes object into a [`Resource`].
///
/// The id is derived from the object's own `apiVersion`, `kind` and
/// metadata, so the manifest is the single source of identity.
pub fn kubernetes<T: Serialize>(manifest: &T) -> Result<Resource> {
    let attributes = serde_json::to_value(manifest)?;
    let api_version = required_str(&attributes, "apiVersion")?;
    let kind = required_str(&attributes, "kind")?;
    let name = attributes
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation("resource", "kubernetes object has no metadata.name"))?;
    let namespace = attributes
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut extensions = serde_json::Map::new();
    extensions.insert(
        "GVK".to_string(),
        Value::String(format!("{api_version}, Kind={kind}")),
    );

    Ok(Resource {
        id: kubernetes_resource_id(api_version, kind, namespace, name),
        resource_type: ResourceType::Kubernetes,
        attributes,
        depends_on: Vec::new(),
        extensions,
    })
}

/// Build the deterministic id of a Terraform resource:
/// `{providerNamespace}:{providerName}:{resourceType}:{name}`.
pub fn terraform_resource_id(
    provider: &ProviderConfig,
    resource_type: &str,
    name: &str,
) -> Result<String> {
    let mut segments: Vec<&str> = provider.source.split('/').collect();
    // Tolerate a registry-host prefix in the source.
    if segments.len() > 2 {
        segments = segments.split_off(segments.len() - 2);
    }
    if segments.len() != 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(Error::provider(
            "resource",
            format!("malformed terraform provider source `{}`", provider.source),
        ));
    }
    Ok(format!(
        "{}:{}:{resource_type}:{name}",
        segments[0], segments[1]
    ))
}

/// Wrap Terraform arguments into a [`Resource`] with provider extensions.
///
/// `provider_meta` carries per-resource provider arguments (typically the
/// region) and is omitted from extensions when null.
pub fn terraform(
    provider: &ProviderConfig,
    resource_type: &str,
    name: &str,
    attributes: Value,
    provider_meta: Value,
) -> Result<Resource> {
    let id = terraform_resource_id(provider, resource_type, name)?;

    let mut extensions = serde_json::Map::new();
    extensions.insert(
        "provider".to_string(),
        Value::String(format!(
            "{TERRAFORM_REGISTRY}/{}/{}",
            provider.source, provider.version
        )),
    );
    if !provider_meta.is_null() {
        extensions.insert("providerMeta".to_string(), provider_meta);
    }
    extensions.insert(
        "resourceType".to_string(),
        Value::String(resource_type.to_string()),
    );

    Ok(Resource {
        id,
        resource_type: ResourceType::Terraform,
        attributes,
        depends_on: Vec::new(),
        extensions,
    })
}

/// Symbolic reference to a field of another resource, resolved by the
/// orchestrator after that resource has been applied.
pub fn path_dependency(id: &str, field: &str) -> String {
    format!("$trellis_path.{id}.{field}")
}

/// Globally unique application name: `{project}-{stack}-{app}`.
pub fn unique_app_name(project: &str, stack: &str, app: &str) -> String {
    format!("{project}-{stack}-{app}")
}

/// Canonical identifying labels for an application's resources.
pub fn unique_app_labels(project: &str, app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), app.to_string()),
        ("app.kubernetes.io/part-of".to_string(), project.to_string()),
    ])
}

/// Merge `extra` into `base` without overwriting keys already present.
pub fn merge_maps(
    base: &mut BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) {
    for (key, value) in extra {
        base.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Env vars, labels and annotations to merge into the owning workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Env vars appended to every container of the workload.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvVar>,
    /// Labels added to the workload and its pod template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations added to the workload and its pod template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Patch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty() && self.labels.is_empty() && self.annotations.is_empty()
    }
}

fn required_str<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::validation("resource", format!("kubernetes object has no {key}"))
        })
}
