//! Long-running service workloads.
//!
//! Renders the application's containers into either an `apps/v1` Deployment
//! or a KusionStack CollaSet, together with the ConfigMaps generated for
//! inline file content. Service exposure itself is the network module's
//! job; this module only validates and completes the declared ports.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::debug;

use crate::config;
use crate::error::{Error, Result};
use crate::k8s;
use crate::request::{GeneratorRequest, GeneratorResponse, ServiceKind};
use crate::resource::{self, merge_maps};
use crate::workload::spec::{Base, Port};
use crate::workload::ContainerMaterializer;

const MODULE: &str = "service";

/// Developer-tier service config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceConfig {
    #[serde(flatten)]
    base: Base,
    /// `Deployment` or `CollaSet`.
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    ports: Vec<Port>,
}

/// Platform-tier service config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePlatformConfig {
    #[serde(rename = "type")]
    kind: Option<String>,
    replicas: Option<i32>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// Generator for service workloads.
pub struct ServiceModule;

impl crate::modules::Module for ServiceModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        let Some(dev) = request.dev_config.as_ref() else {
            return Ok(None);
        };
        let mut service: ServiceConfig = config::decode_tier(MODULE, "dev", dev)?;
        let platform: ServicePlatformConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();

        complete(&mut service, &platform);
        let kind = parse_kind(service.kind.as_deref())?;
        validate_ports(MODULE, &service.ports)?;

        debug!(app = %request.app, kind = ?kind, "rendering service workload");

        // Generated config objects carry the unique app name so two stacks
        // sharing the project namespace cannot collide.
        let materialized = ContainerMaterializer::new(MODULE).materialize(
            &request.unique_app_name(),
            &request.project,
            &service.base.containers,
        )?;

        let mut resources = Vec::new();
        for cm in &materialized.config_maps {
            resources.push(resource::kubernetes(cm)?);
        }

        let selector = request.unique_app_labels();
        let mut labels = selector.clone();
        merge_maps(&mut labels, &service.base.labels);

        let mut workload = match kind {
            ServiceKind::Deployment => {
                k8s::Deployment::new(request.unique_app_name(), &request.project)
            }
            ServiceKind::CollaSet => {
                k8s::Deployment::colla_set(request.unique_app_name(), &request.project)
            }
        };
        workload.metadata.labels = labels.clone();
        workload.metadata.annotations = service.base.annotations.clone();
        workload.spec = k8s::DeploymentSpec {
            replicas: service.base.replicas,
            selector: k8s::LabelSelector::matching(selector.clone()),
            template: k8s::PodTemplateSpec {
                metadata: k8s::TemplateMeta {
                    labels,
                    annotations: service.base.annotations.clone(),
                },
                spec: k8s::PodSpec {
                    containers: materialized.containers,
                    volumes: materialized.volumes,
                    restart_policy: None,
                    topology_spread_constraints: spread_constraints(&service.base, &selector),
                },
            },
        };
        resources.push(resource::kubernetes(&workload)?);

        Ok(Some(GeneratorResponse::with_resources(resources)))
    }
}

fn complete(service: &mut ServiceConfig, platform: &ServicePlatformConfig) {
    if service.kind.is_none() {
        service.kind = platform.kind.clone();
    }
    if service.base.replicas.is_none() {
        service.base.replicas = platform.replicas;
    }
    merge_maps(&mut service.base.labels, &platform.labels);
    merge_maps(&mut service.base.annotations, &platform.annotations);
    for port in &mut service.ports {
        if port.target_port.is_none() {
            port.target_port = Some(port.port);
        }
    }
}

fn parse_kind(kind: Option<&str>) -> Result<ServiceKind> {
    match kind {
        None | Some("Deployment") => Ok(ServiceKind::Deployment),
        Some("CollaSet") => Ok(ServiceKind::CollaSet),
        Some(other) => Err(Error::validation_for_field(
            MODULE,
            "type",
            format!("unsupported service type `{other}`, expected Deployment or CollaSet"),
        )),
    }
}

/// Shared by the service and network modules: port numbers in range,
/// protocol TCP or UDP, no duplicate port-protocol pair.
pub(crate) fn validate_ports(module: &'static str, ports: &[Port]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (index, port) in ports.iter().enumerate() {
        let field = format!("ports[{index}]");
        if !(1..=65535).contains(&port.port) {
            return Err(Error::validation_for_field(
                module,
                &field,
                format!("port {} must be between 1 and 65535", port.port),
            ));
        }
        if let Some(target) = port.target_port {
            if !(1..=65535).contains(&target) {
                return Err(Error::validation_for_field(
                    module,
                    &field,
                    format!("targetPort {target} must be between 1 and 65535"),
                ));
            }
        }
        if port.protocol != "TCP" && port.protocol != "UDP" {
            return Err(Error::validation_for_field(
                module,
                &field,
                format!("protocol `{}` must be TCP or UDP", port.protocol),
            ));
        }
        if !seen.insert((port.port, port.protocol.clone())) {
            return Err(Error::validation_for_field(
                module,
                &field,
                format!("duplicate port {}/{}", port.port, port.protocol),
            ));
        }
    }
    Ok(())
}

fn spread_constraints(
    base: &Base,
    selector: &BTreeMap<String, String>,
) -> Vec<k8s::TopologySpreadConstraint> {
    base.topology_spread_constraints
        .values()
        .map(|constraint| k8s::TopologySpreadConstraint {
            max_skew: constraint.max_skew,
            topology_key: constraint.topology_key.clone(),
            when_unsatisfiable: constraint.when_unsatisfiable.clone(),
            label_selector: Some(k8s::LabelSelector::matching(selector.clone())),
        })
        .collect()
}
