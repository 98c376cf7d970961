//! Network exposure for workload ports.
//!
//! Declared ports are partitioned by visibility and aggregated into at most
//! two Services: one ClusterIP service for private ports and one
//! LoadBalancer service for public ports. Public exposure needs the
//! platform to name a load-balancer provider.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::config;
use crate::error::{Error, Result};
use crate::k8s;
use crate::modules::service::validate_ports;
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{self, merge_maps};
use crate::workload::spec::Port;

const MODULE: &str = "network";

/// Suffix of the aggregated Service for private ports.
const PRIVATE_SUFFIX: &str = "-private";
/// Suffix of the aggregated Service for public ports.
const PUBLIC_SUFFIX: &str = "-public";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkPort {
    #[serde(flatten)]
    port: Port,
    /// Expose outside the cluster through a load balancer.
    #[serde(default)]
    public: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkConfig {
    #[serde(default)]
    ports: Vec<NetworkPort>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkPlatformConfig {
    port: Option<PortPlatformConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortPlatformConfig {
    /// Load-balancer provider: `aws` or `alicloud`.
    #[serde(rename = "type")]
    provider: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// Generator for aggregated port Services.
pub struct NetworkModule;

impl crate::modules::Module for NetworkModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        let Some(dev) = request.dev_config.as_ref() else {
            return Ok(None);
        };
        let mut network: NetworkConfig = config::decode_tier(MODULE, "dev", dev)?;
        if network.ports.is_empty() {
            return Ok(None);
        }
        let platform: NetworkPlatformConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();

        for entry in &mut network.ports {
            if entry.port.target_port.is_none() {
                entry.port.target_port = Some(entry.port.port);
            }
        }
        let plain: Vec<Port> = network.ports.iter().map(|p| p.port.clone()).collect();
        validate_ports(MODULE, &plain)?;

        let (public, private): (Vec<NetworkPort>, Vec<NetworkPort>) =
            network.ports.into_iter().partition(|p| p.public);

        let port_platform = if public.is_empty() {
            PortPlatformConfig::default()
        } else {
            let config = platform.port.ok_or_else(|| {
                Error::validation(
                    MODULE,
                    "public ports need a load-balancer provider in platform config",
                )
            })?;
            match config.provider.as_deref() {
                Some("aws") | Some("alicloud") => config,
                Some(other) => {
                    return Err(Error::validation_for_field(
                        MODULE,
                        "port.type",
                        format!("unsupported load-balancer provider `{other}`"),
                    ))
                }
                None => {
                    return Err(Error::validation_for_field(
                        MODULE,
                        "port.type",
                        "load-balancer provider is required for public ports",
                    ))
                }
            }
        };

        debug!(
            app = %request.app,
            public = public.len(),
            private = private.len(),
            "aggregating port services"
        );

        let mut resources = Vec::new();
        if !private.is_empty() {
            let svc = self.build_service(request, &private, false, &PortPlatformConfig::default());
            resources.push(resource::kubernetes(&svc)?);
        }
        if !public.is_empty() {
            let svc = self.build_service(request, &public, true, &port_platform);
            resources.push(resource::kubernetes(&svc)?);
        }

        Ok(Some(GeneratorResponse::with_resources(resources)))
    }
}

impl NetworkModule {
    fn build_service(
        &self,
        request: &GeneratorRequest,
        ports: &[NetworkPort],
        public: bool,
        platform: &PortPlatformConfig,
    ) -> k8s::Service {
        let suffix = if public { PUBLIC_SUFFIX } else { PRIVATE_SUFFIX };
        let name = format!("{}{suffix}", request.unique_app_name());

        let mut labels = request.unique_app_labels();
        let mut annotations = BTreeMap::new();
        if let Some(workload) = request.workload.as_ref() {
            merge_maps(&mut labels, &workload.labels);
            merge_maps(&mut annotations, &workload.annotations);
        }
        merge_maps(&mut labels, &platform.labels);
        merge_maps(&mut annotations, &platform.annotations);

        let mut svc = k8s::Service::new(&name, &request.project);
        svc.metadata.labels = labels;
        svc.metadata.annotations = annotations;
        svc.spec.service_type = Some(if public { "LoadBalancer" } else { "ClusterIP" }.to_string());
        svc.spec.selector = request.unique_app_labels();
        svc.spec.ports = ports
            .iter()
            .map(|entry| k8s::ServicePort {
                name: Some(format!(
                    "{name}-{}-{}",
                    entry.port.port,
                    entry.port.protocol.to_lowercase()
                )),
                port: entry.port.port,
                target_port: entry.port.target_port,
                protocol: Some(entry.port.protocol.clone()),
            })
            .collect();
        svc
    }
}
