//! Prometheus scrape wiring.
//!
//! Two modes, chosen by the platform. With a Prometheus operator in the
//! cluster, the module emits a ServiceMonitor or PodMonitor plus an
//! identifying label patch the monitor selects on. Without one, it patches
//! the classic `prometheus.io/*` scrape annotations onto the workload.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config;
use crate::error::{Error, Result};
use crate::k8s;
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{self, Patch};

const MODULE: &str = "monitoring";

/// Label the monitor objects select on. Prometheus label names only allow
/// alphanumerics and underscore, and the value has to be something only
/// this generator stamps, hence the prefixed snake_case name.
const APP_LABEL: &str = "trellis_monitoring_appname";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitoringConfig {
    #[serde(default)]
    path: String,
    #[serde(default)]
    port: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitoringPlatformConfig {
    #[serde(default)]
    operator_mode: bool,
    #[serde(default = "default_monitor_type")]
    monitor_type: String,
    #[serde(default = "default_interval")]
    interval: String,
    #[serde(default = "default_timeout")]
    timeout: String,
    #[serde(default = "default_scheme")]
    scheme: String,
}

impl Default for MonitoringPlatformConfig {
    fn default() -> Self {
        Self {
            operator_mode: false,
            monitor_type: default_monitor_type(),
            interval: default_interval(),
            timeout: default_timeout(),
            scheme: default_scheme(),
        }
    }
}

fn default_monitor_type() -> String {
    "Service".to_string()
}

fn default_interval() -> String {
    "30s".to_string()
}

fn default_timeout() -> String {
    "15s".to_string()
}

fn default_scheme() -> String {
    "http".to_string()
}

/// Generator for Prometheus scrape config.
pub struct MonitoringModule;

impl crate::modules::Module for MonitoringModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        if request.dev_config.is_none() && request.platform_config.is_none() {
            return Ok(None);
        }

        let dev: MonitoringConfig =
            config::decode_tier_opt(MODULE, "dev", request.dev_config.as_ref())?.unwrap_or_default();
        let platform: MonitoringPlatformConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();

        let interval = parse_duration(&platform.interval)
            .ok_or_else(|| Error::validation_for_field(MODULE, "interval", "invalid duration"))?;
        let timeout = parse_duration(&platform.timeout)
            .ok_or_else(|| Error::validation_for_field(MODULE, "timeout", "invalid duration"))?;
        if timeout > interval {
            return Err(Error::validation(
                MODULE,
                format!(
                    "timeout {} must not exceed interval {}",
                    platform.timeout, platform.interval
                ),
            ));
        }

        if !platform.operator_mode {
            info!(app = %request.app, "patching scrape annotations");
            let patch = Patch {
                annotations: BTreeMap::from([
                    ("prometheus.io/scrape".to_string(), "true".to_string()),
                    ("prometheus.io/path".to_string(), dev.path),
                    ("prometheus.io/port".to_string(), dev.port),
                    ("prometheus.io/scheme".to_string(), platform.scheme),
                ]),
                ..Default::default()
            };
            return Ok(Some(GeneratorResponse {
                resources: Vec::new(),
                patch: Some(patch),
            }));
        }

        debug!(app = %request.app, monitor_type = %platform.monitor_type, "creating monitor object");

        let labels = BTreeMap::from([(APP_LABEL.to_string(), request.app.clone())]);
        let endpoint = k8s::MonitorEndpoint {
            port: dev.port,
            path: dev.path,
            scheme: platform.scheme,
            interval: platform.interval,
            scrape_timeout: platform.timeout,
        };

        let resource = match platform.monitor_type.as_str() {
            "Service" => {
                let mut monitor = k8s::ServiceMonitor::new(
                    format!("{}-service-monitor", request.unique_app_name()),
                    &request.project,
                );
                monitor.spec = k8s::ServiceMonitorSpec {
                    selector: k8s::LabelSelector::matching(labels.clone()),
                    endpoints: vec![endpoint],
                };
                resource::kubernetes(&monitor)?
            }
            "Pod" => {
                let mut monitor = k8s::PodMonitor::new(
                    format!("{}-pod-monitor", request.unique_app_name()),
                    &request.project,
                );
                monitor.spec = k8s::PodMonitorSpec {
                    selector: k8s::LabelSelector::matching(labels.clone()),
                    pod_metrics_endpoints: vec![endpoint],
                };
                resource::kubernetes(&monitor)?
            }
            other => {
                return Err(Error::validation_for_field(
                    MODULE,
                    "monitorType",
                    format!("`{other}` must be Service or Pod"),
                ))
            }
        };

        Ok(Some(GeneratorResponse {
            resources: vec![resource],
            patch: Some(Patch {
                labels,
                ..Default::default()
            }),
        }))
    }
}

/// Parse durations of the Go `time.ParseDuration` family actually used in
/// scrape configs: one decimal number with an `ms`, `s`, `m` or `h` unit.
fn parse_duration(value: &str) -> Option<Duration> {
    let (number, unit) = value.split_at(value.find(|c: char| c.is_ascii_alphabetic())?);
    let number: f64 = number.parse().ok()?;
    if number < 0.0 {
        return None;
    }
    let millis = match unit {
        "ms" => number,
        "s" => number * 1_000.0,
        "m" => number * 60_000.0,
        "h" => number * 3_600_000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis as u64))
}
