//! Developer-facing workload config types.
//!
//! These are the shapes developers write in application config. Probe and
//! lifecycle actions are tagged unions keyed on `_type`; an unknown tag is
//! a decode error, not a silently empty action.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Env entries in declaration order.
///
/// Serde maps would reorder keys; env declaration order is meaningful
/// (later vars may reference earlier ones through the runtime), so the
/// entries are kept as a vector while still reading and writing as a
/// JSON/YAML map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap(pub Vec<(String, String)>);

impl EnvMap {
    /// True when no env entries are declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for EnvMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvMapVisitor;

        impl<'de> Visitor<'de> for EnvMapVisitor {
            type Value = EnvMap;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of env var names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<EnvMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    entries.push((key, value));
                }
                Ok(EnvMap(entries))
            }
        }

        deserializer.deserialize_map(EnvMapVisitor)
    }
}

impl JsonSchema for EnvMap {
    fn schema_name() -> String {
        "EnvMap".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            ..Default::default()
        };
        schema.object().additional_properties = Some(Box::new(gen.subschema_for::<String>()));
        schemars::schema::Schema::Object(schema)
    }
}

/// A file projected into a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    /// Inline file content; mutually exclusive with `contentFrom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Secret reference (`secret://name/key`) supplying the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_from: Option<String>,
    /// Octal permission string, e.g. `"0644"`.
    pub mode: String,
}

/// Probe or hook action, discriminated by `_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "_type")]
pub enum ProbeAction {
    /// HTTP GET against a URL.
    Http {
        /// Full URL including scheme, host, port and path.
        url: String,
        /// Request headers.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// Command executed inside the container.
    Exec {
        /// Command line.
        command: Vec<String>,
    },
    /// TCP connect against `host:port`.
    Tcp {
        /// Target, `tcp://host:port` or `host:port`.
        url: String,
    },
}

/// Container health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// What the probe does.
    pub probe_handler: ProbeAction,
    /// Seconds before the first probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<i32>,
    /// Probe timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    /// Seconds between probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<i32>,
    /// Consecutive successes to count as healthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<i32>,
    /// Consecutive failures to count as unhealthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i32>,
}

/// Lifecycle hook action, discriminated by `_type`. TCP is not a valid
/// hook action, so this is a narrower union than [`ProbeAction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "_type")]
pub enum HookAction {
    /// HTTP GET against a URL.
    Http {
        /// Full URL including scheme, host, port and path.
        url: String,
        /// Request headers.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// Command executed inside the container.
    Exec {
        /// Command line.
        command: Vec<String>,
    },
}

/// Container lifecycle hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    /// Run right before the container stops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_stop: Option<HookAction>,
    /// Run right after the container starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_start: Option<HookAction>,
}

/// One container of the workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Image reference.
    pub image: String,
    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Entrypoint arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Env vars; values may be `secret://` references.
    #[serde(default, skip_serializing_if = "EnvMap::is_empty")]
    pub env: EnvMap,
    /// Working directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Resource quantities keyed by resource name, `<min>-<max>` or `<max>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, String>,
    /// Files projected into the container, keyed by path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, FileSpec>,
    /// Secret-backed directories, mount path to secret name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dirs: BTreeMap<String, String>,
    /// Liveness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    /// Readiness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    /// Startup probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,
    /// Lifecycle hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
}

/// Topology spread constraint as written in config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopologySpreadConstraint {
    /// Allowed skew between topology domains.
    pub max_skew: i32,
    /// Node label defining the topology domain.
    pub topology_key: String,
    /// `DoNotSchedule` or `ScheduleAnyway`.
    pub when_unsatisfiable: String,
}

/// Fields shared by service and job workloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Base {
    /// Containers, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, Container>,
    /// Desired replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Extra workload labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Extra workload annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Spread constraints, keyed by an arbitrary config name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub topology_spread_constraints: BTreeMap<String, TopologySpreadConstraint>,
}

/// Port exposed by a service workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Exposed port.
    #[serde(default = "default_port")]
    pub port: i32,
    /// Container port; defaults to `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,
    /// `TCP` or `UDP`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_port() -> i32 {
    80
}

fn default_protocol() -> String {
    "TCP".to_string()
}

impl Default for Port {
    fn default() -> Self {
        Self {
            port: default_port(),
            target_port: None,
            protocol: default_protocol(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_map_preserves_declaration_order() {
        let json = r#"{"ZED": "1", "ALPHA": "2", "MIKE": "3"}"#;
        let env: EnvMap = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ZED", "ALPHA", "MIKE"]);
    }

    #[test]
    fn env_map_round_trips() {
        let env = EnvMap(vec![
            ("B".to_string(), "2".to_string()),
            ("A".to_string(), "1".to_string()),
        ]);
        let encoded = serde_json::to_string(&env).unwrap();
        assert_eq!(encoded, r#"{"B":"2","A":"1"}"#);
        let decoded: EnvMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn probe_actions_decode_by_tag() {
        let http: Probe = serde_json::from_value(serde_json::json!({
            "probeHandler": {"_type": "Http", "url": "http://localhost:8080/healthz"},
            "initialDelaySeconds": 5
        }))
        .unwrap();
        assert!(matches!(http.probe_handler, ProbeAction::Http { .. }));

        let tcp: Probe = serde_json::from_value(serde_json::json!({
            "probeHandler": {"_type": "Tcp", "url": "tcp://localhost:9090"}
        }))
        .unwrap();
        assert!(matches!(tcp.probe_handler, ProbeAction::Tcp { .. }));
    }

    #[test]
    fn unknown_probe_tag_is_a_decode_error() {
        let result: Result<Probe, _> = serde_json::from_value(serde_json::json!({
            "probeHandler": {"_type": "Grpc", "url": "localhost:50051"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn lifecycle_rejects_tcp_actions() {
        let result: Result<Lifecycle, _> = serde_json::from_value(serde_json::json!({
            "preStop": {"_type": "Tcp", "url": "tcp://localhost:9090"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn port_defaults_fill_in() {
        let port: Port = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(port.port, 80);
        assert_eq!(port.protocol, "TCP");
        assert_eq!(port.target_port, None);
    }
}
