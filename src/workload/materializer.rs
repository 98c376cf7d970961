//! Compilation of container config into pod-level Kubernetes objects.
//!
//! The materializer turns the loosely ordered container map into a
//! deterministic list of typed containers plus the volumes and ConfigMaps
//! they need. Containers are emitted in lexicographic name order; generated
//! config object names are `{owner}-{container}-{index}` with the index
//! counting files per container in path order.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::k8s;
use crate::secretref::{parse_secret_reference, EnvParserChain};
use crate::workload::spec;

/// Output of materializing one container map.
#[derive(Debug, Default)]
pub struct Materialized {
    /// Typed containers, in lexicographic name order.
    pub containers: Vec<k8s::Container>,
    /// Pod volumes backing files and dirs, deduplicated by name.
    pub volumes: Vec<k8s::Volume>,
    /// ConfigMaps generated for inline file content.
    pub config_maps: Vec<k8s::ConfigMap>,
}

/// Compiles developer container config into Kubernetes containers.
pub struct ContainerMaterializer {
    module: &'static str,
    env_chain: EnvParserChain,
}

impl ContainerMaterializer {
    /// Materializer with the standard env parser chain. `module` names the
    /// calling module in errors.
    pub fn new(module: &'static str) -> Self {
        Self {
            module,
            env_chain: EnvParserChain::standard(),
        }
    }

    /// Override the env parser chain.
    pub fn with_env_chain(mut self, env_chain: EnvParserChain) -> Self {
        self.env_chain = env_chain;
        self
    }

    /// Materialize every container of `owner`, in lexicographic name order.
    pub fn materialize(
        &self,
        owner: &str,
        namespace: &str,
        containers: &BTreeMap<String, spec::Container>,
    ) -> Result<Materialized> {
        let mut out = Materialized::default();
        let mut volume_names = BTreeSet::new();

        for (name, container) in containers {
            let compiled =
                self.materialize_one(owner, namespace, name, container, &mut out, &mut volume_names)?;
            out.containers.push(compiled);
        }

        Ok(out)
    }

    fn materialize_one(
        &self,
        owner: &str,
        namespace: &str,
        name: &str,
        container: &spec::Container,
        out: &mut Materialized,
        volume_names: &mut BTreeSet<String>,
    ) -> Result<k8s::Container> {
        let mut compiled = k8s::Container {
            name: name.to_string(),
            image: container.image.clone(),
            command: container.command.clone(),
            args: container.args.clone(),
            working_dir: container.working_dir.clone(),
            ..Default::default()
        };

        for (key, value) in container.env.iter() {
            compiled.env.push(self.env_chain.resolve(key, value)?);
        }

        compiled.resources = self.parse_resources(&container.resources)?;

        self.handle_files(owner, namespace, name, container, &mut compiled, out, volume_names)?;
        self.handle_dirs(container, &mut compiled, out, volume_names)?;

        compiled.liveness_probe = container
            .liveness_probe
            .as_ref()
            .map(|p| self.convert_probe(p))
            .transpose()?;
        compiled.readiness_probe = container
            .readiness_probe
            .as_ref()
            .map(|p| self.convert_probe(p))
            .transpose()?;
        compiled.startup_probe = container
            .startup_probe
            .as_ref()
            .map(|p| self.convert_probe(p))
            .transpose()?;
        compiled.lifecycle = container
            .lifecycle
            .as_ref()
            .map(|l| self.convert_lifecycle(l))
            .transpose()?;

        Ok(compiled)
    }

    // ======================================================================
    // Files and dirs
    // ======================================================================

    fn handle_files(
        &self,
        owner: &str,
        namespace: &str,
        container_name: &str,
        container: &spec::Container,
        compiled: &mut k8s::Container,
        out: &mut Materialized,
        volume_names: &mut BTreeSet<String>,
    ) -> Result<()> {
        for (index, (path, file)) in container.files.iter().enumerate() {
            let base = file_base(path);
            if base == "." || base == "/" {
                return Err(Error::validation_for_field(
                    self.module,
                    "files",
                    format!("`{path}` is not a valid file path"),
                ));
            }

            let mode = self.parse_file_mode(path, &file.mode)?;
            let mount_path = absolute(path);

            match (&file.content, &file.content_from) {
                (Some(_), Some(_)) => {
                    return Err(Error::validation_for_field(
                        self.module,
                        "files",
                        format!("`{path}` sets both content and contentFrom"),
                    ));
                }
                (None, Some(reference)) => {
                    let secret = parse_secret_reference(reference)?.ok_or_else(|| {
                        Error::validation_for_field(
                            self.module,
                            "files",
                            format!("contentFrom of `{path}` must be a secret:// reference"),
                        )
                    })?;
                    if volume_names.insert(secret.name.clone()) {
                        out.volumes.push(k8s::Volume {
                            name: secret.name.clone(),
                            secret: Some(k8s::SecretVolumeSource {
                                secret_name: secret.name.clone(),
                                default_mode: Some(mode),
                            }),
                            ..Default::default()
                        });
                    }
                    // Secret-backed files mount at the exact path via subPath
                    // so sibling files in the directory stay visible.
                    compiled.volume_mounts.push(k8s::VolumeMount {
                        name: secret.name,
                        mount_path,
                        sub_path: Some(secret.key),
                    });
                }
                (Some(content), None) => {
                    let generated = format!("{owner}-{container_name}-{index}");
                    let mut cm = k8s::ConfigMap::new(&generated, namespace);
                    cm.data.insert(base, content.clone());
                    out.config_maps.push(cm);

                    if volume_names.insert(generated.clone()) {
                        out.volumes.push(k8s::Volume {
                            name: generated.clone(),
                            config_map: Some(k8s::ConfigMapVolumeSource {
                                name: generated.clone(),
                                default_mode: Some(mode),
                            }),
                            ..Default::default()
                        });
                    }
                    // ConfigMap-backed files mount at the parent directory;
                    // the key projects the file under it.
                    compiled.volume_mounts.push(k8s::VolumeMount {
                        name: generated,
                        mount_path: parent_dir(&mount_path),
                        sub_path: None,
                    });
                }
                (None, None) => {
                    return Err(Error::validation_for_field(
                        self.module,
                        "files",
                        format!("`{path}` sets neither content nor contentFrom"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn handle_dirs(
        &self,
        container: &spec::Container,
        compiled: &mut k8s::Container,
        out: &mut Materialized,
        volume_names: &mut BTreeSet<String>,
    ) -> Result<()> {
        for (path, value) in &container.dirs {
            // Dir values are secret:// references; the whole secret mounts
            // at the path, so only the name half is used.
            let secret = parse_secret_reference(value)
                .ok()
                .flatten()
                .ok_or_else(|| {
                    Error::validation_for_field(
                        self.module,
                        "dirs",
                        format!("`{value}` for `{path}` must be a secret:// reference"),
                    )
                })?;
            if volume_names.insert(secret.name.clone()) {
                out.volumes.push(k8s::Volume {
                    name: secret.name.clone(),
                    secret: Some(k8s::SecretVolumeSource {
                        secret_name: secret.name.clone(),
                        default_mode: None,
                    }),
                    ..Default::default()
                });
            }
            compiled.volume_mounts.push(k8s::VolumeMount {
                name: secret.name,
                mount_path: absolute(path),
                sub_path: None,
            });
        }
        Ok(())
    }

    fn parse_file_mode(&self, path: &str, mode: &str) -> Result<i32> {
        let parsed = if let Some(hex) = mode.strip_prefix("0x").or_else(|| mode.strip_prefix("0X")) {
            i32::from_str_radix(hex, 16)
        } else if mode.len() > 1 && mode.starts_with('0') {
            i32::from_str_radix(&mode[1..], 8)
        } else {
            mode.parse::<i32>()
        };
        parsed.map_err(|_| {
            Error::validation_for_field(
                self.module,
                "files",
                format!("invalid mode `{mode}` for `{path}`"),
            )
        })
    }

    // ======================================================================
    // Resources
    // ======================================================================

    fn parse_resources(
        &self,
        resources: &BTreeMap<String, String>,
    ) -> Result<k8s::ResourceRequirements> {
        let mut requirements = k8s::ResourceRequirements::default();
        for (resource, quantity) in resources {
            match quantity.split_once('-') {
                Some((request, limit)) => {
                    self.validate_quantity(resource, request)?;
                    self.validate_quantity(resource, limit)?;
                    requirements
                        .requests
                        .insert(resource.clone(), request.to_string());
                    requirements.limits.insert(resource.clone(), limit.to_string());
                }
                None => {
                    self.validate_quantity(resource, quantity)?;
                    requirements
                        .limits
                        .insert(resource.clone(), quantity.to_string());
                }
            }
        }
        Ok(requirements)
    }

    fn validate_quantity(&self, resource: &str, quantity: &str) -> Result<()> {
        const SUFFIXES: &[&str] = &[
            "", "m", "k", "M", "G", "T", "P", "Ki", "Mi", "Gi", "Ti", "Pi",
        ];
        let split = quantity
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(quantity.len());
        let (number, suffix) = quantity.split_at(split);
        if number.is_empty() || number.parse::<f64>().is_err() || !SUFFIXES.contains(&suffix) {
            return Err(Error::validation_for_field(
                self.module,
                "resources",
                format!("invalid quantity `{quantity}` for `{resource}`"),
            ));
        }
        Ok(())
    }

    // ======================================================================
    // Probes and lifecycle
    // ======================================================================

    fn convert_probe(&self, probe: &spec::Probe) -> Result<k8s::Probe> {
        let mut converted = k8s::Probe {
            initial_delay_seconds: probe.initial_delay_seconds,
            timeout_seconds: probe.timeout_seconds,
            period_seconds: probe.period_seconds,
            success_threshold: probe.success_threshold,
            failure_threshold: probe.failure_threshold,
            ..Default::default()
        };
        match &probe.probe_handler {
            spec::ProbeAction::Http { url, headers } => {
                converted.http_get = Some(self.http_get_action(url, headers)?);
            }
            spec::ProbeAction::Exec { command } => {
                converted.exec = Some(k8s::ExecAction {
                    command: command.clone(),
                });
            }
            spec::ProbeAction::Tcp { url } => {
                converted.tcp_socket = Some(self.tcp_socket_action(url)?);
            }
        }
        Ok(converted)
    }

    fn convert_lifecycle(&self, lifecycle: &spec::Lifecycle) -> Result<k8s::Lifecycle> {
        let convert = |action: &spec::HookAction| -> Result<k8s::LifecycleHandler> {
            Ok(match action {
                spec::HookAction::Http { url, headers } => k8s::LifecycleHandler {
                    http_get: Some(self.http_get_action(url, headers)?),
                    exec: None,
                },
                spec::HookAction::Exec { command } => k8s::LifecycleHandler {
                    http_get: None,
                    exec: Some(k8s::ExecAction {
                        command: command.clone(),
                    }),
                },
            })
        };
        Ok(k8s::Lifecycle {
            post_start: lifecycle.post_start.as_ref().map(convert).transpose()?,
            pre_stop: lifecycle.pre_stop.as_ref().map(convert).transpose()?,
        })
    }

    fn http_get_action(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<k8s::HttpGetAction> {
        let parsed = parse_url(self.module, url)?;
        let scheme = match parsed.scheme.as_str() {
            "http" => "HTTP",
            "https" => "HTTPS",
            other => {
                return Err(Error::validation_for_field(
                    self.module,
                    "probe",
                    format!("unsupported scheme `{other}` in `{url}`"),
                ))
            }
        };
        let port = match parsed.port {
            Some(port) => port,
            None if scheme == "HTTPS" => 443,
            None => 80,
        };
        // The pod IP is the implied host; an explicit localhost is the
        // same thing and is dropped.
        let host = match parsed.host.as_str() {
            "localhost" | "127.0.0.1" => None,
            other => Some(other.to_string()),
        };
        Ok(k8s::HttpGetAction {
            path: (!parsed.path.is_empty()).then(|| parsed.path.clone()),
            port,
            host,
            scheme: Some(scheme.to_string()),
            http_headers: headers
                .iter()
                .map(|(name, value)| k8s::HttpHeader {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        })
    }

    fn tcp_socket_action(&self, url: &str) -> Result<k8s::TcpSocketAction> {
        let rest = url.strip_prefix("tcp://").unwrap_or(url);
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            Error::validation_for_field(
                self.module,
                "probe",
                format!("tcp probe target `{url}` must be host:port"),
            )
        })?;
        let port: i32 = port.parse().map_err(|_| {
            Error::validation_for_field(
                self.module,
                "probe",
                format!("invalid port in tcp probe target `{url}`"),
            )
        })?;
        Ok(k8s::TcpSocketAction {
            port,
            host: (!host.is_empty()).then(|| host.to_string()),
        })
    }
}

struct ParsedUrl {
    scheme: String,
    host: String,
    port: Option<i32>,
    path: String,
}

fn parse_url(module: &str, url: &str) -> Result<ParsedUrl> {
    let (scheme, rest) = url.split_once("://").ok_or_else(|| {
        Error::validation_for_field(module, "probe", format!("`{url}` has no scheme"))
    })?;
    let (host_port, path) = match rest.find('/') {
        Some(at) => (&rest[..at], rest[at..].to_string()),
        None => (rest, String::new()),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port: i32 = port.parse().map_err(|_| {
                Error::validation_for_field(module, "probe", format!("invalid port in `{url}`"))
            })?;
            (host, Some(port))
        }
        None => (host_port, None),
    };
    if host.is_empty() {
        return Err(Error::validation_for_field(
            module,
            "probe",
            format!("`{url}` has no host"),
        ));
    }
    Ok(ParsedUrl {
        scheme: scheme.to_string(),
        host: host.to_string(),
        port,
        path,
    })
}

/// Last path component, with Go's `filepath.Base` edge behavior: an empty
/// path yields `.` and a root path yields `/`.
fn file_base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn absolute(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(at) => path[..at].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::spec::{Container, EnvMap, FileSpec, Probe, ProbeAction};

    fn materializer() -> ContainerMaterializer {
        ContainerMaterializer::new("service")
    }

    fn container(image: &str) -> Container {
        Container {
            image: image.to_string(),
            ..Default::default()
        }
    }

    /// Story: insertion order of the config map never leaks into the
    /// output; containers always come out sorted by name.
    #[test]
    fn story_containers_emit_in_lexicographic_order() {
        let mut containers = BTreeMap::new();
        containers.insert("zeta".to_string(), container("z:1"));
        containers.insert("alpha".to_string(), container("a:1"));
        containers.insert("mid".to_string(), container("m:1"));

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let names: Vec<&str> = out.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn env_declaration_order_is_preserved() {
        let mut spec = container("a:1");
        spec.env = EnvMap(vec![
            ("ZED".to_string(), "1".to_string()),
            ("ALPHA".to_string(), "secret://creds/key".to_string()),
        ]);
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let env = &out.containers[0].env;
        assert_eq!(env[0].name, "ZED");
        assert_eq!(env[1].name, "ALPHA");
        assert!(env[1].value_from.is_some());
    }

    /// Story: an inline file becomes a generated ConfigMap mounted at the
    /// parent directory, so siblings written by the image survive.
    #[test]
    fn story_inline_file_projects_via_config_map() {
        let mut spec = container("a:1");
        spec.files.insert(
            "/etc/app/config.yaml".to_string(),
            FileSpec {
                content: Some("key: value".to_string()),
                content_from: None,
                mode: "0644".to_string(),
            },
        );
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        assert_eq!(out.config_maps.len(), 1);
        let cm = &out.config_maps[0];
        assert_eq!(cm.metadata.name, "api-main-0");
        assert_eq!(cm.data["config.yaml"], "key: value");

        let mount = &out.containers[0].volume_mounts[0];
        assert_eq!(mount.mount_path, "/etc/app");
        assert_eq!(mount.sub_path, None);

        let volume = &out.volumes[0];
        assert_eq!(volume.name, "api-main-0");
        assert_eq!(volume.config_map.as_ref().unwrap().default_mode, Some(0o644));
    }

    /// Story: a secret-backed file mounts at the exact path through
    /// subPath so only that one file is shadowed.
    #[test]
    fn story_secret_file_mounts_at_exact_path() {
        let mut spec = container("a:1");
        spec.files.insert(
            "/etc/app/token".to_string(),
            FileSpec {
                content: None,
                content_from: Some("secret://api-creds/token".to_string()),
                mode: "0600".to_string(),
            },
        );
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        assert!(out.config_maps.is_empty());

        let mount = &out.containers[0].volume_mounts[0];
        assert_eq!(mount.name, "api-creds");
        assert_eq!(mount.mount_path, "/etc/app/token");
        assert_eq!(mount.sub_path.as_deref(), Some("token"));

        let volume = &out.volumes[0];
        assert_eq!(volume.secret.as_ref().unwrap().secret_name, "api-creds");
        assert_eq!(volume.secret.as_ref().unwrap().default_mode, Some(0o600));
    }

    #[test]
    fn generated_names_count_files_per_container() {
        let mut spec = container("a:1");
        for path in ["/etc/a.conf", "/etc/b.conf"] {
            spec.files.insert(
                path.to_string(),
                FileSpec {
                    content: Some("x".to_string()),
                    content_from: None,
                    mode: "0644".to_string(),
                },
            );
        }
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let names: Vec<&str> = out.config_maps.iter().map(|cm| cm.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["api-main-0", "api-main-1"]);
    }

    #[test]
    fn root_and_dot_paths_are_rejected() {
        for bad in ["/", "", "/etc/"] {
            let mut spec = container("a:1");
            spec.files.insert(
                bad.to_string(),
                FileSpec {
                    content: Some("x".to_string()),
                    content_from: None,
                    mode: "0644".to_string(),
                },
            );
            let containers = BTreeMap::from([("main".to_string(), spec)]);
            let result = materializer().materialize("api", "store", &containers);
            if bad == "/etc/" {
                // Trailing slash resolves to a real base name.
                assert!(result.is_ok());
            } else {
                assert!(result.is_err(), "path `{bad}` should be rejected");
            }
        }
    }

    #[test]
    fn file_needs_exactly_one_content_source() {
        let both = FileSpec {
            content: Some("x".to_string()),
            content_from: Some("secret://a/b".to_string()),
            mode: "0644".to_string(),
        };
        let neither = FileSpec {
            content: None,
            content_from: None,
            mode: "0644".to_string(),
        };
        for file in [both, neither] {
            let mut spec = container("a:1");
            spec.files.insert("/etc/app.conf".to_string(), file);
            let containers = BTreeMap::from([("main".to_string(), spec)]);
            assert!(materializer().materialize("api", "store", &containers).is_err());
        }
    }

    #[test]
    fn dirs_mount_whole_secrets() {
        let mut spec = container("a:1");
        spec.dirs
            .insert("/etc/certs".to_string(), "secret://tls-certs/cert".to_string());
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let mount = &out.containers[0].volume_mounts[0];
        assert_eq!(mount.name, "tls-certs");
        assert_eq!(mount.mount_path, "/etc/certs");
        assert_eq!(mount.sub_path, None);
        assert_eq!(out.volumes[0].secret.as_ref().unwrap().secret_name, "tls-certs");
    }

    #[test]
    fn dirs_reject_values_that_are_not_secret_references() {
        for bad in ["tls-certs", "secret://only-name", "configmap://x/y"] {
            let mut spec = container("a:1");
            spec.dirs.insert("/etc/certs".to_string(), bad.to_string());
            let containers = BTreeMap::from([("main".to_string(), spec)]);
            let err = materializer()
                .materialize("api", "store", &containers)
                .unwrap_err();
            assert!(
                err.to_string().contains("secret:// reference"),
                "dir value `{bad}` should be rejected, got: {err}"
            );
        }
    }

    #[test]
    fn resource_ranges_split_into_request_and_limit() {
        let mut spec = container("a:1");
        spec.resources.insert("cpu".to_string(), "250m-500m".to_string());
        spec.resources.insert("memory".to_string(), "1Gi".to_string());
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let resources = &out.containers[0].resources;
        assert_eq!(resources.requests["cpu"], "250m");
        assert_eq!(resources.limits["cpu"], "500m");
        assert!(resources.requests.get("memory").is_none());
        assert_eq!(resources.limits["memory"], "1Gi");
    }

    #[test]
    fn malformed_quantities_are_rejected() {
        for bad in ["fast", "1-2-3", "", "1Qi"] {
            let mut spec = container("a:1");
            spec.resources.insert("cpu".to_string(), bad.to_string());
            let containers = BTreeMap::from([("main".to_string(), spec)]);
            assert!(
                materializer().materialize("api", "store", &containers).is_err(),
                "quantity `{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn http_probe_drops_localhost_host() {
        let mut spec = container("a:1");
        spec.liveness_probe = Some(Probe {
            probe_handler: ProbeAction::Http {
                url: "http://localhost:8080/healthz".to_string(),
                headers: BTreeMap::from([("X-Check".to_string(), "1".to_string())]),
            },
            initial_delay_seconds: Some(3),
            timeout_seconds: None,
            period_seconds: None,
            success_threshold: None,
            failure_threshold: None,
        });
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let probe = out.containers[0].liveness_probe.as_ref().unwrap();
        let http = probe.http_get.as_ref().unwrap();
        assert_eq!(http.host, None);
        assert_eq!(http.port, 8080);
        assert_eq!(http.path.as_deref(), Some("/healthz"));
        assert_eq!(http.scheme.as_deref(), Some("HTTP"));
        assert_eq!(http.http_headers[0].name, "X-Check");
        assert_eq!(probe.initial_delay_seconds, Some(3));
    }

    #[test]
    fn http_probe_keeps_external_host() {
        let mut spec = container("a:1");
        spec.readiness_probe = Some(Probe {
            probe_handler: ProbeAction::Http {
                url: "https://checks.internal/ready".to_string(),
                headers: BTreeMap::new(),
            },
            initial_delay_seconds: None,
            timeout_seconds: None,
            period_seconds: None,
            success_threshold: None,
            failure_threshold: None,
        });
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let http = out.containers[0]
            .readiness_probe
            .as_ref()
            .unwrap()
            .http_get
            .as_ref()
            .unwrap();
        assert_eq!(http.host.as_deref(), Some("checks.internal"));
        assert_eq!(http.port, 443);
        assert_eq!(http.scheme.as_deref(), Some("HTTPS"));
    }

    #[test]
    fn tcp_probe_parses_host_and_port() {
        let mut spec = container("a:1");
        spec.startup_probe = Some(Probe {
            probe_handler: ProbeAction::Tcp {
                url: "tcp://localhost:9090".to_string(),
            },
            initial_delay_seconds: None,
            timeout_seconds: None,
            period_seconds: None,
            success_threshold: None,
            failure_threshold: None,
        });
        let containers = BTreeMap::from([("main".to_string(), spec)]);

        let out = materializer().materialize("api", "store", &containers).unwrap();
        let tcp = out.containers[0]
            .startup_probe
            .as_ref()
            .unwrap()
            .tcp_socket
            .as_ref()
            .unwrap();
        assert_eq!(tcp.port, 9090);
        assert_eq!(tcp.host.as_deref(), Some("localhost"));
    }

    #[test]
    fn file_mode_accepts_octal_strings() {
        let m = materializer();
        assert_eq!(m.parse_file_mode("/f", "0644").unwrap(), 0o644);
        assert_eq!(m.parse_file_mode("/f", "0600").unwrap(), 0o600);
        assert_eq!(m.parse_file_mode("/f", "420").unwrap(), 420);
        assert!(m.parse_file_mode("/f", "rw-r--r--").is_err());
    }
}
