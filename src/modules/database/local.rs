//! Locally deployed database instances.
//!
//! Local mode runs the engine's official image inside the cluster: a
//! password Secret, a single-replica Deployment, a PVC for the data
//! directory and a headless Service the workload connects through.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::k8s;
use crate::request::GeneratorRequest;
use crate::resource::{self, Patch, Resource};

use super::{DbEngine, DbSettings};

const SECRET_SUFFIX: &str = "-db-local-secret";
const DEPLOYMENT_SUFFIX: &str = "-db-local-deployment";
const PVC_SUFFIX: &str = "-db-local-pvc";
const SERVICE_SUFFIX: &str = "-db-local-service";

/// Kubernetes port names cap at 15 characters.
const MAX_PORT_NAME: usize = 15;

pub(super) fn generate(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
) -> Result<(Vec<Resource>, Patch)> {
    let password = local_password(request, settings);

    let mut resources = vec![
        resource::kubernetes(&password_secret(request, settings, &password))?,
        resource::kubernetes(&deployment(engine, request, settings))?,
        resource::kubernetes(&pvc(request, settings))?,
    ];

    let (service, host) = service(engine, request, settings);
    resources.push(resource::kubernetes(&service)?);

    let (db_secret, patch) =
        super::db_secret_and_patch(engine, request, settings, &host, &settings.username, &password)?;
    resources.push(db_secret);

    Ok((resources, patch))
}

/// Deterministic password derived from the request identity, so repeated
/// generation never rotates the local credentials.
fn local_password(request: &GeneratorRequest, settings: &DbSettings) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.project.as_bytes());
    hasher.update(request.stack.as_bytes());
    hasher.update(request.app.as_bytes());
    hasher.update(settings.database_name.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

fn match_labels(settings: &DbSettings) -> BTreeMap<String, String> {
    BTreeMap::from([("accessory".to_string(), settings.database_name.clone())])
}

fn password_secret(
    request: &GeneratorRequest,
    settings: &DbSettings,
    password: &str,
) -> k8s::Secret {
    let name = format!("{}{SECRET_SUFFIX}", settings.database_name);
    let mut secret = k8s::Secret::new(name, &request.project);
    secret
        .string_data
        .insert("password".to_string(), password.to_string());
    secret
}

fn deployment(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
) -> k8s::Deployment {
    let secret_name = format!("{}{SECRET_SUFFIX}", settings.database_name);
    let mut port_name = settings.database_name.clone();
    port_name.truncate(MAX_PORT_NAME);

    let container = k8s::Container {
        name: settings.database_name.clone(),
        image: format!("{}:{}", engine.name, settings.version),
        env: engine.local_env(settings, &secret_name),
        ports: vec![k8s::ContainerPort {
            name: Some(port_name),
            container_port: engine.port,
        }],
        volume_mounts: vec![k8s::VolumeMount {
            name: settings.database_name.clone(),
            mount_path: engine.data_dir.to_string(),
            sub_path: None,
        }],
        ..Default::default()
    };

    let mut deployment = k8s::Deployment::new(
        format!("{}{DEPLOYMENT_SUFFIX}", settings.database_name),
        &request.project,
    );
    deployment.spec = k8s::DeploymentSpec {
        replicas: None,
        selector: k8s::LabelSelector::matching(match_labels(settings)),
        template: k8s::PodTemplateSpec {
            metadata: k8s::TemplateMeta {
                labels: match_labels(settings),
                ..Default::default()
            },
            spec: k8s::PodSpec {
                containers: vec![container],
                volumes: vec![k8s::Volume {
                    name: settings.database_name.clone(),
                    persistent_volume_claim: Some(k8s::PersistentVolumeClaimVolumeSource {
                        claim_name: format!("{}{PVC_SUFFIX}", settings.database_name),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
        },
    };
    deployment
}

fn pvc(request: &GeneratorRequest, settings: &DbSettings) -> k8s::PersistentVolumeClaim {
    let mut pvc = k8s::PersistentVolumeClaim::new(
        format!("{}{PVC_SUFFIX}", settings.database_name),
        &request.project,
    );
    pvc.metadata.labels = match_labels(settings);
    pvc.spec = k8s::PersistentVolumeClaimSpec {
        access_modes: vec!["ReadWriteOnce".to_string()],
        resources: k8s::VolumeResourceRequirements {
            requests: BTreeMap::from([("storage".to_string(), format!("{}Gi", settings.size))]),
        },
    };
    pvc
}

/// Headless service; its name doubles as the in-cluster host address.
fn service(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
) -> (k8s::Service, String) {
    let name = format!("{}{SERVICE_SUFFIX}", settings.database_name);
    let mut svc = k8s::Service::new(&name, &request.project);
    svc.metadata.labels = match_labels(settings);
    svc.spec.cluster_ip = Some("None".to_string());
    svc.spec.selector = match_labels(settings);
    svc.spec.ports = vec![k8s::ServicePort {
        name: None,
        port: engine.port,
        target_port: None,
        protocol: None,
    }];
    (svc, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GeneratorRequest {
        GeneratorRequest {
            project: "store".into(),
            stack: "dev".into(),
            app: "checkout".into(),
            ..Default::default()
        }
    }

    fn settings(name: &str) -> DbSettings {
        DbSettings {
            db_type: "local".into(),
            version: "8.0".into(),
            instance_type: String::new(),
            size: 20,
            category: "Basic".into(),
            username: "root".into(),
            security_ips: vec!["0.0.0.0/0".into()],
            subnet_id: String::new(),
            private_routing: true,
            database_name: name.into(),
            region: None,
            volume_type: String::new(),
            vpc: String::new(),
        }
    }

    #[test]
    fn password_is_deterministic_and_short() {
        let a = local_password(&request(), &settings("store-dev-checkout-mysql"));
        let b = local_password(&request(), &settings("store-dev-checkout-mysql"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        let c = local_password(&request(), &settings("other-db"));
        assert_ne!(a, c);
    }

    #[test]
    fn long_database_names_truncate_the_port_name() {
        let engine = DbEngine::mysql();
        let settings = settings("a-very-long-database-name-indeed-mysql");
        let deployment = deployment(&engine, &request(), &settings);
        let port = &deployment.spec.template.spec.containers[0].ports[0];
        assert_eq!(port.name.as_deref(), Some("a-very-long-dat"));
        assert_eq!(port.container_port, 3306);
    }

    #[test]
    fn root_user_gets_the_root_password_env() {
        let engine = DbEngine::mysql();
        let settings = settings("db-mysql");
        let deployment = deployment(&engine, &request(), &settings);
        let env = &deployment.spec.template.spec.containers[0].env;
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "MYSQL_ROOT_PASSWORD");
    }

    #[test]
    fn non_root_user_gets_user_and_password_envs() {
        let engine = DbEngine::mysql();
        let mut settings = settings("db-mysql");
        settings.username = "app".into();
        let deployment = deployment(&engine, &request(), &settings);
        let names: Vec<&str> = deployment.spec.template.spec.containers[0]
            .env
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["MYSQL_USER", "MYSQL_PASSWORD"]);
    }

    #[test]
    fn service_is_headless_and_named_like_the_host() {
        let (svc, host) = service(&DbEngine::mysql(), &request(), &settings("db-mysql"));
        assert_eq!(host, "db-mysql-db-local-service");
        assert_eq!(svc.spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(svc.spec.ports[0].port, 3306);
        assert_eq!(svc.spec.selector["accessory"], "db-mysql");
    }

    #[test]
    fn pvc_requests_the_configured_size() {
        let pvc = pvc(&request(), &settings("db-mysql"));
        assert_eq!(pvc.spec.resources.requests["storage"], "20Gi");
        assert_eq!(pvc.spec.access_modes, vec!["ReadWriteOnce".to_string()]);
    }
}
