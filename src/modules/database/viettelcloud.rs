//! ViettelCloud DBaaS managed database instances.
//!
//! Cloud mode on ViettelCloud declares two Terraform resources: a random
//! password and the `viettelcloud_db_instance`. The service has one
//! region fallback more than the other providers: when neither the
//! platform tier nor the env var names one, instances land in the
//! default `vn-central-1`.

use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::request::GeneratorRequest;
use crate::resource::{self, Patch, ProviderConfig, Resource};

use super::{DbEngine, DbSettings};

const VIETTELCLOUD_PROVIDER: ProviderConfig = ProviderConfig {
    source: "hashicorp/viettelcloud",
    version: "1.0.0-dev",
};

const VIETTELCLOUD_REGION_ENV: &str = "VIETTEL_CLOUD_REGION";
const DEFAULT_REGION: &str = "vn-central-1";
const DB_INSTANCE_TYPE: &str = "viettelcloud_db_instance";

pub(super) fn generate(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
) -> Result<(Vec<Resource>, Patch)> {
    let region = resolve_region(settings);
    debug!(module = engine.name, %region, "generating viettelcloud dbaas resources");

    let (password_res, password_id) = super::random_password(engine, settings)?;
    let (instance_res, instance_id) = db_instance(engine, settings, &region, &password_id)?;

    let host = resource::path_dependency(&instance_id, "private_url");
    let password = resource::path_dependency(&password_id, "result");
    let (db_secret, patch) =
        super::db_secret_and_patch(engine, request, settings, &host, &settings.username, &password)?;

    Ok((vec![password_res, instance_res, db_secret], patch))
}

fn resolve_region(settings: &DbSettings) -> String {
    if let Some(region) = settings.region.as_ref().filter(|r| !r.is_empty()) {
        return region.clone();
    }
    match std::env::var(VIETTELCLOUD_REGION_ENV) {
        Ok(region) if !region.is_empty() => region,
        _ => DEFAULT_REGION.to_string(),
    }
}

fn db_instance(
    engine: &DbEngine,
    settings: &DbSettings,
    region: &str,
    password_id: &str,
) -> Result<(Resource, String)> {
    let attributes = json!({
        "database_type": engine.name,
        "region": region,
        "name": settings.database_name,
        "db_version": settings.version,
        "flavor": settings.instance_type,
        "volume_type": settings.volume_type,
        "disk_size": settings.size,
        "vpc_name": settings.vpc,
        "subnet": settings.subnet_id,
        "solution": settings.category,
        "root_password": resource::path_dependency(password_id, "result"),
        "enable_auto_backup": false,
    });

    let resource = resource::terraform(
        &VIETTELCLOUD_PROVIDER,
        DB_INSTANCE_TYPE,
        &settings.database_name,
        attributes,
        json!({}),
    )?;
    let id = resource.id.clone();
    Ok((resource, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DbSettings {
        DbSettings {
            db_type: "cloud".into(),
            version: "8.0".into(),
            instance_type: "DBAAS_1vCPU_1_RAM".into(),
            size: 20,
            category: "Basic".into(),
            username: "admin".into(),
            security_ips: vec!["10.0.0.0/8".into()],
            subnet_id: "subnet-1".into(),
            private_routing: true,
            database_name: "store-dev-checkout-mysql".into(),
            region: Some("test-region".into()),
            volume_type: "ssd".into(),
            vpc: "vpc-new".into(),
        }
    }

    #[test]
    fn instance_carries_the_dbaas_attributes() {
        let (instance, id) = db_instance(
            &DbEngine::mysql(),
            &settings(),
            "test-region",
            "hashicorp:random:random_password:db",
        )
        .unwrap();
        assert_eq!(
            id,
            "hashicorp:viettelcloud:viettelcloud_db_instance:store-dev-checkout-mysql"
        );
        assert_eq!(instance.attributes["database_type"], "mysql");
        assert_eq!(instance.attributes["flavor"], "DBAAS_1vCPU_1_RAM");
        assert_eq!(instance.attributes["volume_type"], "ssd");
        assert_eq!(instance.attributes["vpc_name"], "vpc-new");
        assert_eq!(instance.attributes["solution"], "Basic");
        assert_eq!(instance.attributes["enable_auto_backup"], false);
        assert_eq!(
            instance.attributes["root_password"],
            "$trellis_path.hashicorp:random:random_password:db.result"
        );
    }

    #[test]
    fn missing_region_falls_back_to_the_service_default() {
        let mut settings = settings();
        settings.region = None;
        // Only the platform field is consulted here; the env var fallback
        // is not exercised to keep the test hermetic.
        if std::env::var(VIETTELCLOUD_REGION_ENV).is_err() {
            assert_eq!(resolve_region(&settings), DEFAULT_REGION);
        }
        settings.region = Some("vn-north-1".into());
        assert_eq!(resolve_region(&settings), "vn-north-1");
    }

    #[test]
    fn host_is_the_private_url_output() {
        let request = GeneratorRequest {
            project: "store".into(),
            stack: "dev".into(),
            app: "checkout".into(),
            ..Default::default()
        };
        let (resources, patch) = generate(&DbEngine::mysql(), &request, &settings()).unwrap();
        assert_eq!(resources.len(), 3);
        let secret = &resources[2];
        let host = secret.attributes["stringData"]["hostAddress"].as_str().unwrap();
        assert!(host.contains("viettelcloud_db_instance"));
        assert!(host.ends_with(".private_url"));
        assert_eq!(patch.environments.len(), 3);
    }
}
