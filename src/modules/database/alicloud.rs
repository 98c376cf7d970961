//! AliCloud RDS managed database instances.
//!
//! Declares an `alicloud_db_instance` plus an `alicloud_rds_account`
//! bound to the shared random password. A public connection endpoint is
//! declared only when the security ranges actually admit public traffic,
//! and the workload is pointed at it only when private routing is
//! switched off.

use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::netutil::is_public_accessible;
use crate::request::GeneratorRequest;
use crate::resource::{self, Patch, ProviderConfig, Resource};

use super::{DbEngine, DbSettings};

const ALICLOUD_PROVIDER: ProviderConfig = ProviderConfig {
    source: "aliyun/alicloud",
    version: "1.209.1",
};

const ALICLOUD_REGION_ENV: &str = "ALICLOUD_REGION";
const DB_INSTANCE_TYPE: &str = "alicloud_db_instance";
const DB_CONNECTION_TYPE: &str = "alicloud_db_connection";
const RDS_ACCOUNT_TYPE: &str = "alicloud_rds_account";

pub(super) fn generate(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
) -> Result<(Vec<Resource>, Patch)> {
    let region = super::resolve_region(engine, settings, ALICLOUD_REGION_ENV)?;
    debug!(module = engine.name, %region, "generating alicloud rds resources");

    let (password_res, password_id) = super::random_password(engine, settings)?;
    let (instance_res, instance_id) = db_instance(engine, settings, &region)?;

    let mut resources = vec![password_res, instance_res];

    let mut connection_id = None;
    if is_public_accessible(&settings.security_ips) {
        let (connection_res, id) = db_connection(settings, &region, &instance_id)?;
        resources.push(connection_res);
        connection_id = Some(id);
    }

    resources.push(rds_account(settings, &region, &password_id, &instance_id)?);

    // Private routing uses the instance's in-VPC endpoint; otherwise the
    // public connection endpoint, which must exist by then.
    let host = match (&connection_id, settings.private_routing) {
        (Some(id), false) => resource::path_dependency(id, "connection_string"),
        _ => resource::path_dependency(&instance_id, "connection_string"),
    };
    let password = resource::path_dependency(&password_id, "result");
    let (db_secret, patch) =
        super::db_secret_and_patch(engine, request, settings, &host, &settings.username, &password)?;
    resources.push(db_secret);

    Ok((resources, patch))
}

fn db_instance(
    engine: &DbEngine,
    settings: &DbSettings,
    region: &str,
) -> Result<(Resource, String)> {
    let mut attributes = json!({
        "category": settings.category,
        "engine": engine.alicloud_engine,
        "engine_version": settings.version,
        "instance_storage": settings.size,
        "instance_type": settings.instance_type,
        "security_ips": settings.security_ips,
        "vswitch_id": settings.subnet_id,
        "instance_name": settings.database_name,
    });

    if settings.category.contains("serverless") {
        attributes["db_instance_storage_type"] = json!("cloud_essd");
        attributes["instance_charge_type"] = json!("Serverless");
        attributes["serverless_config"] = json!([{
            "auto_pause": false,
            "switch_force": false,
            "max_capacity": 8,
            "min_capacity": 1,
        }]);
    }

    let resource = resource::terraform(
        &ALICLOUD_PROVIDER,
        DB_INSTANCE_TYPE,
        &settings.database_name,
        attributes,
        json!({ "region": region }),
    )?;
    let id = resource.id.clone();
    Ok((resource, id))
}

fn db_connection(
    settings: &DbSettings,
    region: &str,
    instance_id: &str,
) -> Result<(Resource, String)> {
    let resource = resource::terraform(
        &ALICLOUD_PROVIDER,
        DB_CONNECTION_TYPE,
        &settings.database_name,
        json!({ "instance_id": resource::path_dependency(instance_id, "id") }),
        json!({ "region": region }),
    )?;
    let id = resource.id.clone();
    Ok((resource, id))
}

fn rds_account(
    settings: &DbSettings,
    region: &str,
    password_id: &str,
    instance_id: &str,
) -> Result<Resource> {
    resource::terraform(
        &ALICLOUD_PROVIDER,
        RDS_ACCOUNT_TYPE,
        &settings.database_name,
        json!({
            "account_name": settings.username,
            "account_password": resource::path_dependency(password_id, "result"),
            "account_type": "Super",
            "db_instance_id": resource::path_dependency(instance_id, "id"),
        }),
        json!({ "region": region }),
    )
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

    fn settings() -> DbSettings {
        DbSettings {
            db_type: "cloud".into(),
            version: "8.0".into(),
            instance_type: "mysql.n2.serverless.1c".into(),
            size: 20,
            category: "serverless_basic".into(),
            username: "admin".into(),
            security_ips: vec!["10.0.0.0/8".into()],
            subnet_id: "vsw-123".into(),
            private_routing: true,
            database_name: "store-dev-checkout-mysql".into(),
            region: Some("cn-beijing".into()),
            volume_type: String::new(),
            vpc: String::new(),
        }
    }

    #[test]
    fn serverless_category_adds_serverless_attributes() {
        let (instance, id) = db_instance(&DbEngine::mysql(), &settings(), "cn-beijing").unwrap();
        assert_eq!(
            id,
            "aliyun:alicloud:alicloud_db_instance:store-dev-checkout-mysql"
        );
        assert_eq!(instance.attributes["instance_charge_type"], "Serverless");
        assert_eq!(instance.attributes["serverless_config"][0]["max_capacity"], 8);
        assert_eq!(instance.attributes["engine"], "MySQL");
    }

    #[test]
    fn standard_category_omits_serverless_attributes() {
        let mut settings = settings();
        settings.category = "HighAvailability".into();
        let (instance, _) = db_instance(&DbEngine::mysql(), &settings, "cn-beijing").unwrap();
        assert!(instance.attributes.get("instance_charge_type").is_none());
        assert!(instance.attributes.get("serverless_config").is_none());
    }

    #[test]
    fn private_ranges_skip_the_public_connection() {
        let (resources, _) = generate(&DbEngine::mysql(), &request(), &settings()).unwrap();
        // random_password, db_instance, rds_account, credentials secret.
        assert_eq!(resources.len(), 4);
        assert!(resources
            .iter()
            .all(|r| !r.id.contains("alicloud_db_connection")));
    }

    #[test]
    fn public_ranges_add_a_connection_endpoint() {
        let mut settings = settings();
        settings.security_ips = vec!["0.0.0.0/0".into()];
        let (resources, _) = generate(&DbEngine::mysql(), &request(), &settings).unwrap();
        assert_eq!(resources.len(), 5);
        assert!(resources
            .iter()
            .any(|r| r.id.contains("alicloud_db_connection")));
        // Private routing still points the workload at the in-VPC endpoint.
        let secret = resources.last().unwrap();
        let host = secret.attributes["stringData"]["hostAddress"].as_str().unwrap();
        assert!(host.contains("alicloud_db_instance"));
    }

    #[test]
    fn public_routing_uses_the_connection_endpoint() {
        let mut settings = settings();
        settings.security_ips = vec!["0.0.0.0/0".into()];
        settings.private_routing = false;
        let (resources, _) = generate(&DbEngine::mysql(), &request(), &settings).unwrap();
        let secret = resources.last().unwrap();
        let host = secret.attributes["stringData"]["hostAddress"].as_str().unwrap();
        assert!(host.contains("alicloud_db_connection"));
        assert!(host.ends_with(".connection_string"));
    }
}
