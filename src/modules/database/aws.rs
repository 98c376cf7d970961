//! AWS RDS managed database instances.
//!
//! Cloud mode on AWS declares three Terraform resources: a random
//! password, a security group scoped to the engine port, and the RDS
//! instance itself. Credentials flow into the workload through the shared
//! secret, with the host address and password left as symbolic path
//! dependencies for Terraform to resolve.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::request::GeneratorRequest;
use crate::resource::{self, Patch, ProviderConfig, Resource};

use super::{DbEngine, DbSettings};

const AWS_PROVIDER: ProviderConfig = ProviderConfig {
    source: "hashicorp/aws",
    version: "5.0.1",
};

const AWS_REGION_ENV: &str = "AWS_REGION";
const SECURITY_GROUP_TYPE: &str = "aws_security_group";
const DB_INSTANCE_TYPE: &str = "aws_db_instance";

pub(super) fn generate(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
) -> Result<(Vec<Resource>, Patch)> {
    let region = super::resolve_region(engine, settings, AWS_REGION_ENV)?;
    debug!(module = engine.name, %region, "generating aws rds resources");

    let (password_res, password_id) = super::random_password(engine, settings)?;
    let (group_res, group_id) = security_group(engine, settings, &region)?;
    let (instance_res, instance_id) =
        db_instance(engine, settings, &region, &password_id, &group_id)?;

    let host = resource::path_dependency(&instance_id, "address");
    let password = resource::path_dependency(&password_id, "result");
    let (db_secret, patch) =
        super::db_secret_and_patch(engine, request, settings, &host, &settings.username, &password)?;

    Ok((vec![password_res, group_res, instance_res, db_secret], patch))
}

/// Security group admitting the configured source ranges on the engine
/// port and allowing all egress.
fn security_group(
    engine: &DbEngine,
    settings: &DbSettings,
    region: &str,
) -> Result<(Resource, String)> {
    let attributes = json!({
        "egress": [{
            "cidr_blocks": ["0.0.0.0/0"],
            "protocol": "-1",
            "from_port": 0,
            "to_port": 0,
        }],
        "ingress": [{
            "cidr_blocks": settings.security_ips,
            "protocol": "tcp",
            "from_port": engine.port,
            "to_port": engine.port,
        }],
    });
    let name = format!("{}{}", settings.database_name, engine.res_suffix());
    let resource = resource::terraform(
        &AWS_PROVIDER,
        SECURITY_GROUP_TYPE,
        &name,
        attributes,
        json!({ "region": region }),
    )?;
    let id = resource.id.clone();
    Ok((resource, id))
}

fn db_instance(
    engine: &DbEngine,
    settings: &DbSettings,
    region: &str,
    password_id: &str,
    group_id: &str,
) -> Result<(Resource, String)> {
    let mut attributes = json!({
        "allocated_storage": settings.size,
        "engine": engine.aws_engine,
        "engine_version": settings.version,
        "identifier": settings.database_name,
        "instance_class": settings.instance_type,
        "password": resource::path_dependency(password_id, "result"),
        "publicly_accessible": crate::netutil::is_public_accessible(&settings.security_ips),
        "skip_final_snapshot": true,
        "username": settings.username,
        "vpc_security_group_ids": [resource::path_dependency(group_id, "id")],
    });
    if !settings.subnet_id.is_empty() {
        attributes["db_subnet_group_name"] = Value::String(settings.subnet_id.clone());
    }

    let resource = resource::terraform(
        &AWS_PROVIDER,
        DB_INSTANCE_TYPE,
        &settings.database_name,
        attributes,
        json!({ "region": region }),
    )?;
    let id = resource.id.clone();
    Ok((resource, id))
}
