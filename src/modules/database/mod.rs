//! Relational database accessories.
//!
//! MySQL and PostgreSQL share one generator parameterized by an engine
//! descriptor; the differences (ports, image env contract, Terraform
//! engine names) are data, not code. A database renders either as a local
//! in-cluster deployment or as a cloud-managed instance on AWS, AliCloud
//! or ViettelCloud, and always ends with a credentials Secret plus
//! env-var patches pointing the workload at it.

mod alicloud;
mod aws;
mod local;
mod viettelcloud;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config;
use crate::error::{Error, Result};
use crate::k8s::EnvVar;
use crate::netutil::validate_security_ips;
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{self, Patch, ProviderConfig, Resource};

const LOCAL_DB_TYPE: &str = "local";
const CLOUD_DB_TYPE: &str = "cloud";

/// Env var name prefixes for injected credentials. The database name is
/// appended in SCREAMING_SNAKE form so several databases can coexist on
/// one workload.
const DB_HOST_ENV: &str = "TRELLIS_DB_HOST";
const DB_USERNAME_ENV: &str = "TRELLIS_DB_USERNAME";
const DB_PASSWORD_ENV: &str = "TRELLIS_DB_PASSWORD";

/// Which engine a [`DatabaseModule`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    MySql,
    Postgres,
}

/// Engine-specific constants.
#[derive(Debug, Clone, Copy)]
pub struct DbEngine {
    kind: EngineKind,
    /// Engine name: module name, image repo, id suffixes.
    name: &'static str,
    /// Engine name as the AWS RDS API spells it.
    aws_engine: &'static str,
    /// Engine name as the AliCloud RDS API spells it.
    alicloud_engine: &'static str,
    /// Server port.
    port: i32,
    /// Data directory inside the official image.
    data_dir: &'static str,
    /// Username applied when the platform tier is entirely absent.
    default_username: &'static str,
}

impl DbEngine {
    /// MySQL descriptor.
    pub const fn mysql() -> Self {
        Self {
            kind: EngineKind::MySql,
            name: "mysql",
            aws_engine: "mysql",
            alicloud_engine: "MySQL",
            port: 3306,
            data_dir: "/var/lib/mysql",
            default_username: "root",
        }
    }

    /// PostgreSQL descriptor. The default username avoids `postgres`,
    /// which managed offerings reserve for their own superuser.
    pub const fn postgres() -> Self {
        Self {
            kind: EngineKind::Postgres,
            name: "postgres",
            aws_engine: "postgres",
            alicloud_engine: "PostgreSQL",
            port: 5432,
            data_dir: "/var/lib/postgresql/data",
            default_username: "trellis_default",
        }
    }

    /// Resource suffix for engine-scoped object names, e.g. `-mysql`.
    fn res_suffix(&self) -> String {
        format!("-{}", self.name)
    }

    /// Env contract of the official image for the local deployment.
    fn local_env(&self, settings: &DbSettings, secret_name: &str) -> Vec<EnvVar> {
        match self.kind {
            EngineKind::MySql => {
                if settings.username == "root" {
                    vec![EnvVar::from_secret("MYSQL_ROOT_PASSWORD", secret_name, "password")]
                } else {
                    vec![
                        EnvVar::literal("MYSQL_USER", &settings.username),
                        EnvVar::from_secret("MYSQL_PASSWORD", secret_name, "password"),
                    ]
                }
            }
            EngineKind::Postgres => vec![
                EnvVar::literal("POSTGRES_USER", &settings.username),
                EnvVar::from_secret("POSTGRES_PASSWORD", secret_name, "password"),
                EnvVar::literal("POSTGRES_DB", &settings.database_name),
            ],
        }
    }
}

/// Developer-tier database config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbDevConfig {
    /// Deployment mode: `local` or `cloud`.
    #[serde(rename = "type")]
    db_type: Option<String>,
    /// Engine version, e.g. `8.0` / `14.0`.
    version: Option<String>,
}

/// Platform-tier database config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbPlatformConfig {
    /// Cloud provider for cloud mode: `aws`, `alicloud` or `viettelcloud`.
    cloud: Option<String>,
    /// Cloud region; falls back to the provider env var when unset.
    region: Option<String>,
    username: Option<String>,
    category: Option<String>,
    #[serde(rename = "securityIPs")]
    security_ips: Option<Vec<String>>,
    private_routing: Option<bool>,
    size: Option<i64>,
    instance_type: Option<String>,
    #[serde(rename = "subnetID")]
    subnet_id: Option<String>,
    database_name: Option<String>,
    /// Storage volume type of the instance; ViettelCloud only.
    volume_type: Option<String>,
    /// VPC name the instance lands in; ViettelCloud only.
    vpc: Option<String>,
}

/// Fully resolved settings for one database instance.
#[derive(Debug, Clone)]
struct DbSettings {
    db_type: String,
    version: String,
    instance_type: String,
    size: i64,
    category: String,
    username: String,
    security_ips: Vec<String>,
    subnet_id: String,
    private_routing: bool,
    database_name: String,
    region: Option<String>,
    volume_type: String,
    vpc: String,
}

/// Hard defaults, applied only when the platform tier is entirely absent.
/// With a platform tier present, its values are authoritative and missing
/// optional fields fall back per-field.
struct DbDefaults {
    username: &'static str,
    category: &'static str,
    security_ips: &'static [&'static str],
    private_routing: bool,
    size: i64,
}

const DEFAULTS: DbDefaults = DbDefaults {
    username: "",
    category: "Basic",
    security_ips: &["0.0.0.0/0"],
    private_routing: true,
    size: 10,
};

/// Generator for one database engine.
pub struct DatabaseModule {
    engine: DbEngine,
}

impl DatabaseModule {
    /// MySQL module.
    pub fn mysql() -> Self {
        Self {
            engine: DbEngine::mysql(),
        }
    }

    /// PostgreSQL module.
    pub fn postgres() -> Self {
        Self {
            engine: DbEngine::postgres(),
        }
    }
}

impl crate::modules::Module for DatabaseModule {
    fn name(&self) -> &'static str {
        self.engine.name
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        let Some(dev) = request.dev_config.as_ref() else {
            return Ok(None);
        };
        let module = self.engine.name;
        let dev: DbDevConfig = config::decode_tier(module, "dev", dev)?;
        let platform: Option<DbPlatformConfig> =
            config::decode_tier_opt(module, "platform", request.platform_config.as_ref())?;

        let settings = complete(&self.engine, request, dev, platform.as_ref())?;
        validate(&self.engine, &settings)?;

        debug!(
            module,
            database = %settings.database_name,
            mode = %settings.db_type,
            "generating database resources"
        );

        let (resources, patch) = match settings.db_type.to_lowercase().as_str() {
            LOCAL_DB_TYPE => local::generate(&self.engine, request, &settings)?,
            CLOUD_DB_TYPE => {
                let provider = platform
                    .as_ref()
                    .and_then(|p| p.cloud.clone())
                    .ok_or_else(|| {
                        Error::validation(
                            module,
                            "cloud database needs a `cloud` provider in platform config",
                        )
                    })?;
                match provider.to_lowercase().as_str() {
                    "aws" => aws::generate(&self.engine, request, &settings)?,
                    "alicloud" => alicloud::generate(&self.engine, request, &settings)?,
                    "viettelcloud" => viettelcloud::generate(&self.engine, request, &settings)?,
                    other => {
                        return Err(Error::validation(
                            module,
                            format!("unsupported cloud provider `{other}`"),
                        ))
                    }
                }
            }
            other => {
                return Err(Error::validation(
                    module,
                    format!("unsupported database type `{other}`, expected local or cloud"),
                ))
            }
        };

        Ok(Some(GeneratorResponse {
            resources,
            patch: Some(patch),
        }))
    }
}

fn complete(
    engine: &DbEngine,
    request: &GeneratorRequest,
    dev: DbDevConfig,
    platform: Option<&DbPlatformConfig>,
) -> Result<DbSettings> {
    let defaults = DbDefaults {
        username: engine.default_username,
        ..DEFAULTS
    };
    let default_ips = || defaults.security_ips.iter().map(|s| s.to_string()).collect();

    let mut settings = match platform {
        // Platform tier entirely absent: every optional field takes the
        // engine's hard default.
        None => DbSettings {
            db_type: String::new(),
            version: String::new(),
            instance_type: String::new(),
            size: defaults.size,
            category: defaults.category.to_string(),
            username: defaults.username.to_string(),
            security_ips: default_ips(),
            subnet_id: String::new(),
            private_routing: defaults.private_routing,
            database_name: String::new(),
            region: None,
            volume_type: String::new(),
            vpc: String::new(),
        },
        Some(platform) => DbSettings {
            db_type: String::new(),
            version: String::new(),
            instance_type: platform.instance_type.clone().unwrap_or_default(),
            size: platform.size.unwrap_or(defaults.size),
            category: platform
                .category
                .clone()
                .unwrap_or_else(|| defaults.category.to_string()),
            username: platform
                .username
                .clone()
                .unwrap_or_else(|| defaults.username.to_string()),
            security_ips: platform.security_ips.clone().unwrap_or_else(default_ips),
            subnet_id: platform.subnet_id.clone().unwrap_or_default(),
            private_routing: platform.private_routing.unwrap_or(defaults.private_routing),
            database_name: platform.database_name.clone().unwrap_or_default(),
            region: platform.region.clone(),
            volume_type: platform.volume_type.clone().unwrap_or_default(),
            vpc: platform.vpc.clone().unwrap_or_default(),
        },
    };

    settings.db_type = dev.db_type.unwrap_or_default();
    settings.version = dev.version.unwrap_or_default();
    if settings.database_name.is_empty() {
        settings.database_name = format!("{}{}", request.unique_app_name(), engine.res_suffix());
    }
    Ok(settings)
}

fn validate(engine: &DbEngine, settings: &DbSettings) -> Result<()> {
    let module = engine.name;
    if settings.db_type.eq_ignore_ascii_case(CLOUD_DB_TYPE) && settings.instance_type.is_empty() {
        return Err(Error::validation_for_field(
            module,
            "instanceType",
            "required for a cloud managed database instance",
        ));
    }
    validate_security_ips(module, &settings.security_ips)
}

const RANDOM_PROVIDER: ProviderConfig = ProviderConfig {
    source: "hashicorp/random",
    version: "3.6.0",
};

/// Resolve the cloud region: platform config first, then the provider's
/// conventional env var. Managed instances cannot be placed without one.
fn resolve_region(engine: &DbEngine, settings: &DbSettings, env_var: &str) -> Result<String> {
    if let Some(region) = settings.region.as_ref().filter(|r| !r.is_empty()) {
        return Ok(region.clone());
    }
    match std::env::var(env_var) {
        Ok(region) if !region.is_empty() => Ok(region),
        _ => Err(Error::provider(
            engine.name,
            format!("no region configured and {env_var} is unset"),
        )),
    }
}

/// Deterministic `random_password` declaration; the concrete value only
/// ever exists in Terraform state. Returns the resource and its id so the
/// instance and account can reference `result` symbolically.
fn random_password(engine: &DbEngine, settings: &DbSettings) -> Result<(Resource, String)> {
    let name = format!("{}{}", settings.database_name, engine.res_suffix());
    let resource = resource::terraform(
        &RANDOM_PROVIDER,
        "random_password",
        &name,
        json!({
            "length": 16,
            "special": true,
            "override_special": "_",
        }),
        Value::Null,
    )?;
    let id = resource.id.clone();
    Ok((resource, id))
}

/// Build the credentials Secret plus the env-var patch shared by every
/// deployment mode. `host` and `password` may be symbolic path
/// dependencies on Terraform outputs.
fn db_secret_and_patch(
    engine: &DbEngine,
    request: &GeneratorRequest,
    settings: &DbSettings,
    host: &str,
    username: &str,
    password: &str,
) -> Result<(Resource, Patch)> {
    let secret_name = format!("{}{}", settings.database_name, engine.res_suffix());
    let mut secret = crate::k8s::Secret::new(&secret_name, &request.project);
    secret.string_data.insert("hostAddress".to_string(), host.to_string());
    secret.string_data.insert("username".to_string(), username.to_string());
    secret.string_data.insert("password".to_string(), password.to_string());

    let name_suffix = settings.database_name.replace('-', "_").to_uppercase();
    let patch = Patch {
        environments: vec![
            EnvVar::from_secret(format!("{DB_HOST_ENV}_{name_suffix}"), &secret_name, "hostAddress"),
            EnvVar::from_secret(format!("{DB_USERNAME_ENV}_{name_suffix}"), &secret_name, "username"),
            EnvVar::from_secret(format!("{DB_PASSWORD_ENV}_{name_suffix}"), &secret_name, "password"),
        ],
        ..Default::default()
    };

    Ok((resource::kubernetes(&secret)?, patch))
}
