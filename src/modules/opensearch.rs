//! Amazon OpenSearch Service domains.
//!
//! Declares an `aws_opensearch_domain` Terraform resource and hands the
//! workload its endpoint and region through env var patches. The endpoint
//! stays symbolic until Terraform has applied the domain.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config;
use crate::error::{Error, Result};
use crate::k8s::EnvVar;
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{self, Patch, ProviderConfig};

const MODULE: &str = "opensearch";

const AWS_PROVIDER: ProviderConfig = ProviderConfig {
    source: "hashicorp/aws",
    version: "5.51.1",
};

const DOMAIN_TYPE: &str = "aws_opensearch_domain";

/// Developer-tier domain config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSearchConfig {
    /// `OpenSearch_X.Y` or `Elasticsearch_X.Y`; the service default when
    /// empty.
    #[serde(default)]
    engine_version: String,
    #[serde(default)]
    domain_name: String,
}

/// Platform-tier domain config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSearchPlatformConfig {
    #[serde(default)]
    cluster_config: ClusterConfig,
    #[serde(default)]
    ebs_options: EbsOptions,
    #[serde(default)]
    region: String,
    #[serde(default)]
    statement: Vec<Statement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfig {
    /// Data node instance type, e.g. `t3.small.search`.
    #[serde(default)]
    instance_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EbsOptions {
    #[serde(default)]
    ebs_enabled: bool,
    /// EBS volume size in GiB; required when EBS is enabled.
    #[serde(default)]
    volume_size: i64,
}

/// One statement of the domain access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statement {
    /// `Allow` or `Deny`.
    effect: String,
    #[serde(default)]
    principals: Vec<Principal>,
    #[serde(default)]
    action: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Principal {
    /// `AWS`, `Service`, `Federated`, `CanonicalUser` or `*`.
    #[serde(rename = "type")]
    principal_type: String,
    #[serde(default)]
    identifiers: Vec<String>,
}

/// Generator for managed OpenSearch domains.
pub struct OpenSearchModule;

impl crate::modules::Module for OpenSearchModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        if request.dev_config.is_none() && request.platform_config.is_none() {
            return Ok(None);
        }

        let dev: OpenSearchConfig =
            config::decode_tier_opt(MODULE, "dev", request.dev_config.as_ref())?.unwrap_or_default();
        let platform: OpenSearchPlatformConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();

        if platform.region.is_empty() {
            return Err(Error::validation_for_field(MODULE, "region", "must not be empty"));
        }
        for statement in &platform.statement {
            if statement.effect != "Allow" && statement.effect != "Deny" {
                return Err(Error::validation_for_field(
                    MODULE,
                    "statement.effect",
                    format!("`{}` must be Allow or Deny", statement.effect),
                ));
            }
        }

        debug!(domain = %dev.domain_name, region = %platform.region, "generating opensearch domain");

        let mut attributes = json!({
            "domain_name": dev.domain_name,
            "engine_version": dev.engine_version,
            "cluster_config": {
                "instance_type": platform.cluster_config.instance_type,
            },
            "ebs_options": {
                "ebs_enabled": platform.ebs_options.ebs_enabled,
                "volume_size": platform.ebs_options.volume_size,
            },
        });
        if !platform.statement.is_empty() {
            // The provider takes the access policy as an embedded JSON string.
            attributes["access_policies"] =
                serde_json::Value::String(serde_json::to_string(&platform.statement)?);
        }

        let domain = resource::terraform(
            &AWS_PROVIDER,
            DOMAIN_TYPE,
            &request.unique_app_name(),
            attributes,
            json!({ "region": platform.region }),
        )?;

        let patch = Patch {
            environments: vec![
                EnvVar::literal(
                    "OPEN_SEARCH_ENDPOINT",
                    resource::path_dependency(&domain.id, "endpoint"),
                ),
                EnvVar::literal("OPEN_SEARCH_REGION", &platform.region),
            ],
            ..Default::default()
        };

        Ok(Some(GeneratorResponse {
            resources: vec![domain],
            patch: Some(patch),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{run, Module};

    fn request(dev: Option<serde_json::Value>, platform: Option<serde_json::Value>) -> GeneratorRequest {
        GeneratorRequest {
            project: "store".into(),
            stack: "prod".into(),
            app: "search".into(),
            workload: None,
            dev_config: dev.and_then(|d| d.as_object().cloned()),
            platform_config: platform.and_then(|p| p.as_object().cloned()),
        }
    }

    #[test]
    fn both_tiers_absent_is_not_applicable() {
        assert!(OpenSearchModule.generate(&request(None, None)).unwrap().is_none());
    }

    /// Story: a configured domain renders one Terraform resource plus the
    /// endpoint and region env patches.
    #[test]
    fn story_domain_with_endpoint_patch() {
        let dev = serde_json::json!({
            "domainName": "search-domain",
            "engineVersion": "OpenSearch_2.11"
        });
        let platform = serde_json::json!({
            "region": "us-east-1",
            "clusterConfig": {"instanceType": "t3.small.search"},
            "ebsOptions": {"ebsEnabled": true, "volumeSize": 10}
        });
        let response = run(&OpenSearchModule, &request(Some(dev), Some(platform)))
            .unwrap()
            .unwrap();

        let domain = &response.resources[0];
        assert_eq!(
            domain.id,
            "hashicorp:aws:aws_opensearch_domain:store-prod-search"
        );
        assert_eq!(domain.attributes["domain_name"], "search-domain");
        assert_eq!(domain.attributes["cluster_config"]["instance_type"], "t3.small.search");
        assert_eq!(domain.attributes["ebs_options"]["volume_size"], 10);
        assert_eq!(domain.extensions["providerMeta"]["region"], "us-east-1");

        let patch = response.patch.unwrap();
        assert_eq!(patch.environments[0].name, "OPEN_SEARCH_ENDPOINT");
        assert_eq!(
            patch.environments[0].value.as_deref(),
            Some("$trellis_path.hashicorp:aws:aws_opensearch_domain:store-prod-search.endpoint")
        );
        assert_eq!(patch.environments[1].name, "OPEN_SEARCH_REGION");
        assert_eq!(patch.environments[1].value.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn access_policy_is_embedded_as_json() {
        let dev = serde_json::json!({"domainName": "d"});
        let platform = serde_json::json!({
            "region": "us-east-1",
            "statement": [{
                "effect": "Allow",
                "principals": [{"type": "AWS", "identifiers": ["*"]}],
                "action": ["es:*"]
            }]
        });
        let response = run(&OpenSearchModule, &request(Some(dev), Some(platform)))
            .unwrap()
            .unwrap();
        let policies = response.resources[0].attributes["access_policies"]
            .as_str()
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(policies).unwrap();
        assert_eq!(parsed[0]["effect"], "Allow");
        assert_eq!(parsed[0]["principals"][0]["type"], "AWS");
    }

    #[test]
    fn missing_region_is_rejected() {
        let dev = serde_json::json!({"domainName": "d"});
        let err = OpenSearchModule
            .generate(&request(Some(dev), None))
            .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn invalid_effect_is_rejected() {
        let dev = serde_json::json!({"domainName": "d"});
        let platform = serde_json::json!({
            "region": "us-east-1",
            "statement": [{"effect": "Maybe"}]
        });
        let err = OpenSearchModule
            .generate(&request(Some(dev), Some(platform)))
            .unwrap_err();
        assert!(err.to_string().contains("must be Allow or Deny"));
    }
}
