//! Operation rules for CollaSet workloads.
//!
//! Emits a PodTransitionRule bounding how many pods may be unavailable
//! during transitions. Only CollaSets honor transition rules; Deployments
//! manage availability through their own rollout strategy and jobs have no
//! availability to protect, so both yield not-applicable.

use serde::Deserialize;
use tracing::debug;

use crate::config;
use crate::error::Result;
use crate::k8s::{self, IntOrString};
use crate::request::{GeneratorRequest, GeneratorResponse, ServiceKind, WorkloadProfile};
use crate::resource;

const MODULE: &str = "opsrule";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpsRuleConfig {
    /// Count or percentage, e.g. `3` or `"30%"`.
    max_unavailable: Option<IntOrString>,
}

/// Generator for pod transition rules.
pub struct OpsRuleModule;

impl crate::modules::Module for OpsRuleModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        if request.dev_config.is_none() && request.platform_config.is_none() {
            return Ok(None);
        }

        let Some(workload) = request.workload.as_ref() else {
            return Ok(None);
        };
        if workload.profile == WorkloadProfile::Job {
            debug!(app = %request.app, "job workload, no transition rule");
            return Ok(None);
        }
        if workload.service_kind != Some(ServiceKind::CollaSet) {
            debug!(app = %request.app, "workload is not a CollaSet, no transition rule");
            return Ok(None);
        }

        let dev: OpsRuleConfig =
            config::decode_tier_opt(MODULE, "dev", request.dev_config.as_ref())?.unwrap_or_default();
        let platform: OpsRuleConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();
        let Some(max_unavailable) = dev.max_unavailable.or(platform.max_unavailable) else {
            return Ok(None);
        };

        let mut rule = k8s::PodTransitionRule::new(request.unique_app_name(), &request.project);
        rule.spec = k8s::PodTransitionRuleSpec {
            selector: Some(k8s::LabelSelector::matching(request.unique_app_labels())),
            rules: vec![k8s::TransitionRule {
                name: "maxUnavailable".to_string(),
                available_policy: Some(k8s::AvailablePolicy {
                    max_unavailable_value: Some(max_unavailable),
                }),
            }],
        };

        Ok(Some(GeneratorResponse::with_resources(vec![
            resource::kubernetes(&rule)?,
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{run, Module};
    use crate::request::WorkloadDescriptor;

    fn request(
        workload: Option<WorkloadDescriptor>,
        dev: Option<serde_json::Value>,
        platform: Option<serde_json::Value>,
    ) -> GeneratorRequest {
        GeneratorRequest {
            project: "store".into(),
            stack: "prod".into(),
            app: "api".into(),
            workload,
            dev_config: dev.and_then(|d| d.as_object().cloned()),
            platform_config: platform.and_then(|p| p.as_object().cloned()),
        }
    }

    #[test]
    fn both_tiers_absent_is_not_applicable() {
        let req = request(Some(WorkloadDescriptor::service(ServiceKind::CollaSet)), None, None);
        assert!(OpsRuleModule.generate(&req).unwrap().is_none());
    }

    /// Story: a CollaSet workload with a percentage budget gets a
    /// PodTransitionRule selecting the app's pods.
    #[test]
    fn story_colla_set_gets_a_transition_rule() {
        let req = request(
            Some(WorkloadDescriptor::service(ServiceKind::CollaSet)),
            Some(serde_json::json!({"maxUnavailable": "30%"})),
            None,
        );
        let response = run(&OpsRuleModule, &req).unwrap().unwrap();
        let rule = &response.resources[0];
        assert_eq!(
            rule.id,
            "apps.kusionstack.io/v1alpha1:PodTransitionRule:store:store-prod-api"
        );
        assert_eq!(
            rule.attributes["spec"]["rules"][0]["availablePolicy"]["maxUnavailableValue"],
            "30%"
        );
        assert_eq!(
            rule.attributes["spec"]["selector"]["matchLabels"]["app.kubernetes.io/name"],
            "api"
        );
    }

    #[test]
    fn integer_budget_is_kept_numeric() {
        let req = request(
            Some(WorkloadDescriptor::service(ServiceKind::CollaSet)),
            None,
            Some(serde_json::json!({"maxUnavailable": 2})),
        );
        let response = run(&OpsRuleModule, &req).unwrap().unwrap();
        assert_eq!(
            response.resources[0].attributes["spec"]["rules"][0]["availablePolicy"]
                ["maxUnavailableValue"],
            2
        );
    }

    #[test]
    fn dev_budget_wins_over_platform() {
        let req = request(
            Some(WorkloadDescriptor::service(ServiceKind::CollaSet)),
            Some(serde_json::json!({"maxUnavailable": "10%"})),
            Some(serde_json::json!({"maxUnavailable": "50%"})),
        );
        let response = run(&OpsRuleModule, &req).unwrap().unwrap();
        assert_eq!(
            response.resources[0].attributes["spec"]["rules"][0]["availablePolicy"]
                ["maxUnavailableValue"],
            "10%"
        );
    }

    /// Story: job workloads have no availability to protect; the module
    /// skips instead of erroring.
    #[test]
    fn story_job_workload_is_not_applicable() {
        let req = request(
            Some(WorkloadDescriptor::job()),
            Some(serde_json::json!({"maxUnavailable": "30%"})),
            None,
        );
        assert!(OpsRuleModule.generate(&req).unwrap().is_none());
    }

    #[test]
    fn deployment_workload_is_not_applicable() {
        let req = request(
            Some(WorkloadDescriptor::service(ServiceKind::Deployment)),
            Some(serde_json::json!({"maxUnavailable": "30%"})),
            None,
        );
        assert!(OpsRuleModule.generate(&req).unwrap().is_none());
    }
}
