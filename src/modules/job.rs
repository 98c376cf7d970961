//! Run-to-completion job workloads.
//!
//! A schedule turns the workload into a CronJob; otherwise it renders as a
//! one-shot `batch/v1` Job. Pods never restart in place, failures are the
//! job controller's business.

use serde::Deserialize;
use tracing::debug;

use crate::config;
use crate::error::Result;
use crate::k8s;
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{self, merge_maps};
use crate::workload::spec::Base;
use crate::workload::ContainerMaterializer;

const MODULE: &str = "job";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobConfig {
    #[serde(flatten)]
    base: Base,
    /// Cron expression; presence switches to a CronJob.
    schedule: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPlatformConfig {
    schedule: Option<String>,
}

/// Generator for job workloads.
pub struct JobModule;

impl crate::modules::Module for JobModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        let Some(dev) = request.dev_config.as_ref() else {
            return Ok(None);
        };
        let mut job: JobConfig = config::decode_tier(MODULE, "dev", dev)?;
        let platform: JobPlatformConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();
        if job.schedule.is_none() {
            job.schedule = platform.schedule;
        }

        debug!(app = %request.app, scheduled = job.schedule.is_some(), "rendering job workload");

        let materialized = ContainerMaterializer::new(MODULE).materialize(
            &request.unique_app_name(),
            &request.project,
            &job.base.containers,
        )?;

        let mut resources = Vec::new();
        for cm in &materialized.config_maps {
            resources.push(resource::kubernetes(cm)?);
        }

        let selector = request.unique_app_labels();
        let mut labels = selector.clone();
        merge_maps(&mut labels, &job.base.labels);

        let job_spec = k8s::JobSpec {
            template: k8s::PodTemplateSpec {
                metadata: k8s::TemplateMeta {
                    labels: labels.clone(),
                    annotations: job.base.annotations.clone(),
                },
                spec: k8s::PodSpec {
                    containers: materialized.containers,
                    volumes: materialized.volumes,
                    restart_policy: Some("Never".to_string()),
                    topology_spread_constraints: Vec::new(),
                },
            },
        };

        let name = request.unique_app_name();
        match &job.schedule {
            Some(schedule) => {
                let mut cron = k8s::CronJob::new(&name, &request.project, schedule);
                cron.metadata.labels = labels;
                cron.metadata.annotations = job.base.annotations.clone();
                cron.spec.job_template = k8s::JobTemplateSpec { spec: job_spec };
                resources.push(resource::kubernetes(&cron)?);
            }
            None => {
                let mut one_shot = k8s::Job::new(&name, &request.project);
                one_shot.metadata.labels = labels;
                one_shot.metadata.annotations = job.base.annotations.clone();
                one_shot.spec = job_spec;
                resources.push(resource::kubernetes(&one_shot)?);
            }
        }

        Ok(Some(GeneratorResponse::with_resources(resources)))
    }
}
