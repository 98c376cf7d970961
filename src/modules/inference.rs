//! Model inference accessory.
//!
//! Runs a language model behind an in-cluster HTTP endpoint. The only
//! supported framework is Ollama: a Deployment that writes a Modelfile
//! from the tuning parameters and serves the model, plus a lightweight
//! proxy Deployment fronting it. The workload reaches the model through
//! the `INFERENCE_URL` env var patched onto its containers.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Deserialize;
use tracing::debug;

use crate::config;
use crate::error::{Error, Result};
use crate::k8s::{self, EnvVar};
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{self, Patch};

const MODULE: &str = "inference";

const DEPLOYMENT_SUFFIX: &str = "-infer-deployment";
const STORAGE_SUFFIX: &str = "-infer-storage";
const SERVICE_SUFFIX: &str = "-infer-service";
const PORT_SUFFIX: &str = "-port";
const CONTAINER_SUFFIX: &str = "-infer-container";

/// Port the services expose to callers.
const CALLED_PORT: i32 = 80;

const OLLAMA_FRAMEWORK: &str = "ollama";
const OLLAMA_PORT: i32 = 11434;
const OLLAMA_IMAGE: &str = "ollama/ollama";
const OLLAMA_DATA_DIR: &str = "/root/.ollama";

const PROXY_NAME: &str = "proxy";
const PROXY_PORT: i32 = 5000;
const PROXY_IMAGE: &str = "kangy126/proxy";

/// Kubernetes port names cap at 15 characters.
const MAX_PORT_NAME: usize = 15;

#[derive(Debug, Default, Deserialize)]
struct InferenceOptions {
    model: Option<String>,
    framework: Option<String>,
    system: Option<String>,
    template: Option<String>,
    top_k: Option<i64>,
    top_p: Option<f64>,
    temperature: Option<f64>,
    num_predict: Option<i64>,
    num_ctx: Option<i64>,
}

/// Fully resolved inference settings.
#[derive(Debug, Clone)]
struct Inference {
    model: String,
    framework: String,
    system: String,
    template: String,
    top_k: i64,
    top_p: f64,
    temperature: f64,
    num_predict: i64,
    num_ctx: i64,
}

impl Default for Inference {
    fn default() -> Self {
        Self {
            model: String::new(),
            framework: String::new(),
            system: String::new(),
            template: String::new(),
            top_k: 40,
            top_p: 0.9,
            temperature: 0.8,
            num_predict: 128,
            num_ctx: 2048,
        }
    }
}

impl Inference {
    /// Overlay one tier's options; set fields win.
    fn apply(&mut self, options: InferenceOptions) {
        if let Some(model) = options.model {
            self.model = model;
        }
        if let Some(framework) = options.framework {
            self.framework = framework;
        }
        if let Some(system) = options.system {
            self.system = system;
        }
        if let Some(template) = options.template {
            self.template = template;
        }
        if let Some(top_k) = options.top_k {
            self.top_k = top_k;
        }
        if let Some(top_p) = options.top_p {
            self.top_p = top_p;
        }
        if let Some(temperature) = options.temperature {
            self.temperature = temperature;
        }
        if let Some(num_predict) = options.num_predict {
            self.num_predict = num_predict;
        }
        if let Some(num_ctx) = options.num_ctx {
            self.num_ctx = num_ctx;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.top_k <= 0 {
            return Err(Error::validation_for_field(MODULE, "top_k", "must be greater than 0"));
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(Error::validation_for_field(
                MODULE,
                "top_p",
                "must be greater than 0 and at most 1",
            ));
        }
        if self.temperature <= 0.0 {
            return Err(Error::validation_for_field(
                MODULE,
                "temperature",
                "must be greater than 0",
            ));
        }
        if self.num_predict < -2 {
            return Err(Error::validation_for_field(
                MODULE,
                "num_predict",
                "must be at least -2",
            ));
        }
        if self.num_ctx <= 0 {
            return Err(Error::validation_for_field(MODULE, "num_ctx", "must be greater than 0"));
        }
        Ok(())
    }

    /// Modelfile fed to `ollama create`, single-quoted for the shell.
    fn modelfile(&self) -> String {
        let mut out = String::from("'");
        let _ = writeln!(out, "FROM {}", self.model);
        if !self.system.is_empty() {
            let _ = writeln!(out, "SYSTEM \"\"\"{}\"\"\"", self.system);
        }
        if !self.template.is_empty() {
            let _ = writeln!(out, "TEMPLATE \"\"\"{}\"\"\"", self.template);
        }
        let _ = writeln!(out, "PARAMETER top_k {}", self.top_k);
        let _ = writeln!(out, "PARAMETER top_p {:.6}", self.top_p);
        let _ = writeln!(out, "PARAMETER temperature {:.6}", self.temperature);
        let _ = writeln!(out, "PARAMETER num_predict {}", self.num_predict);
        let _ = writeln!(out, "PARAMETER num_ctx {}", self.num_ctx);
        out.push('\'');
        out
    }

    /// Container command: write the Modelfile, start the server, register
    /// the model against it, then keep serving in the foreground.
    fn model_command(&self) -> Vec<String> {
        let script = [
            format!("echo {} > Modelfile", self.modelfile()),
            "ollama serve & OLLAMA_SERVE_PID=$!".to_string(),
            "sleep 5".to_string(),
            format!("ollama create {} -f Modelfile", self.model),
            "wait $OLLAMA_SERVE_PID".to_string(),
        ]
        .join(" && ");
        vec!["/bin/sh".to_string(), "-c".to_string(), script]
    }
}

fn accessory_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("accessory".to_string(), name.to_string())])
}

fn port_name(prefix: &str) -> String {
    let mut name = format!("{prefix}{PORT_SUFFIX}");
    name.truncate(MAX_PORT_NAME);
    name
}

/// Generator for the model inference stack.
pub struct InferenceModule;

impl crate::modules::Module for InferenceModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        let Some(dev) = request.dev_config.as_ref() else {
            return Ok(None);
        };

        let mut inference = Inference::default();
        inference.apply(config::decode_tier::<InferenceOptions>(MODULE, "dev", dev)?);
        if let Some(platform) =
            config::decode_tier_opt::<InferenceOptions>(MODULE, "platform", request.platform_config.as_ref())?
        {
            inference.apply(platform);
        }
        inference.validate()?;

        let framework = inference.framework.to_lowercase();
        if framework != OLLAMA_FRAMEWORK {
            return Err(Error::validation_for_field(
                MODULE,
                "framework",
                format!("unsupported framework `{}`", inference.framework),
            ));
        }

        debug!(model = %inference.model, %framework, "generating inference resources");

        let ollama_service_name = format!("{framework}{SERVICE_SUFFIX}");
        let proxy_service_name = format!("{PROXY_NAME}{SERVICE_SUFFIX}");

        let resources = vec![
            resource::kubernetes(&ollama_deployment(&inference, &framework, request))?,
            resource::kubernetes(&service(
                &ollama_service_name,
                &framework,
                OLLAMA_PORT,
                request,
            ))?,
            resource::kubernetes(&proxy_deployment(&inference, &ollama_service_name, request))?,
            resource::kubernetes(&service(&proxy_service_name, PROXY_NAME, PROXY_PORT, request))?,
        ];

        let patch = Patch {
            environments: vec![EnvVar::literal("INFERENCE_URL", &proxy_service_name)],
            ..Default::default()
        };

        Ok(Some(GeneratorResponse {
            resources,
            patch: Some(patch),
        }))
    }
}

fn ollama_deployment(
    inference: &Inference,
    framework: &str,
    request: &GeneratorRequest,
) -> k8s::Deployment {
    let storage = format!("{framework}{STORAGE_SUFFIX}");
    let container = k8s::Container {
        name: format!("{framework}{CONTAINER_SUFFIX}"),
        image: OLLAMA_IMAGE.to_string(),
        command: inference.model_command(),
        ports: vec![k8s::ContainerPort {
            name: Some(port_name(framework)),
            container_port: OLLAMA_PORT,
        }],
        volume_mounts: vec![k8s::VolumeMount {
            name: storage.clone(),
            mount_path: OLLAMA_DATA_DIR.to_string(),
            sub_path: None,
        }],
        ..Default::default()
    };

    let mut deployment = k8s::Deployment::new(
        format!("{framework}{DEPLOYMENT_SUFFIX}"),
        &request.project,
    );
    deployment.spec = k8s::DeploymentSpec {
        replicas: None,
        selector: k8s::LabelSelector::matching(accessory_labels(framework)),
        template: k8s::PodTemplateSpec {
            metadata: k8s::TemplateMeta {
                labels: accessory_labels(framework),
                ..Default::default()
            },
            spec: k8s::PodSpec {
                containers: vec![container],
                volumes: vec![k8s::Volume {
                    name: storage,
                    empty_dir: Some(k8s::EmptyDirVolumeSource {}),
                    ..Default::default()
                }],
                ..Default::default()
            },
        },
    };
    deployment
}

fn proxy_deployment(
    inference: &Inference,
    ollama_service_name: &str,
    request: &GeneratorRequest,
) -> k8s::Deployment {
    let container = k8s::Container {
        name: format!("{PROXY_NAME}{CONTAINER_SUFFIX}"),
        image: PROXY_IMAGE.to_string(),
        env: vec![
            EnvVar::literal("MODEL", &inference.model),
            EnvVar::literal("FRAMEWORK_URL", ollama_service_name),
        ],
        ports: vec![k8s::ContainerPort {
            name: Some(port_name(PROXY_NAME)),
            container_port: PROXY_PORT,
        }],
        ..Default::default()
    };

    let mut deployment = k8s::Deployment::new(
        format!("{PROXY_NAME}{DEPLOYMENT_SUFFIX}"),
        &request.project,
    );
    deployment.spec = k8s::DeploymentSpec {
        replicas: None,
        selector: k8s::LabelSelector::matching(accessory_labels(PROXY_NAME)),
        template: k8s::PodTemplateSpec {
            metadata: k8s::TemplateMeta {
                labels: accessory_labels(PROXY_NAME),
                ..Default::default()
            },
            spec: k8s::PodSpec {
                containers: vec![container],
                ..Default::default()
            },
        },
    };
    deployment
}

/// ClusterIP service exposing [`CALLED_PORT`] onto the backend port.
fn service(
    name: &str,
    accessory: &str,
    target_port: i32,
    request: &GeneratorRequest,
) -> k8s::Service {
    let mut svc = k8s::Service::new(name, &request.project);
    svc.metadata.labels = accessory_labels(accessory);
    svc.spec.service_type = Some("ClusterIP".to_string());
    svc.spec.selector = accessory_labels(accessory);
    svc.spec.ports = vec![k8s::ServicePort {
        name: None,
        port: CALLED_PORT,
        target_port: Some(target_port),
        protocol: None,
    }];
    svc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{run, Module};

    fn request(dev: serde_json::Value, platform: Option<serde_json::Value>) -> GeneratorRequest {
        GeneratorRequest {
            project: "store".into(),
            stack: "dev".into(),
            app: "assist".into(),
            workload: None,
            dev_config: dev.as_object().cloned(),
            platform_config: platform.and_then(|p| p.as_object().cloned()),
        }
    }

    #[test]
    fn absent_dev_config_is_not_applicable() {
        let req = GeneratorRequest::default();
        assert!(InferenceModule.generate(&req).unwrap().is_none());
    }

    /// Story: a minimal Ollama config yields the full four-resource stack
    /// and an INFERENCE_URL pointing at the proxy service.
    #[test]
    fn story_ollama_stack() {
        let dev = serde_json::json!({"model": "llama3", "framework": "Ollama"});
        let response = run(&InferenceModule, &request(dev, None)).unwrap().unwrap();

        let ids: Vec<&str> = response.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "apps/v1:Deployment:store:ollama-infer-deployment",
                "v1:Service:store:ollama-infer-service",
                "apps/v1:Deployment:store:proxy-infer-deployment",
                "v1:Service:store:proxy-infer-service",
            ]
        );

        let patch = response.patch.unwrap();
        assert_eq!(patch.environments[0].name, "INFERENCE_URL");
        assert_eq!(
            patch.environments[0].value.as_deref(),
            Some("proxy-infer-service")
        );
    }

    #[test]
    fn ollama_command_builds_the_modelfile() {
        let dev = serde_json::json!({"model": "llama3", "framework": "Ollama", "system": "be brief"});
        let response = run(&InferenceModule, &request(dev, None)).unwrap().unwrap();
        let command =
            response.resources[0].attributes["spec"]["template"]["spec"]["containers"][0]["command"]
                .clone();
        assert_eq!(command[0], "/bin/sh");
        assert_eq!(command[1], "-c");
        let script = command[2].as_str().unwrap();
        assert!(script.contains("FROM llama3"));
        assert!(script.contains("SYSTEM \"\"\"be brief\"\"\""));
        assert!(script.contains("PARAMETER top_k 40"));
        assert!(script.contains("PARAMETER num_ctx 2048"));
        assert!(script.contains("ollama serve & OLLAMA_SERVE_PID=$!"));
        assert!(script.contains("ollama create llama3 -f Modelfile"));
    }

    #[test]
    fn services_front_the_backend_ports() {
        let dev = serde_json::json!({"model": "llama3", "framework": "Ollama"});
        let response = run(&InferenceModule, &request(dev, None)).unwrap().unwrap();
        let ollama_svc = &response.resources[1].attributes["spec"]["ports"][0];
        assert_eq!(ollama_svc["port"], 80);
        assert_eq!(ollama_svc["targetPort"], 11434);
        let proxy_svc = &response.resources[3].attributes["spec"]["ports"][0];
        assert_eq!(proxy_svc["port"], 80);
        assert_eq!(proxy_svc["targetPort"], 5000);
    }

    #[test]
    fn proxy_is_wired_to_the_ollama_service() {
        let dev = serde_json::json!({"model": "llama3", "framework": "Ollama"});
        let response = run(&InferenceModule, &request(dev, None)).unwrap().unwrap();
        let env = &response.resources[2].attributes["spec"]["template"]["spec"]["containers"][0]["env"];
        assert_eq!(env[0]["name"], "MODEL");
        assert_eq!(env[0]["value"], "llama3");
        assert_eq!(env[1]["name"], "FRAMEWORK_URL");
        assert_eq!(env[1]["value"], "ollama-infer-service");
    }

    #[test]
    fn platform_tier_overrides_dev_tuning() {
        let dev = serde_json::json!({"model": "llama3", "framework": "Ollama", "num_ctx": 4096});
        let platform = serde_json::json!({"num_ctx": 8192});
        let response = run(&InferenceModule, &request(dev, Some(platform)))
            .unwrap()
            .unwrap();
        let command = response.resources[0].attributes["spec"]["template"]["spec"]["containers"][0]
            ["command"][2]
            .as_str()
            .unwrap()
            .to_string();
        assert!(command.contains("PARAMETER num_ctx 8192"));
    }

    #[test]
    fn unsupported_framework_is_rejected() {
        let dev = serde_json::json!({"model": "llama3", "framework": "KubeRay"});
        let err = InferenceModule.generate(&request(dev, None)).unwrap_err();
        assert!(err.to_string().contains("unsupported framework"));
    }

    #[test]
    fn tuning_parameters_are_range_checked() {
        for (field, value) in [
            ("top_k", serde_json::json!(0)),
            ("top_p", serde_json::json!(1.5)),
            ("temperature", serde_json::json!(-0.1)),
            ("num_predict", serde_json::json!(-3)),
            ("num_ctx", serde_json::json!(0)),
        ] {
            let mut dev = serde_json::json!({"model": "llama3", "framework": "Ollama"});
            dev[field] = value;
            let err = InferenceModule.generate(&request(dev, None)).unwrap_err();
            assert!(err.to_string().contains(field), "expected error naming {field}");
        }
    }
}
