//! Raw Kubernetes manifest passthrough.
//!
//! Reads YAML or JSON manifest files from configured paths and wraps every
//! document into a resource without touching its content. Paths from both
//! tiers are merged and deduplicated; directories are walked recursively.
//! Output order is deterministic: paths sorted lexicographically, documents
//! in file order.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::config;
use crate::error::{Error, Result};
use crate::request::{GeneratorRequest, GeneratorResponse};
use crate::resource::{Resource, ResourceType};

const MODULE: &str = "manifest";

/// Manifest file extensions; anything else in a directory is skipped.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestConfig {
    /// Manifest files or directories of them.
    #[serde(default)]
    paths: Vec<String>,
}

/// Generator passing raw manifests through unchanged.
pub struct ManifestModule;

impl crate::modules::Module for ManifestModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
        if request.dev_config.is_none() && request.platform_config.is_none() {
            return Ok(None);
        }

        let dev: ManifestConfig =
            config::decode_tier_opt(MODULE, "dev", request.dev_config.as_ref())?.unwrap_or_default();
        let platform: ManifestConfig =
            config::decode_tier_opt(MODULE, "platform", request.platform_config.as_ref())?
                .unwrap_or_default();

        // BTreeSet both deduplicates and fixes the traversal order.
        let merged: BTreeSet<String> = dev.paths.into_iter().chain(platform.paths).collect();

        let mut resources = Vec::new();
        for path in &merged {
            collect_path(Path::new(path), &mut resources)?;
        }

        debug!(count = resources.len(), "collected raw manifests");
        Ok(Some(GeneratorResponse::with_resources(resources)))
    }
}

fn collect_path(path: &Path, resources: &mut Vec<Resource>) -> Result<()> {
    let meta = fs::metadata(path).map_err(|source| Error::ManifestIo {
        path: path.to_path_buf(),
        source,
    })?;

    if meta.is_dir() {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let io = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk failed"));
                Error::ManifestIo {
                    path: path.to_path_buf(),
                    source: io,
                }
            })?;
            if entry.file_type().is_file() && has_manifest_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
        for file in files {
            collect_file(&file, resources)?;
        }
    } else {
        collect_file(path, resources)?;
    }
    Ok(())
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn collect_file(path: &Path, resources: &mut Vec<Resource>) -> Result<()> {
    let content = fs::read_to_string(path).map_err(|source| Error::ManifestIo {
        path: path.to_path_buf(),
        source,
    })?;

    for document in serde_yaml::Deserializer::from_str(&content) {
        let value: Value = Value::deserialize(document).map_err(|err| Error::ManifestParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if value.is_null() {
            continue;
        }
        resources.push(wrap_document(path, value)?);
    }
    Ok(())
}

/// Wrap one manifest document. Raw manifests get namespace-less ids so the
/// same file can be applied to any namespace the manifest itself names.
fn wrap_document(path: &Path, value: Value) -> Result<Resource> {
    let api_version = document_str(path, &value, "/apiVersion")?;
    let kind = document_str(path, &value, "/kind")?;
    let name = document_str(path, &value, "/metadata/name")?;

    let mut extensions = serde_json::Map::new();
    extensions.insert(
        "GVK".to_string(),
        Value::String(format!("{api_version}, Kind={kind}")),
    );

    Ok(Resource {
        id: format!("{api_version}:{kind}:{name}"),
        resource_type: ResourceType::Kubernetes,
        attributes: value,
        depends_on: Vec::new(),
        extensions,
    })
}

fn document_str(path: &Path, value: &Value, pointer: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::ManifestParse {
            path: path.to_path_buf(),
            message: format!("document is missing {}", pointer.trim_start_matches('/')),
        })
}
