//! Trellis - infrastructure modules compiling app config into deployable resources
//!
//! Trellis turns two tiers of configuration - what developers declare for
//! their application and what platform engineers set for the landing zone -
//! into concrete Kubernetes manifests and Terraform resource blocks. Each
//! concern of an application (its workload, ports, databases, monitoring,
//! ...) is handled by a module that reads both tiers, reconciles them and
//! emits wrapped resources plus patches for the owning workload.
//!
//! # Modules
//!
//! - [`modules::service`] / [`modules::job`] - long-running and scheduled workloads
//! - [`modules::network`] - port exposure through aggregated Services
//! - [`modules::database`] - MySQL and PostgreSQL, local or cloud-managed
//! - [`modules::monitoring`] - Prometheus scrape wiring
//! - [`modules::opsrule`] - transition rules for CollaSet workloads
//! - [`modules::opensearch`] - managed OpenSearch domains
//! - [`modules::inference`] - model serving behind an in-cluster endpoint
//! - [`modules::manifest`] - raw manifest passthrough
//!
//! Supporting layers: [`workload`] materializes container specs, [`resource`]
//! wraps objects with deterministic ids, [`secretref`] resolves secret
//! references in env values, and [`netutil`] validates network ranges.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod k8s;
pub mod modules;
pub mod netutil;
pub mod request;
pub mod resource;
pub mod secretref;
pub mod workload;

pub use error::{Error, Result};
pub use modules::Module;
pub use request::{GeneratorRequest, GeneratorResponse, WorkloadDescriptor};
pub use resource::{Patch, Resource, ResourceType};
