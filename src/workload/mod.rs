//! Workload config types and their compilation into pod specs.

pub mod materializer;
pub mod spec;

pub use materializer::{ContainerMaterializer, Materialized};
