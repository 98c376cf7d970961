//! Module generators.
//!
//! Each module consumes the two config tiers of a [`GeneratorRequest`] and
//! emits resources plus an optional workload patch. A module that finds no
//! config addressed to it returns `Ok(None)`; the orchestrator skips it.
//! All dispatch goes through [`run`], which turns panics into errors.

pub mod database;
pub mod inference;
pub mod job;
pub mod manifest;
pub mod monitoring;
pub mod network;
pub mod opensearch;
pub mod opsrule;
pub mod service;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::request::{GeneratorRequest, GeneratorResponse};

/// A resource generator for one concern of an application.
pub trait Module {
    /// Stable module name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Generate resources for the request. `Ok(None)` means the module does
    /// not apply to this application.
    fn generate(&self, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>>;
}

/// Run one module against a request.
///
/// A panic inside the generator is caught here and converted into
/// [`Error::Internal`] carrying a JSON snapshot of the request; a buggy
/// module must not take the whole generation pass down.
pub fn run(module: &dyn Module, request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
    debug!(module = module.name(), app = %request.app, "generating resources");
    match catch_unwind(AssertUnwindSafe(|| module.generate(request))) {
        Ok(result) => {
            if let Ok(None) = &result {
                info!(module = module.name(), app = %request.app, "module not applicable, skipping");
            }
            result
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let snapshot = serde_json::to_string(request).unwrap_or_default();
            Err(Error::internal(module.name(), message, snapshot))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickyModule;

    impl Module for PanickyModule {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn generate(&self, _request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
            panic!("index out of bounds in generator");
        }
    }

    struct SkippingModule;

    impl Module for SkippingModule {
        fn name(&self) -> &'static str {
            "skipping"
        }

        fn generate(&self, _request: &GeneratorRequest) -> Result<Option<GeneratorResponse>> {
            Ok(None)
        }
    }

    fn request() -> GeneratorRequest {
        GeneratorRequest {
            project: "store".into(),
            stack: "dev".into(),
            app: "api".into(),
            ..Default::default()
        }
    }

    /// Story: a panicking generator surfaces as a structured error with a
    /// request snapshot, not as a crash.
    #[test]
    fn story_panic_is_caught_at_the_boundary() {
        let err = run(&PanickyModule, &request()).unwrap_err();
        match err {
            Error::Internal { module, message, request } => {
                assert_eq!(module, "panicky");
                assert!(message.contains("index out of bounds"));
                assert!(request.contains("\"app\":\"api\""));
            }
            other => panic!("expected Internal error, got {other:?}"),
        }
    }

    #[test]
    fn not_applicable_passes_through_as_none() {
        assert!(run(&SkippingModule, &request()).unwrap().is_none());
    }
}
