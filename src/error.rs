//! Error types for trellis module generators

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for module generation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Config failed semantic validation after decoding
    #[error("validation error in module `{module}`: {message}")]
    Validation {
        /// Module that rejected the config
        module: String,
        /// What was wrong with it
        message: String,
    },

    /// A config tier could not be decoded into its typed form
    #[error("failed to decode {tier} config for module `{module}`: {source}")]
    Decode {
        /// Module whose config failed to decode
        module: String,
        /// Which tier was being decoded (`dev` or `platform`)
        tier: &'static str,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Required cloud-provider context was missing or malformed
    #[error("provider error in module `{module}`: {message}")]
    Provider {
        /// Module that needed the provider context
        module: String,
        /// What was missing or malformed
        message: String,
    },

    /// A manifest path could not be read
    #[error("failed to read manifest `{}`: {source}", path.display())]
    ManifestIo {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A manifest file held a document that could not be parsed
    #[error("failed to parse manifest `{}`: {message}", path.display())]
    ManifestParse {
        /// Path of the offending file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A resource could not be encoded into its attribute payload
    #[error("failed to encode resource attributes: {0}")]
    Encode(#[from] serde_json::Error),

    /// A module generator panicked; caught at the dispatch boundary and
    /// converted into an error carrying a JSON snapshot of the request
    #[error("module `{module}` panicked: {message} (request: {request})")]
    Internal {
        /// Module that panicked
        module: String,
        /// Panic payload, if it was a string
        message: String,
        /// JSON snapshot of the generator request
        request: String,
    },
}

impl Error {
    /// Create a validation error for the given module
    pub fn validation(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(
        module: impl Into<String>,
        field: &str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Validation {
            module: module.into(),
            message: format!("{field}: {message}"),
        }
    }

    /// Create a decode error for one config tier
    pub fn decode(
        module: impl Into<String>,
        tier: &'static str,
        source: serde_json::Error,
    ) -> Self {
        Self::Decode {
            module: module.into(),
            tier,
            source,
        }
    }

    /// Create a provider error for the given module
    pub fn provider(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create an internal error from a recovered panic
    pub fn internal(
        module: impl Into<String>,
        message: impl Into<String>,
        request: impl Into<String>,
    ) -> Self {
        Self::Internal {
            module: module.into(),
            message: message.into(),
            request: request.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Reporting Across Module Generators
    // ==========================================================================
    //
    // These tests demonstrate how failures surface to the orchestrator. Each
    // error category carries the module name so a multi-module run can point
    // at the config block the user has to fix.

    /// Story: validation catches bad config before any resource is emitted
    #[test]
    fn story_validation_rejects_bad_config() {
        // Scenario: unsupported deployment mode for a database
        let err = Error::validation("mysql", "unsupported database type \"edge\"");
        assert!(err.to_string().contains("module `mysql`"));
        assert!(err.to_string().contains("unsupported database type"));

        // Scenario: port outside the valid range
        let err = Error::validation_for_field("service", "ports[0].port", "must be between 1 and 65535");
        assert!(err.to_string().contains("ports[0].port: must be between 1 and 65535"));
    }

    /// Story: decode errors name the tier so platform and dev config
    /// mistakes are distinguishable
    #[test]
    fn story_decode_errors_name_the_tier() {
        let source = serde_json::from_value::<i32>(serde_json::json!("ten")).unwrap_err();
        let err = Error::decode("monitoring", "platform", source);
        assert!(err
            .to_string()
            .starts_with("failed to decode platform config for module `monitoring`"));
        assert!(std::error::Error::source(&err).is_some());
    }

    /// Story: provider errors surface missing cloud context
    #[test]
    fn story_provider_errors_during_cloud_generation() {
        // Scenario: no region configured and no env fallback
        let err = Error::provider("mysql", "empty aws provider region");
        assert!(err.to_string().contains("provider error"));
        assert!(err.to_string().contains("region"));
    }

    /// Story: a panicking generator is reported, not crashed through
    #[test]
    fn story_recovered_panic_carries_request_snapshot() {
        let err = Error::internal("opsrule", "index out of bounds", "{\"project\":\"demo\"}");
        let text = err.to_string();
        assert!(text.contains("module `opsrule` panicked"));
        assert!(text.contains("{\"project\":\"demo\"}"));
    }
}
