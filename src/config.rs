//! Two-tier config decoding.
//!
//! Modules receive their config as loosely typed maps. Each module decodes
//! the tiers it cares about into its own typed struct in a single step; a
//! type mismatch anywhere in the tier fails the whole decode rather than
//! silently dropping the field.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::request::GenericConfig;

/// Decode one config tier into a typed struct.
///
/// Unknown keys are ignored (tiers routinely carry fields for other
/// consumers); wrongly typed values are an error.
pub fn decode_tier<T: DeserializeOwned>(
    module: &str,
    tier: &'static str,
    config: &GenericConfig,
) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(config.clone()))
        .map_err(|source| Error::decode(module, tier, source))
}

/// Decode an optional tier, mapping absence to `None`.
pub fn decode_tier_opt<T: DeserializeOwned>(
    module: &str,
    tier: &'static str,
    config: Option<&GenericConfig>,
) -> Result<Option<T>> {
    config
        .map(|config| decode_tier(module, tier, config))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        #[serde(default)]
        replicas: Option<i32>,
        #[serde(default)]
        suffix: String,
    }

    fn tier(value: serde_json::Value) -> GenericConfig {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = tier(serde_json::json!({"replicas": 2, "unrelated": true}));
        let sample: Sample = decode_tier("service", "platform", &config).unwrap();
        assert_eq!(sample.replicas, Some(2));
    }

    #[test]
    fn type_mismatch_fails_the_whole_tier() {
        let config = tier(serde_json::json!({"replicas": "two"}));
        let err = decode_tier::<Sample>("service", "platform", &config).unwrap_err();
        assert!(matches!(err, Error::Decode { tier: "platform", .. }));
    }

    #[test]
    fn absent_tier_decodes_to_none() {
        let decoded: Option<Sample> = decode_tier_opt("service", "dev", None).unwrap();
        assert!(decoded.is_none());
    }
}
