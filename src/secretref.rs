//! `secret://` reference parsing and the env parser chain.
//!
//! Env values in container config are plain strings with optional magic
//! schemes. Parsers are consulted in order; the raw-literal parser matches
//! everything and therefore always sits last in the chain.

use crate::error::{Error, Result};
use crate::k8s::EnvVar;

const SECRET_SCHEME: &str = "secret://";

/// Parsed `secret://name/key` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    /// Secret name.
    pub name: String,
    /// Key within the secret.
    pub key: String,
}

/// Parse a secret reference of the form `secret://name/key`, optionally
/// wrapped as `${secret://name/key}`.
///
/// Returns `Ok(None)` for strings that do not use the scheme at all; a
/// string that uses the scheme but is missing the name or the key is an
/// error. Extra path segments after the key are ignored.
pub fn parse_secret_reference(value: &str) -> Result<Option<SecretReference>> {
    let trimmed = value
        .strip_prefix("${")
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value);

    let Some(rest) = trimmed.strip_prefix(SECRET_SCHEME) else {
        return Ok(None);
    };

    let (name, path) = rest.split_once('/').unwrap_or((rest, ""));
    let key = path.split('/').next().unwrap_or_default();
    if name.is_empty() || key.is_empty() {
        return Err(Error::validation(
            "secretref",
            format!("malformed secret reference `{value}`: expected secret://name/key"),
        ));
    }

    Ok(Some(SecretReference {
        name: name.to_string(),
        key: key.to_string(),
    }))
}

/// One step of the env value resolution chain.
pub trait EnvParser {
    /// Whether this parser handles the value.
    fn matches(&self, value: &str) -> bool;
    /// Turn the key/value pair into an env var. Only called after
    /// [`EnvParser::matches`] returned true.
    fn generate(&self, key: &str, value: &str) -> Result<EnvVar>;
}

/// Resolves `secret://name/key` values to secret-key-ref env vars.
pub struct SecretEnvParser;

impl EnvParser for SecretEnvParser {
    fn matches(&self, value: &str) -> bool {
        matches!(parse_secret_reference(value), Ok(Some(_)) | Err(_))
    }

    fn generate(&self, key: &str, value: &str) -> Result<EnvVar> {
        let reference = parse_secret_reference(value)?.ok_or_else(|| {
            Error::validation("secretref", format!("`{value}` is not a secret reference"))
        })?;
        Ok(EnvVar::from_secret(key, reference.name, reference.key))
    }
}

/// Passes the value through as a literal. Matches everything, so it must
/// stay at the end of the chain.
pub struct RawEnvParser;

impl EnvParser for RawEnvParser {
    fn matches(&self, _value: &str) -> bool {
        true
    }

    fn generate(&self, key: &str, value: &str) -> Result<EnvVar> {
        Ok(EnvVar::literal(key, value))
    }
}

/// Ordered chain of env parsers.
pub struct EnvParserChain {
    parsers: Vec<Box<dyn EnvParser>>,
}

impl EnvParserChain {
    /// The standard chain: secret references first, raw literals last.
    pub fn standard() -> Self {
        Self {
            parsers: vec![Box::new(SecretEnvParser), Box::new(RawEnvParser)],
        }
    }

    /// Insert a parser before the trailing raw parser.
    pub fn with_parser(mut self, parser: Box<dyn EnvParser>) -> Self {
        let at = self.parsers.len().saturating_sub(1);
        self.parsers.insert(at, parser);
        self
    }

    /// Resolve one env entry through the chain.
    pub fn resolve(&self, key: &str, value: &str) -> Result<EnvVar> {
        for parser in &self.parsers {
            if parser.matches(value) {
                return parser.generate(key, value);
            }
        }
        // Unreachable with the raw parser in place, but the chain is
        // caller-extensible so keep a hard error rather than a panic.
        Err(Error::validation(
            "secretref",
            format!("no parser matched env value for `{key}`"),
        ))
    }
}

impl Default for EnvParserChain {
    fn default() -> Self {
        Self::standard()
    }
}
