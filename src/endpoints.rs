//! Named-endpoint registry
//!
//! Endpoint metadata is read-only static configuration: a mapping from a
//! symbolic name to an HTTP method, a URI template with `{}`-style path
//! variables, and an auth flag. Adding or changing an endpoint is a
//! configuration change, not a code change. The default table ships
//! embedded in the binary; an external JSON file with the same shape can
//! replace it.

use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

static EMBEDDED: OnceCell<EndpointRegistry> = OnceCell::new();

/// One endpoint definition from the registry file
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSpec {
    /// HTTP method
    #[serde(rename = "TYPE")]
    pub method: String,

    /// URI template relative to the API base, may contain path variables
    #[serde(rename = "URI")]
    pub uri: String,

    /// Whether the endpoint requires a bearer token
    #[serde(rename = "AUTH")]
    pub auth: bool,
}

/// Immutable name-to-endpoint mapping loaded once at startup
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, EndpointSpec>,
}

impl EndpointRegistry {
    /// Registry built from the endpoint table embedded in the binary
    pub fn embedded() -> &'static Self {
        EMBEDDED.get_or_init(|| {
            let logger = get_logger("endpoints");
            // The embedded table is validated by tests, a parse failure here
            // would be a packaging defect
            let endpoints: HashMap<String, EndpointSpec> =
                serde_json::from_str(include_str!("endpoints.json")).unwrap_or_default();
            logger.debug(&format!("{} endpoints loaded", endpoints.len()));
            Self { endpoints }
        })
    }

    /// Load a registry from an external JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let endpoints: HashMap<String, EndpointSpec> = serde_json::from_str(&contents)?;
        Ok(Self { endpoints })
    }

    /// Look up an endpoint by name
    pub fn get(&self, name: &str) -> Result<&EndpointSpec> {
        self.endpoints
            .get(name)
            .ok_or_else(|| AurigaError::unknown_endpoint(name))
    }

    /// Whether an endpoint name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    /// Number of registered endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterate over registered endpoint names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

/// Substitute `{name}` path variables in a URI template.
/// Every placeholder must be resolved; a missing variable is a validation
/// error naming the variable.
pub fn substitute_uri(template: &str, path_vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            AurigaError::validation("uri", "Unbalanced '{' in URI template")
        })?;
        let var = &after[..close];
        let value = path_vars.get(var).ok_or_else(|| {
            AurigaError::validation("path_vars", format!("Missing path variable '{}'", var))
        })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
