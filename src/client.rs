//! Owner API client
//!
//! Composes the authenticated session with the endpoint registry: a call
//! is resolved by name, path variables are substituted, the request is
//! performed through the session choke point, and the `{"response": ...}`
//! envelope is unwrapped. Entity proxies talk to the client through the
//! [`ApiDispatch`] trait so protocol logic can be tested against a stub
//! dispatcher.

use crate::auth::AuthSession;
use crate::endpoints::{EndpointRegistry, substitute_uri};
use crate::energy::{Battery, SolarPanel};
use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use crate::vehicle::Vehicle;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Named-endpoint dispatch seam between entity proxies and the transport
#[async_trait::async_trait]
pub trait ApiDispatch: Send + Sync {
    /// Perform the named API call and return the unwrapped response payload
    async fn api(
        &self,
        name: &str,
        path_vars: &HashMap<String, String>,
        params: Option<Value>,
    ) -> Result<Value>;

    /// Current bearer token, for interfaces that authenticate out of band
    /// (the streaming push channel)
    async fn access_token(&self) -> Result<String>;
}

/// API client bound to one account session
pub struct ApiClient {
    session: AuthSession,
    registry: EndpointRegistry,
    logger: crate::logging::StructuredLogger,
}

impl ApiClient {
    /// Create a client over a session using the embedded endpoint registry
    pub fn new(session: AuthSession) -> Self {
        Self::with_registry(session, EndpointRegistry::embedded().clone())
    }

    /// Create a client with an externally loaded endpoint registry
    pub fn with_registry(session: AuthSession, registry: EndpointRegistry) -> Self {
        let logger = get_logger("client");
        Self {
            session,
            registry,
            logger,
        }
    }

    /// The underlying session
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Returns a list of vehicle proxies
    pub async fn vehicle_list(self: &Arc<Self>) -> Result<Vec<Vehicle>> {
        let response = self.api("VEHICLE_LIST", &HashMap::new(), None).await?;
        let vehicles = response
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|v| Vehicle::new(self.clone() as Arc<dyn ApiDispatch>, v))
            .collect();
        Ok(vehicles)
    }

    /// Returns the raw product list (vehicles and energy sites)
    pub async fn product_list(self: &Arc<Self>) -> Result<Vec<Value>> {
        let response = self.api("PRODUCT_LIST", &HashMap::new(), None).await?;
        Ok(response.as_array().cloned().unwrap_or_default())
    }

    /// Returns a list of battery proxies from the product list
    pub async fn battery_list(self: &Arc<Self>) -> Result<Vec<Battery>> {
        let products = self.product_list().await?;
        Ok(products
            .into_iter()
            .filter(|p| product_resource_type(p) == Some("battery"))
            .map(|p| Battery::new(self.clone() as Arc<dyn ApiDispatch>, p))
            .collect())
    }

    /// Returns a list of solar panel proxies from the product list
    pub async fn solar_list(self: &Arc<Self>) -> Result<Vec<SolarPanel>> {
        let products = self.product_list().await?;
        Ok(products
            .into_iter()
            .filter(|p| product_resource_type(p) == Some("solar"))
            .map(|p| SolarPanel::new(self.clone() as Arc<dyn ApiDispatch>, p))
            .collect())
    }
}

#[async_trait::async_trait]
impl ApiDispatch for ApiClient {
    async fn api(
        &self,
        name: &str,
        path_vars: &HashMap<String, String>,
        params: Option<Value>,
    ) -> Result<Value> {
        let spec = self.registry.get(name)?;
        let uri = substitute_uri(&spec.uri, path_vars)?;
        let method = Method::from_bytes(spec.method.as_bytes())
            .map_err(|_| AurigaError::config(format!("Invalid method for {}", name)))?;

        if spec.auth {
            self.session.ensure_authorized().await?;
        }

        self.logger.debug(&format!("{} {} {}", name, spec.method, uri));

        // GET parameters travel as the query string, anything else as a
        // JSON body
        let response = if method == Method::GET {
            let query = params.as_ref().map(query_pairs);
            self.session
                .request(method, &uri, query.as_deref(), None)
                .await?
        } else {
            self.session
                .request(method, &uri, None, params.as_ref())
                .await?
        };

        Ok(unwrap_envelope(response))
    }

    async fn access_token(&self) -> Result<String> {
        self.session.access_token().await
    }
}

// The provider wraps every payload in {"response": ...}; payloads without
// the envelope are returned verbatim
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("response") => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn product_resource_type(product: &Value) -> Option<&str> {
    product.get("resource_type").and_then(Value::as_str)
}

fn query_pairs(params: &Value) -> Vec<(String, String)> {
    match params {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let value = match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_unwrapping() {
        let wrapped = json!({"response": {"result": true, "reason": ""}});
        assert_eq!(unwrap_envelope(wrapped), json!({"result": true, "reason": ""}));

        let bare = json!({"result": true});
        assert_eq!(unwrap_envelope(bare.clone()), bare);

        let null_payload = json!({"response": null, "count": 0});
        assert_eq!(unwrap_envelope(null_payload), Value::Null);
    }

    #[test]
    fn query_pair_building() {
        let pairs = query_pairs(&json!({"endpoints": "location_data", "limit": 5}));
        assert!(pairs.contains(&("endpoints".to_string(), "location_data".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn resource_type_partitioning() {
        let battery = json!({"resource_type": "battery", "energy_site_id": 1});
        let solar = json!({"resource_type": "solar", "energy_site_id": 2});
        let car = json!({"vin": "5YJ3E1EA8JF000001"});
        assert_eq!(product_resource_type(&battery), Some("battery"));
        assert_eq!(product_resource_type(&solar), Some("solar"));
        assert_eq!(product_resource_type(&car), None);
    }
}
