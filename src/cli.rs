//! Command-line front-end
//!
//! A thin driver over the API client and entity proxies: flags select the
//! account identity, an endpoint or command name with key=value
//! parameters, a filter expression, and the actions to run against each
//! selected vehicle. All rendering happens here; errors from the client
//! propagate to the caller untouched.

use crate::auth::{AuthSession, UrlAuthenticator};
use crate::client::ApiClient;
use crate::config::Config;
use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use crate::stream::WebSocketConnector;
use crate::vehicle::Vehicle;
use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Tesla Owner API command-line interface
#[derive(Debug, Parser)]
#[command(name = "auriga", about = "Tesla Owner API CLI", version)]
pub struct Cli {
    /// Login email
    #[arg(short = 'e', long)]
    pub email: String,

    /// Filter vehicles on any value (id, vin, display name, ...)
    #[arg(short = 'f', long)]
    pub filter: Option<String>,

    /// API call endpoint name
    #[arg(short = 'a', long)]
    pub api: Option<String>,

    /// API parameter as key=value (repeatable)
    #[arg(short = 'k', long = "keyvalue")]
    pub keyvalues: Vec<String>,

    /// Vehicle command endpoint name
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// List all selected vehicles
    #[arg(short = 'l', long)]
    pub list: bool,

    /// List vehicle option codes
    #[arg(short = 'o', long)]
    pub option: bool,

    /// Decode the vehicle identification number
    #[arg(short = 'v', long)]
    pub vin: bool,

    /// Wake up selected vehicle(s)
    #[arg(short = 'w', long)]
    pub wake: bool,

    /// Get rollup of all vehicle data
    #[arg(short = 'g', long)]
    pub get: bool,

    /// List nearby charging sites
    #[arg(short = 'n', long)]
    pub nearby: bool,

    /// Get mobile enabled state
    #[arg(short = 'm', long)]
    pub mobile: bool,

    /// Remote start drive
    #[arg(short = 's', long)]
    pub start: bool,

    /// Stream telemetry updates
    #[arg(long)]
    pub stream: bool,

    /// Set logging level to debug
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Path to a configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Completes the login by asking the operator to open the authorization
/// URL in a browser and paste the redirected callback URL back
pub struct ConsoleAuthenticator;

#[async_trait::async_trait]
impl UrlAuthenticator for ConsoleAuthenticator {
    async fn authenticate(&self, authorization_url: &Url) -> Result<String> {
        eprintln!("Open this URL to sign in:\n{}", authorization_url);
        eprintln!("After login, paste the redirected URL here:");

        let mut line = String::new();
        let read = tokio::task::spawn_blocking(move || {
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| AurigaError::auth(format!("Prompt aborted: {}", e)))?;
        let line = read?;
        if line.trim().is_empty() {
            return Err(AurigaError::auth("No redirect URL supplied"));
        }
        Ok(line.trim().to_string())
    }
}

/// Parse repeated key=value flags into a JSON object
pub fn parse_keyvalues(pairs: &[String]) -> Result<Option<Value>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut map = Map::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            AurigaError::validation("keyvalue", format!("'{}' is not key=value", pair))
        })?;
        // Pass numbers and booleans through with their JSON types
        let value = match serde_json::from_str::<Value>(value) {
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
            _ => Value::String(value.to_string()),
        };
        map.insert(key.to_string(), value);
    }
    Ok(Some(Value::Object(map)))
}

/// Whether any cached top-level value of the vehicle matches the filter
pub fn matches_filter(vehicle: &Vehicle, filter: &str) -> bool {
    match vehicle.data().to_value() {
        Value::Object(map) => map.values().any(|v| match v {
            Value::String(s) => s == filter,
            other => other.to_string() == filter,
        }),
        _ => false,
    }
}

/// Run the CLI against the live API
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if cli.debug {
        config.logging.level = "DEBUG".to_string();
    }
    config.validate()?;
    crate::logging::init_logging(&config.logging)?;
    let logger = get_logger("cli");

    let session = AuthSession::new(
        &cli.email,
        config.auth.clone(),
        config.retry.clone(),
        &config.cache.file,
        Some(Box::new(ConsoleAuthenticator)),
    )?;
    let client = Arc::new(ApiClient::new(session));

    let params = parse_keyvalues(&cli.keyvalues)?;
    let vehicles = client.vehicle_list().await?;
    let total = vehicles.len();
    let mut selected: Vec<Vehicle> = vehicles
        .into_iter()
        .filter(|v| cli.filter.as_ref().is_none_or(|f| matches_filter(v, f)))
        .collect();
    logger.debug(&format!("{} vehicle(s), {} selected", total, selected.len()));

    for (index, vehicle) in selected.iter_mut().enumerate() {
        println!("Vehicle {}:", index);
        if cli.list {
            println!("{}", vehicle.data().to_pretty_string());
        }
        if cli.option {
            println!("{}", vehicle.option_code_list().join(", "));
        }
        if cli.vin {
            println!("{}", serde_json::to_string_pretty(&vehicle.decode_vin()?)?);
        }
        if cli.wake {
            vehicle.sync_wake_up_default(&config.wake).await?;
        }
        if cli.get {
            vehicle.get_vehicle_data().await?;
            println!("{}", vehicle.data().to_pretty_string());
        }
        if cli.nearby {
            let sites = vehicle.get_nearby_charging_sites().await?;
            println!("{}", serde_json::to_string_pretty(&sites)?);
        }
        if cli.mobile {
            println!("{}", vehicle.mobile_enabled().await?);
        }
        if cli.start {
            println!("{}", vehicle.remote_start_drive().await?);
        }
        if let Some(name) = &cli.command {
            let response = vehicle.command(name, params.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        if let Some(name) = &cli.api {
            let response = vehicle.api(name, params.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        if cli.stream {
            crate::stream::stream(vehicle, &config.streaming, &WebSocketConnector, |update| {
                println!("{}", update);
            })
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiDispatch;
    use serde_json::json;
    use std::collections::HashMap;

    struct NullDispatch;

    #[async_trait::async_trait]
    impl ApiDispatch for NullDispatch {
        async fn api(
            &self,
            _name: &str,
            _path_vars: &HashMap<String, String>,
            _params: Option<Value>,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn access_token(&self) -> Result<String> {
            Ok("token".to_string())
        }
    }

    #[test]
    fn keyvalue_parsing() {
        let params = parse_keyvalues(&["percent=90".to_string(), "on=true".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(params["percent"], 90);
        assert_eq!(params["on"], true);

        let params = parse_keyvalues(&["which_trunk=rear".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(params["which_trunk"], "rear");

        assert!(parse_keyvalues(&["broken".to_string()]).is_err());
        assert!(parse_keyvalues(&[]).unwrap().is_none());
    }

    #[test]
    fn filter_matches_any_value() {
        let vehicle = Vehicle::new(
            Arc::new(NullDispatch),
            json!({"vin": "5YJ3E1EA8JF000001", "display_name": "Nikola", "id": 42}),
        );
        assert!(matches_filter(&vehicle, "Nikola"));
        assert!(matches_filter(&vehicle, "5YJ3E1EA8JF000001"));
        assert!(matches_filter(&vehicle, "42"));
        assert!(!matches_filter(&vehicle, "other"));
    }
}
