//! Energy product entity proxies
//!
//! Batteries and solar panels share the vehicle proxy's shape minus the
//! wake/online distinction: energy products are always reachable.
//! Control calls follow the same command-result contract as vehicle
//! commands, surfacing a refused command's reason as a product error.

use crate::client::ApiDispatch;
use crate::entity::EntityData;
use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

fn site_path_vars(data: &EntityData) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    let site_id = data
        .get_i64("energy_site_id")
        .map(|id| id.to_string())
        .or_else(|| data.get_str("energy_site_id").map(str::to_string))
        .ok_or_else(|| AurigaError::product("Product has no energy_site_id"))?;
    vars.insert("site_id".to_string(), site_id);
    if let Some(battery_id) = data.get_str("id") {
        vars.insert("battery_id".to_string(), battery_id.to_string());
    }
    Ok(vars)
}

// Shared command-result interpretation for energy control calls
async fn site_command(
    api: &Arc<dyn ApiDispatch>,
    vars: &HashMap<String, String>,
    name: &str,
    params: Option<Value>,
) -> Result<Value> {
    let response = api.api(name, vars, params).await?;
    if response.get("result").and_then(Value::as_bool) == Some(false) {
        let reason = response
            .get("reason")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or("command rejected");
        return Err(AurigaError::product(reason));
    }
    Ok(response)
}

/// Powerwall battery proxy
pub struct Battery {
    api: Arc<dyn ApiDispatch>,
    data: EntityData,
    logger: crate::logging::StructuredLogger,
}

impl Battery {
    /// Wrap one battery entry of the product list response
    pub fn new(api: Arc<dyn ApiDispatch>, initial: Value) -> Self {
        let logger = get_logger("battery");
        Self {
            api,
            data: EntityData::new(initial),
            logger,
        }
    }

    /// Cached state of this battery
    pub fn data(&self) -> &EntityData {
        &self.data
    }

    /// Site name from the cached state
    pub fn site_name(&self) -> &str {
        self.data.get_str("site_name").unwrap_or("battery")
    }

    /// Refresh the cached battery state
    pub async fn get_battery_data(&mut self) -> Result<&EntityData> {
        let vars = site_path_vars(&self.data)?;
        let fresh = self.api.api("BATTERY_DATA", &vars, None).await?;
        self.data.merge(fresh);
        Ok(&self.data)
    }

    /// Set the operation mode (self_consumption, backup, autonomous)
    pub async fn set_operation(&self, mode: &str) -> Result<Value> {
        self.logger
            .debug(&format!("{}: operation mode {}", self.site_name(), mode));
        site_command(
            &self.api,
            &site_path_vars(&self.data)?,
            "OPERATION_MODE",
            Some(json!({"default_real_mode": mode})),
        )
        .await
    }

    /// Set the backup reserve percentage
    pub async fn set_backup_reserve_percent(&self, percent: u8) -> Result<Value> {
        site_command(
            &self.api,
            &site_path_vars(&self.data)?,
            "BACKUP_RESERVE",
            Some(json!({"backup_reserve_percent": percent})),
        )
        .await
    }

    /// Configure grid charging and battery export behavior
    pub async fn set_import_export(
        &self,
        allow_grid_charging: bool,
        allow_battery_export: bool,
    ) -> Result<Value> {
        site_command(
            &self.api,
            &site_path_vars(&self.data)?,
            "GRID_IMPORT_EXPORT",
            Some(json!({
                "disallow_charge_from_grid_with_solar_installed": !allow_grid_charging,
                "customer_preferred_export_rule":
                    if allow_battery_export { "battery_ok" } else { "pv_only" },
            })),
        )
        .await
    }

    /// Upload a time-of-use tariff plan
    pub async fn set_tariff(&self, tariff: Value) -> Result<Value> {
        site_command(
            &self.api,
            &site_path_vars(&self.data)?,
            "TIME_OF_USE_SETTINGS",
            Some(json!({"tou_settings": {"tariff_content_v2": tariff}})),
        )
        .await
    }
}

/// Solar installation proxy
pub struct SolarPanel {
    api: Arc<dyn ApiDispatch>,
    data: EntityData,
}

impl SolarPanel {
    /// Wrap one solar entry of the product list response
    pub fn new(api: Arc<dyn ApiDispatch>, initial: Value) -> Self {
        Self {
            api,
            data: EntityData::new(initial),
        }
    }

    /// Cached state of this installation
    pub fn data(&self) -> &EntityData {
        &self.data
    }

    /// Refresh the cached live site state
    pub async fn get_site_data(&mut self) -> Result<&EntityData> {
        let vars = site_path_vars(&self.data)?;
        let fresh = self.api.api("SITE_DATA", &vars, None).await?;
        self.data.merge(fresh);
        Ok(&self.data)
    }

    /// Fetch the site configuration
    pub async fn get_site_config(&mut self) -> Result<&EntityData> {
        let vars = site_path_vars(&self.data)?;
        let fresh = self.api.api("SITE_CONFIG", &vars, None).await?;
        self.data.merge(fresh);
        Ok(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn site_path_vars_require_site_id() {
        let data = EntityData::new(json!({"energy_site_id": 12345, "id": "STE2010-12345"}));
        let vars = site_path_vars(&data).unwrap();
        assert_eq!(vars.get("site_id").map(String::as_str), Some("12345"));
        assert_eq!(
            vars.get("battery_id").map(String::as_str),
            Some("STE2010-12345")
        );

        let missing = EntityData::new(json!({"id": "x"}));
        assert!(site_path_vars(&missing).is_err());
    }
}
