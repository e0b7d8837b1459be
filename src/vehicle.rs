//! Vehicle entity proxy
//!
//! A [`Vehicle`] represents the last known server-side state of one car
//! and adds behavior on top of it: the wake-up poll loop, command-result
//! interpretation, offline option-code and VIN decoding, and unit
//! conversion helpers driven by the car's GUI settings.

use crate::client::ApiDispatch;
use crate::config::WakeConfig;
use crate::entity::EntityData;
use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use chrono::{Local, TimeZone, Utc};
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MILES_TO_KM: f64 = 1.609344;

static OPTION_CODES: OnceCell<HashMap<String, String>> = OnceCell::new();

fn option_codes() -> &'static HashMap<String, String> {
    OPTION_CODES.get_or_init(|| {
        serde_json::from_str(include_str!("option_codes.json")).unwrap_or_default()
    })
}

/// Wake-up protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    /// No wake attempt issued yet
    Unknown,
    /// Wake command sent, polling for the car to come online
    Waking,
    /// Car reported online
    Online,
    /// Deadline passed without the car coming online
    TimedOut,
}

/// Vehicle proxy holding cached state and a handle to the API client
pub struct Vehicle {
    api: Arc<dyn ApiDispatch>,
    data: EntityData,
    logger: crate::logging::StructuredLogger,
}

impl Vehicle {
    /// Wrap one entry of the vehicle list response
    pub fn new(api: Arc<dyn ApiDispatch>, initial: Value) -> Self {
        let logger = get_logger("vehicle");
        Self {
            api,
            data: EntityData::new(initial),
            logger,
        }
    }

    /// Cached state of this vehicle
    pub fn data(&self) -> &EntityData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut EntityData {
        &mut self.data
    }

    pub(crate) fn dispatch(&self) -> &Arc<dyn ApiDispatch> {
        &self.api
    }

    /// Display name from the cached state
    pub fn display_name(&self) -> &str {
        self.data.get_str("display_name").unwrap_or("vehicle")
    }

    /// Connectivity state from the cached state (online, asleep, offline)
    pub fn state(&self) -> &str {
        self.data.get_str("state").unwrap_or("unknown")
    }

    /// Vehicle identification number from the cached state
    pub fn vin(&self) -> Option<&str> {
        self.data.get_str("vin")
    }

    /// Identifier used for endpoint path substitution
    pub fn id(&self) -> Result<String> {
        if let Some(id) = self.data.get_str("id_s") {
            return Ok(id.to_string());
        }
        self.data
            .get_i64("id")
            .map(|id| id.to_string())
            .ok_or_else(|| AurigaError::vehicle("Vehicle has no id"))
    }

    fn path_vars(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([("vehicle_id".to_string(), self.id()?)]))
    }

    /// Endpoint request with the vehicle id substituted
    pub async fn api(&self, name: &str, params: Option<Value>) -> Result<Value> {
        self.api.api(name, &self.path_vars()?, params).await
    }

    /// Determine the state of the vehicle's sub-systems. Always available,
    /// even when the car is asleep or offline; never triggers a wake-up.
    pub async fn get_vehicle_summary(&mut self) -> Result<&EntityData> {
        let fresh = self.api("VEHICLE_SUMMARY", None).await?;
        self.data.merge(fresh);
        Ok(&self.data)
    }

    /// Wake the car if needed and wait for it to come online. Issues the
    /// wake command once, then polls the summary endpoint sleeping
    /// `interval` between polls (multiplied by `backoff` each round)
    /// against a monotonic deadline.
    pub async fn sync_wake_up(
        &mut self,
        timeout: Duration,
        interval: Duration,
        backoff: f64,
    ) -> Result<()> {
        self.logger
            .debug(&format!("{} is {}", self.display_name(), self.state()));
        if self.state() == "online" {
            return Ok(());
        }

        let woken = self.api("WAKE_UP", None).await?;
        self.data.merge(woken);
        let mut wake_state = WakeState::Waking;

        let deadline = Instant::now() + timeout;
        let mut interval = interval;
        while wake_state == WakeState::Waking {
            self.logger
                .trace(&format!("Waiting {:.1}s for wake-up", interval.as_secs_f64()));
            tokio::time::sleep(interval).await;
            self.get_vehicle_summary().await?;
            if self.state() == "online" {
                wake_state = WakeState::Online;
            } else if Instant::now() >= deadline {
                wake_state = WakeState::TimedOut;
            }
            interval = interval.mul_f64(backoff);
        }

        match wake_state {
            WakeState::Online => {
                self.logger
                    .debug(&format!("{} is {}", self.display_name(), self.state()));
                Ok(())
            }
            _ => Err(AurigaError::vehicle(format!(
                "{} not woken up within {}s",
                self.display_name(),
                timeout.as_secs()
            ))),
        }
    }

    /// Wake-up with the configured defaults
    pub async fn sync_wake_up_default(&mut self, config: &WakeConfig) -> Result<()> {
        self.sync_wake_up(
            Duration::from_secs(config.timeout_seconds),
            Duration::from_secs_f64(config.poll_interval_seconds),
            config.backoff_factor,
        )
        .await
    }

    /// A rollup of all the data request endpoints plus vehicle config.
    /// Requires the car to be online.
    pub async fn get_vehicle_data(&mut self) -> Result<&EntityData> {
        let fresh = self.api("VEHICLE_DATA", None).await?;
        self.data.merge(fresh);
        Ok(&self.data)
    }

    /// Location-scoped rollup; merges the fresh payload and returns the
    /// drive state sub-payload
    pub async fn get_vehicle_location_data(&mut self) -> Result<Value> {
        let fresh = self
            .api(
                "VEHICLE_DATA",
                Some(json!({"endpoints": "location_data;drive_state"})),
            )
            .await?;
        self.data.merge(fresh);
        Ok(self.data.get("drive_state").cloned().unwrap_or(Value::Null))
    }

    /// Command endpoint wrapper interpreting the uniform command-result
    /// envelope: a refused command surfaces its reason as a vehicle error,
    /// a successful one returns the raw response for inspection.
    pub async fn command(&self, name: &str, params: Option<Value>) -> Result<Value> {
        let response = self.api(name, params).await?;
        let result = response
            .get("result")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !result {
            let reason = response
                .get("reason")
                .and_then(Value::as_str)
                .filter(|r| !r.is_empty())
                .unwrap_or("command rejected");
            return Err(AurigaError::vehicle(reason));
        }
        Ok(response)
    }

    /// Lists nearby provider-operated charging stations
    pub async fn get_nearby_charging_sites(&self) -> Result<Value> {
        self.api("NEARBY_CHARGING_SITES", None).await
    }

    /// Checks if the Mobile Access setting is enabled in the car
    pub async fn mobile_enabled(&self) -> Result<bool> {
        let response = self.api("MOBILE_ENABLED", None).await?;
        Ok(response.as_bool().unwrap_or(false))
    }

    /// Enables keyless driving for two minutes
    pub async fn remote_start_drive(&self) -> Result<Value> {
        self.command("REMOTE_START", None).await
    }

    /// Decode one option code against the embedded table; offline lookup
    pub fn decode_option(code: &str) -> Option<&'static str> {
        option_codes().get(code).map(String::as_str)
    }

    /// Returns the known option code titles of this vehicle
    pub fn option_code_list(&self) -> Vec<&'static str> {
        self.data
            .get_str("option_codes")
            .unwrap_or("")
            .split(',')
            .filter_map(Self::decode_option)
            .collect()
    }

    /// Decode the cached VIN into its factory fields
    pub fn decode_vin(&self) -> Result<Value> {
        let vin: Vec<char> = self
            .vin()
            .ok_or_else(|| AurigaError::vehicle("No VIN cached"))?
            .chars()
            .collect();
        if vin.len() != 17 {
            return Err(AurigaError::validation("vin", "VIN must be 17 characters"));
        }

        let make = format!("Model {}", vin[3]);
        let body = match vin[4] {
            'A' => "Hatchback 5 Dr / LHD",
            'B' => "Hatchback 5 Dr / RHD",
            'C' => "MPV / 5 Dr / LHD",
            'D' => "MPV / 5 Dr / RHD",
            'E' => "Sedan 4 Dr / LHD",
            'F' => "Sedan 4 Dr / RHD",
            _ => "Unknown",
        };
        let battery = match vin[6] {
            'E' => "Electric",
            'H' => "High Capacity",
            'S' => "Standard Capacity",
            'V' => "Ultra Capacity",
            _ => "Unknown",
        };
        let drive_unit = match vin[7] {
            '1' | 'A' => "Single Motor",
            '2' | 'B' => "Dual Motor",
            '3' => "Performance Single Motor",
            '4' => "Performance Dual Motor",
            'C' => "Base, Tier 2",
            'G' => "Base, Tier 4",
            'N' => "Base, Tier 7",
            'P' => "Performance, Tier 7",
            _ => "Unknown",
        };
        let year = "9ABCDEFGHJKLMNPRSTVWXY12345678"
            .find(vin[9])
            .map(|i| 2009 + i)
            .ok_or_else(|| AurigaError::validation("vin", "Invalid model year character"))?;
        let plant = match vin[10] {
            'F' => "Fremont, CA, USA",
            'P' => "Palo Alto, CA, USA",
            _ => "Unknown",
        };

        Ok(json!({
            "manufacturer": "Tesla Motors, Inc.",
            "make": make,
            "body_type": body,
            "battery_type": battery,
            "drive_unit": drive_unit,
            "year": year.to_string(),
            "plant_code": plant,
        }))
    }

    /// Format a distance or speed in the car's GUI units. Pure function of
    /// the cached `gui_settings`; None when no settings are cached.
    pub fn dist_units(&self, miles: Option<f64>, speed: bool) -> Option<String> {
        let miles = miles?;
        let units = self
            .data
            .get_path("gui_settings.gui_distance_units")?
            .as_str()?;
        if units.contains("km") {
            Some(format!(
                "{:.1} {}",
                miles * MILES_TO_KM,
                if speed { "km/h" } else { "km" }
            ))
        } else {
            Some(format!("{:.1} {}", miles, if speed { "mph" } else { "mi" }))
        }
    }

    /// Format a temperature in the car's GUI units
    pub fn temp_units(&self, celsius: Option<f64>) -> Option<String> {
        let celsius = celsius?;
        let units = self
            .data
            .get_path("gui_settings.gui_temperature_units")?
            .as_str()?;
        if units.contains('F') {
            Some(format!("{:.1} F", celsius * 1.8 + 32.0))
        } else {
            Some(format!("{:.1} C", celsius))
        }
    }

    /// Format a millisecond timestamp as local time honoring the car's
    /// 12/24 hour GUI setting
    pub fn gui_time(&self, timestamp_ms: i64) -> Option<String> {
        let twenty_four = self
            .data
            .get_path("gui_settings.gui_24_hour_time")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let time = Local.timestamp_millis_opt(timestamp_ms).single()?;
        let format = if twenty_four { "%H:%M:%S" } else { "%I:%M:%S %p" };
        Some(time.format(format).to_string())
    }

    /// Humanized time since the car last pushed state
    pub fn last_seen(&self) -> Option<String> {
        let timestamp_ms = self
            .data
            .get_path("vehicle_state.timestamp")
            .and_then(Value::as_i64)?;
        let elapsed = Utc::now().timestamp() - timestamp_ms / 1000;
        Some(humanize_elapsed(elapsed))
    }
}

fn humanize_elapsed(seconds: i64) -> String {
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{} minute(s) ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hour(s) ago", seconds / 3600)
    } else {
        format!("{} day(s) ago", seconds / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn vehicle(initial: Value) -> Vehicle {
        Vehicle::new(Arc::new(NullDispatch), initial)
    }

    #[test]
    fn option_code_decoding_is_offline() {
        assert_eq!(Vehicle::decode_option("MDL3"), Some("Model 3"));
        assert_eq!(Vehicle::decode_option("ZZZZ"), None);

        let v = vehicle(json!({"option_codes": "MDL3,ZZZZ,DV2W"}));
        assert_eq!(v.option_code_list(), vec!["Model 3", "Rear-Wheel Drive"]);
    }

    #[test]
    fn vin_decoding() {
        let v = vehicle(json!({"vin": "5YJ3E1EA8JF000001"}));
        let decoded = v.decode_vin().unwrap();
        assert_eq!(decoded["make"], "Model 3");
        assert_eq!(decoded["body_type"], "Sedan 4 Dr / LHD");
        assert_eq!(decoded["year"], "2018");
        assert_eq!(decoded["plant_code"], "Fremont, CA, USA");

        let bad = vehicle(json!({"vin": "short"}));
        assert!(bad.decode_vin().is_err());
    }

    #[test]
    fn unit_helpers_follow_gui_settings() {
        let v = vehicle(json!({
            "gui_settings": {
                "gui_distance_units": "km/hr",
                "gui_temperature_units": "C"
            }
        }));
        assert_eq!(v.dist_units(Some(100.0), false), Some("160.9 km".to_string()));
        assert_eq!(v.dist_units(Some(60.0), true), Some("96.6 km/h".to_string()));
        assert_eq!(v.temp_units(Some(21.5)), Some("21.5 C".to_string()));

        let imperial = vehicle(json!({
            "gui_settings": {
                "gui_distance_units": "mi/hr",
                "gui_temperature_units": "F"
            }
        }));
        assert_eq!(
            imperial.dist_units(Some(100.0), false),
            Some("100.0 mi".to_string())
        );
        assert_eq!(imperial.temp_units(Some(20.0)), Some("68.0 F".to_string()));
    }

    #[test]
    fn unit_helpers_need_cached_settings() {
        let v = vehicle(json!({}));
        assert_eq!(v.dist_units(Some(10.0), false), None);
        assert_eq!(v.temp_units(Some(10.0)), None);
        assert_eq!(v.dist_units(None, false), None);
    }

    #[test]
    fn humanized_elapsed_buckets() {
        assert_eq!(humanize_elapsed(10), "just now");
        assert_eq!(humanize_elapsed(120), "2 minute(s) ago");
        assert_eq!(humanize_elapsed(7200), "2 hour(s) ago");
        assert_eq!(humanize_elapsed(200_000), "2 day(s) ago");
    }

    #[test]
    fn identity_prefers_string_id() {
        let v = vehicle(json!({"id": 7, "id_s": "70000000000000007"}));
        assert_eq!(v.id().unwrap(), "70000000000000007");

        let numeric = vehicle(json!({"id": 7}));
        assert_eq!(numeric.id().unwrap(), "7");

        let none = vehicle(json!({}));
        assert!(none.id().is_err());
    }
}
