use auriga::client::ApiDispatch;
use auriga::energy::{Battery, SolarPanel};
use auriga::error::{AurigaError, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Records every call and answers with a fixed response
struct RecordingDispatch {
    response: Value,
    calls: Mutex<Vec<(String, HashMap<String, String>, Option<Value>)>>,
}

impl RecordingDispatch {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn last_call(&self) -> (String, HashMap<String, String>, Option<Value>) {
        self.calls.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl ApiDispatch for RecordingDispatch {
    async fn api(
        &self,
        name: &str,
        path_vars: &HashMap<String, String>,
        params: Option<Value>,
    ) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), path_vars.clone(), params));
        Ok(self.response.clone())
    }

    async fn access_token(&self) -> Result<String> {
        Ok("test-token".to_string())
    }
}

fn battery_data() -> Value {
    json!({
        "energy_site_id": 12345,
        "id": "STE2010-12345",
        "site_name": "Home",
        "resource_type": "battery"
    })
}

#[tokio::test]
async fn backup_reserve_targets_the_site_and_battery() {
    let dispatch = RecordingDispatch::new(json!({"result": true}));
    let battery = Battery::new(dispatch.clone(), battery_data());

    battery.set_backup_reserve_percent(30).await.unwrap();

    let (name, vars, params) = dispatch.last_call();
    assert_eq!(name, "BACKUP_RESERVE");
    assert_eq!(vars.get("site_id").map(String::as_str), Some("12345"));
    assert_eq!(
        vars.get("battery_id").map(String::as_str),
        Some("STE2010-12345")
    );
    assert_eq!(params, Some(json!({"backup_reserve_percent": 30})));
}

#[tokio::test]
async fn refused_site_command_carries_the_reason() {
    let dispatch = RecordingDispatch::new(json!({"result": false, "reason": "invalid_value"}));
    let battery = Battery::new(dispatch, battery_data());

    let err = battery.set_operation("autonomous").await.unwrap_err();
    assert!(matches!(
        err,
        AurigaError::Product { ref reason } if reason == "invalid_value"
    ));
}

#[tokio::test]
async fn site_command_without_result_field_is_accepted() {
    // Some site endpoints answer with plain data instead of the
    // command-result envelope
    let dispatch = RecordingDispatch::new(json!({"code": 201, "message": "Updated"}));
    let battery = Battery::new(dispatch, battery_data());

    let response = battery.set_operation("backup").await.unwrap();
    assert_eq!(response["code"], 201);
}

#[tokio::test]
async fn import_export_flags_translate_to_provider_fields() {
    let dispatch = RecordingDispatch::new(json!({"result": true}));
    let battery = Battery::new(dispatch.clone(), battery_data());

    battery.set_import_export(true, false).await.unwrap();

    let (_, _, params) = dispatch.last_call();
    assert_eq!(
        params,
        Some(json!({
            "disallow_charge_from_grid_with_solar_installed": false,
            "customer_preferred_export_rule": "pv_only"
        }))
    );
}

#[tokio::test]
async fn battery_refresh_merges_live_data() {
    let dispatch = RecordingDispatch::new(json!({"energy_left": 11000.5, "backup": {"events": []}}));
    let mut battery = Battery::new(dispatch.clone(), battery_data());

    battery.get_battery_data().await.unwrap();

    let (name, _, _) = dispatch.last_call();
    assert_eq!(name, "BATTERY_DATA");
    assert_eq!(battery.data().get("energy_left"), Some(&json!(11000.5)));
    assert_eq!(battery.site_name(), "Home");
}

#[tokio::test]
async fn solar_products_query_live_and_config_endpoints() {
    let dispatch = RecordingDispatch::new(json!({"solar_power": 7720.0}));
    let mut solar = SolarPanel::new(
        dispatch.clone(),
        json!({"energy_site_id": 98765, "resource_type": "solar"}),
    );

    solar.get_site_data().await.unwrap();
    assert_eq!(dispatch.last_call().0, "SITE_DATA");

    solar.get_site_config().await.unwrap();
    let (name, vars, _) = dispatch.last_call();
    assert_eq!(name, "SITE_CONFIG");
    assert_eq!(vars.get("site_id").map(String::as_str), Some("98765"));
}
