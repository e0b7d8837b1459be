use auriga::endpoints::{EndpointRegistry, substitute_uri};
use auriga::error::AurigaError;
use std::collections::HashMap;
use tempfile::TempDir;

#[test]
fn embedded_registry_covers_the_core_operations() {
    let registry = EndpointRegistry::embedded();
    for name in [
        "VEHICLE_LIST",
        "VEHICLE_SUMMARY",
        "VEHICLE_DATA",
        "WAKE_UP",
        "PRODUCT_LIST",
        "BATTERY_DATA",
        "SITE_DATA",
        "SITE_CONFIG",
        "BACKUP_RESERVE",
        "OPERATION_MODE",
    ] {
        assert!(registry.contains(name), "missing endpoint {}", name);
    }
}

#[test]
fn every_embedded_uri_resolves_with_the_known_variables() {
    let registry = EndpointRegistry::embedded();
    let mut vars = HashMap::new();
    vars.insert("vehicle_id".to_string(), "1".to_string());
    vars.insert("site_id".to_string(), "2".to_string());
    vars.insert("battery_id".to_string(), "3".to_string());

    for name in registry.names() {
        let spec = registry.get(name).unwrap();
        let uri = substitute_uri(&spec.uri, &vars).unwrap();
        assert!(!uri.contains('{'), "unresolved variable in {}: {}", name, uri);
    }
}

#[test]
fn unknown_operation_names_are_rejected() {
    let err = EndpointRegistry::embedded().get("FLY_TO_MARS").unwrap_err();
    assert!(matches!(err, AurigaError::UnknownEndpoint { ref name } if name == "FLY_TO_MARS"));
}

#[test]
fn registry_overrides_load_from_a_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("endpoints.json");
    std::fs::write(
        &path,
        r#"{
            "PING": {"TYPE": "GET", "URI": "api/1/ping", "AUTH": false},
            "POKE": {"TYPE": "POST", "URI": "api/1/poke/{vehicle_id}", "AUTH": true}
        }"#,
    )
    .unwrap();

    let registry = EndpointRegistry::from_file(&path).unwrap();
    assert_eq!(registry.len(), 2);

    let poke = registry.get("POKE").unwrap();
    assert_eq!(poke.method, "POST");
    assert!(poke.auth);
    assert!(!registry.get("PING").unwrap().auth);
}

#[test]
fn substitution_reports_the_missing_variable() {
    let vars = HashMap::new();
    let err = substitute_uri("api/1/vehicles/{vehicle_id}/wake_up", &vars).unwrap_err();
    assert!(err.to_string().contains("vehicle_id"));
}
