//! Entity state storage
//!
//! Entity proxies (vehicles, batteries, solar panels) cache the last
//! server-side state of one physical product as a JSON object map. The
//! map is a composition detail: only the intentionally designed
//! operations are exposed, not the full interface of the underlying
//! type. Data refreshes merge into the map in place; keys absent from a
//! fresh payload are preserved.

use serde_json::{Map, Value};

/// Key-value state of one product
#[derive(Debug, Clone, Default)]
pub struct EntityData {
    data: Map<String, Value>,
}

impl EntityData {
    /// Wrap an initial JSON object; non-objects yield an empty map
    pub fn new(initial: Value) -> Self {
        let data = match initial {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { data }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a string value by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Get an integer value by key
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    /// Look up a nested value by dotted path (e.g. "gui_settings.gui_distance_units")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current: Option<&Value> = None;
        for part in path.split('.') {
            current = match current {
                None => self.data.get(part),
                Some(value) => value.get(part),
            };
            current?;
        }
        current
    }

    /// Set a single key
    pub fn insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Merge a fresh payload into the stored state. Objects are merged
    /// recursively, anything else overwrites; keys not present in the
    /// fresh payload are left intact.
    pub fn merge(&mut self, fresh: Value) {
        if let Value::Object(fresh_map) = fresh {
            merge_into(&mut self.data, fresh_map);
        }
    }

    /// Whether any state is cached
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of the stored state as a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Pretty-printed JSON of the stored state
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| "{}".to_string())
    }
}

fn merge_into(dest: &mut Map<String, Value>, fresh: Map<String, Value>) {
    for (key, value) in fresh {
        match (dest.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                dest.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_preserves_missing_keys() {
        let mut entity = EntityData::new(json!({"id": 1, "state": "asleep"}));
        entity.merge(json!({"state": "online"}));

        assert_eq!(entity.get_i64("id"), Some(1));
        assert_eq!(entity.get_str("state"), Some("online"));
    }

    #[test]
    fn merge_is_recursive_for_objects() {
        let mut entity = EntityData::new(json!({
            "charge_state": {"battery_level": 80, "charging_state": "Stopped"}
        }));
        entity.merge(json!({"charge_state": {"battery_level": 81}}));

        assert_eq!(
            entity.get_path("charge_state.battery_level"),
            Some(&json!(81))
        );
        assert_eq!(
            entity.get_path("charge_state.charging_state"),
            Some(&json!("Stopped"))
        );
    }

    #[test]
    fn merge_overwrites_non_objects() {
        let mut entity = EntityData::new(json!({"tokens": ["a", "b"]}));
        entity.merge(json!({"tokens": ["c"]}));
        assert_eq!(entity.get("tokens"), Some(&json!(["c"])));
    }

    #[test]
    fn get_path_walks_nested_objects() {
        let entity = EntityData::new(json!({
            "gui_settings": {"gui_distance_units": "km/hr"}
        }));
        assert_eq!(
            entity
                .get_path("gui_settings.gui_distance_units")
                .and_then(Value::as_str),
            Some("km/hr")
        );
        assert!(entity.get_path("gui_settings.missing").is_none());
    }
}
