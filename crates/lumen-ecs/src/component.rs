//! Dynamic component storage

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dynamic components stored as TOML values, keyed by component name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicComponents {
    #[serde(flatten)]
    pub data: HashMap<String, toml::Value>,
}

impl DynamicComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, component: &str) -> Option<&toml::Value> {
        self.data.get(component)
    }

    pub fn get_mut(&mut self, component: &str) -> Option<&mut toml::Value> {
        self.data.get_mut(component)
    }

    pub fn set(&mut self, component: impl Into<String>, data: toml::Value) {
        self.data.insert(component.into(), data);
    }

    pub fn remove(&mut self, component: &str) -> Option<toml::Value> {
        self.data.remove(component)
    }

    pub fn has(&self, component: &str) -> bool {
        self.data.contains_key(component)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.data.keys().map(|s| s.as_str()).collect()
    }

    /// Get a field value from a component
    pub fn get_field(&self, component: &str, field: &str) -> Option<&toml::Value> {
        self.data.get(component).and_then(|v| v.get(field))
    }

    /// Set a field value in a component, creating the component table if needed
    pub fn set_field(&mut self, component: &str, field: &str, value: toml::Value) {
        let comp = self
            .data
            .entry(component.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));

        if let Some(table) = comp.as_table_mut() {
            table.insert(field.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_field_creates_table() {
        let mut comps = DynamicComponents::new();
        comps.set_field("environment_probe", "importance", toml::Value::Integer(3));

        assert!(comps.has("environment_probe"));
        assert_eq!(
            comps
                .get_field("environment_probe", "importance")
                .and_then(|v| v.as_integer()),
            Some(3)
        );
    }

    #[test]
    fn test_remove() {
        let mut comps = DynamicComponents::new();
        comps.set("transform", toml::Value::Table(toml::map::Map::new()));
        assert!(comps.remove("transform").is_some());
        assert!(!comps.has("transform"));
        assert!(comps.component_names().is_empty());
    }
}
