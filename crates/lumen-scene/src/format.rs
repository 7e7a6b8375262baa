//! Scene file format definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root structure of a scene TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFile {
    pub scene: SceneMetadata,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Definition of an entity in a scene file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Every other table is a component
    #[serde(flatten)]
    pub components: BTreeMap<String, toml::Value>,
}

impl EntityDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, data: toml::Value) -> Self {
        self.components.insert(name.into(), data);
        self
    }
}

impl SceneFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scene: SceneMetadata {
                name: name.into(),
                version: default_version(),
                description: None,
            },
            entities: BTreeMap::new(),
        }
    }

    pub fn add_entity(&mut self, name: impl Into<String>, entity: EntityDef) {
        self.entities.insert(name.into(), entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_file_serialization() {
        let mut scene = SceneFile::new("Atrium");
        scene.add_entity(
            "probe_atrium",
            EntityDef::new().with_component(
                "environment_probe",
                toml::toml! { resolution = 128 }.into(),
            ),
        );

        let toml_str = toml::to_string_pretty(&scene).unwrap();
        assert!(toml_str.contains("Atrium"));
        assert!(toml_str.contains("probe_atrium"));
        assert!(toml_str.contains("resolution = 128"));
    }

    #[test]
    fn test_scene_file_deserialization() {
        let toml_str = r#"
[scene]
name = "Atrium"

[entities.probe_atrium.environment_probe]
resolution = 256
hdr = true
"#;

        let scene: SceneFile = toml::from_str(toml_str).unwrap();
        assert_eq!(scene.scene.version, "1.0");
        let probe = &scene.entities["probe_atrium"];
        assert!(probe.parent.is_none());
        assert!(probe.components.contains_key("environment_probe"));
    }
}
