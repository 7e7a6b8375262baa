//! Scene loading from TOML files

use crate::format::SceneFile;
use lumen_core::{LumenError, Result};
use lumen_ecs::LumenWorld;
use std::fs;
use std::path::Path;

/// Load a scene from a TOML file
pub fn load_scene<P: AsRef<Path>>(path: P) -> Result<(LumenWorld, SceneFile)> {
    let content = fs::read_to_string(path)?;
    load_scene_string(&content)
}

/// Load a scene from a TOML string
pub fn load_scene_string(content: &str) -> Result<(LumenWorld, SceneFile)> {
    let scene_file: SceneFile = toml::from_str(content)?;
    let mut world = LumenWorld::new();

    // First pass: create all entities so parents can be referenced in any order
    for name in scene_file.entities.keys() {
        world.spawn(name.clone())?;
    }

    // Second pass: components and relationships
    for (name, entity_def) in &scene_file.entities {
        let id = world
            .get_id(name)
            .ok_or_else(|| LumenError::SceneError(format!("entity '{}' vanished", name)))?;

        for (comp_name, comp_data) in &entity_def.components {
            if !comp_data.is_table() {
                return Err(LumenError::SceneError(format!(
                    "component '{}' on '{}' must be a table",
                    comp_name, name
                )));
            }
            world.set_component(id, comp_name, comp_data.clone())?;
        }

        if let Some(parent_name) = &entity_def.parent {
            world.set_parent_by_name(name, parent_name)?;
        }
    }

    Ok((world, scene_file))
}
