//! LumenWorld - ECS world with stable IDs and dynamic components

use crate::component::DynamicComponents;
use crate::entity::EntityInfo;
use bimap::BiMap;
use lumen_core::{mat4_mul, EntityId, LumenError, Result, Transform, Vec3};
use std::collections::HashMap;

/// The main ECS world for Lumen
///
/// Wraps hecs::World with:
/// - Stable EntityId mapping
/// - Dynamic component storage
/// - Named entity lookup
pub struct LumenWorld {
    world: hecs::World,
    /// Bidirectional mapping: EntityId <-> hecs::Entity
    id_map: BiMap<EntityId, hecs::Entity>,
    name_map: HashMap<String, EntityId>,
    components: HashMap<EntityId, DynamicComponents>,
    /// child -> parent
    parents: HashMap<EntityId, EntityId>,
}

impl Default for LumenWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl LumenWorld {
    pub fn new() -> Self {
        Self {
            world: hecs::World::new(),
            id_map: BiMap::new(),
            name_map: HashMap::new(),
            components: HashMap::new(),
            parents: HashMap::new(),
        }
    }

    /// Spawn a new entity with a unique name
    pub fn spawn(&mut self, name: impl Into<String>) -> Result<EntityId> {
        let name = name.into();

        if self.name_map.contains_key(&name) {
            return Err(LumenError::DuplicateEntityName(name));
        }

        let entity_id = EntityId::new();
        let hecs_entity = self.world.spawn(());

        self.id_map.insert(entity_id, hecs_entity);
        self.name_map.insert(name, entity_id);
        self.components.insert(entity_id, DynamicComponents::new());

        Ok(entity_id)
    }

    /// Despawn an entity and detach its children
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        let hecs_entity = *self
            .id_map
            .get_by_left(&id)
            .ok_or_else(|| LumenError::EntityNotFound(id.to_string()))?;

        self.world
            .despawn(hecs_entity)
            .map_err(|_| LumenError::EntityNotFound(id.to_string()))?;

        self.name_map.retain(|_, v| *v != id);
        self.id_map.remove_by_left(&id);
        self.components.remove(&id);
        self.parents.remove(&id);
        self.parents.retain(|_, parent| *parent != id);

        Ok(())
    }

    pub fn despawn_by_name(&mut self, name: &str) -> Result<()> {
        let id = self
            .get_id(name)
            .ok_or_else(|| LumenError::EntityNotFound(name.to_string()))?;
        self.despawn(id)
    }

    pub fn get_id(&self, name: &str) -> Option<EntityId> {
        self.name_map.get(name).copied()
    }

    pub fn get_name(&self, id: EntityId) -> Option<&str> {
        self.name_map
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }

    pub fn get_components(&self, id: EntityId) -> Option<&DynamicComponents> {
        self.components.get(&id)
    }

    pub fn get_components_mut(&mut self, id: EntityId) -> Option<&mut DynamicComponents> {
        self.components.get_mut(&id)
    }

    /// Set (replace) a component on an entity
    pub fn set_component(&mut self, id: EntityId, component: &str, data: toml::Value) -> Result<()> {
        let components = self
            .components
            .get_mut(&id)
            .ok_or_else(|| LumenError::EntityNotFound(id.to_string()))?;

        components.set(component, data);
        Ok(())
    }

    pub fn get_component(&self, id: EntityId, component: &str) -> Option<&toml::Value> {
        self.components.get(&id).and_then(|c| c.get(component))
    }

    pub fn remove_component(&mut self, id: EntityId, component: &str) -> Result<toml::Value> {
        self.components
            .get_mut(&id)
            .ok_or_else(|| LumenError::EntityNotFound(id.to_string()))?
            .remove(component)
            .ok_or_else(|| LumenError::ComponentNotFound(component.to_string()))
    }

    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> Result<()> {
        if !self.id_map.contains_left(&child) {
            return Err(LumenError::EntityNotFound(child.to_string()));
        }
        if !self.id_map.contains_left(&parent) {
            return Err(LumenError::EntityNotFound(parent.to_string()));
        }

        self.parents.insert(child, parent);
        Ok(())
    }

    pub fn set_parent_by_name(&mut self, child: &str, parent: &str) -> Result<()> {
        let child_id = self
            .get_id(child)
            .ok_or_else(|| LumenError::EntityNotFound(child.to_string()))?;
        let parent_id = self
            .get_id(parent)
            .ok_or_else(|| LumenError::EntityNotFound(parent.to_string()))?;

        self.set_parent(child_id, parent_id)
    }

    pub fn get_parent(&self, child: EntityId) -> Option<EntityId> {
        self.parents.get(&child).copied()
    }

    /// Info about all entities, sorted by id so iteration order is stable
    pub fn all_entities(&self) -> Vec<EntityInfo> {
        let mut infos: Vec<EntityInfo> = self
            .name_map
            .iter()
            .map(|(name, id)| {
                let components = self
                    .components
                    .get(id)
                    .map(|c| c.component_names().into_iter().map(String::from).collect())
                    .unwrap_or_default();
                let parent = self
                    .parents
                    .get(id)
                    .and_then(|pid| self.get_name(*pid).map(String::from));

                EntityInfo {
                    id: *id,
                    name: name.clone(),
                    parent,
                    components,
                }
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Ids of entities carrying the named component
    pub fn entities_with(&self, component: &str) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .components
            .iter()
            .filter(|(_, c)| c.has(component))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn entity_count(&self) -> usize {
        self.name_map.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.id_map.contains_left(&id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_map.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.world.clear();
        self.id_map.clear();
        self.name_map.clear();
        self.components.clear();
        self.parents.clear();
    }

    /// Local transform parsed from the entity's `transform` component
    pub fn get_transform(&self, id: EntityId) -> Option<Transform> {
        let transform_data = self.components.get(&id)?.get("transform")?;

        let position = transform_data.get("position").and_then(parse_vec3).unwrap_or(Vec3::ZERO);
        let rotation = transform_data.get("rotation").and_then(parse_vec3).unwrap_or(Vec3::ZERO);
        let scale = transform_data.get("scale").and_then(parse_vec3).unwrap_or(Vec3::ONE);

        Some(Transform {
            position,
            rotation,
            scale,
        })
    }

    /// World-space transform matrix, walking the parent chain
    pub fn get_world_matrix(&self, id: EntityId) -> Option<[[f32; 4]; 4]> {
        let local = self.get_transform(id).unwrap_or_default();
        match self.parents.get(&id) {
            Some(parent_id) => {
                let parent_mat = self.get_world_matrix(*parent_id)?;
                Some(mat4_mul(&parent_mat, &local.to_matrix()))
            }
            None => Some(local.to_matrix()),
        }
    }

    /// World-space position (translation column of the world matrix)
    pub fn get_world_position(&self, id: EntityId) -> Option<Vec3> {
        if !self.contains(id) {
            return None;
        }
        let mat = self.get_world_matrix(id)?;
        Some(Vec3::new(mat[3][0], mat[3][1], mat[3][2]))
    }
}

/// Parse a vector from `[x, y, z]` (ints or floats) or `{ x, y, z }`
pub fn parse_vec3(value: &toml::Value) -> Option<Vec3> {
    fn num(v: &toml::Value) -> Option<f32> {
        v.as_float()
            .or_else(|| v.as_integer().map(|i| i as f64))
            .map(|f| f as f32)
    }

    if let Some(table) = value.as_table() {
        let x = table.get("x").and_then(num).unwrap_or(0.0);
        let y = table.get("y").and_then(num).unwrap_or(0.0);
        let z = table.get("z").and_then(num).unwrap_or(0.0);
        return Some(Vec3::new(x, y, z));
    }

    if let Some(arr) = value.as_array() {
        if arr.len() >= 3 {
            return Some(Vec3::new(
                num(&arr[0]).unwrap_or(0.0),
                num(&arr[1]).unwrap_or(0.0),
                num(&arr[2]).unwrap_or(0.0),
            ));
        }
    }

    None
}
