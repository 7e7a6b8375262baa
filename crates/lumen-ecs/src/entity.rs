//! Entity information and metadata

use lumen_core::EntityId;
use serde::{Deserialize, Serialize};

/// Summary of an entity for iteration and listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Component names present on this entity
    pub components: Vec<String>,
}

impl EntityInfo {
    /// Whether the entity carries a component with this name
    pub fn has_component(&self, name: &str) -> bool {
        self.components.iter().any(|c| c == name)
    }
}
