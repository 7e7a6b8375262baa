//! Lumen Scene - TOML scene files
//!
//! A scene file names its entities and gives each one a table per
//! component (`transform`, `environment_probe`, ...).

mod format;
mod loader;

pub use format::{EntityDef, SceneFile, SceneMetadata};
pub use loader::{load_scene, load_scene_string};
