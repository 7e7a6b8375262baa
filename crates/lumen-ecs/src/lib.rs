//! Lumen ECS - Entity Component System with stable IDs
//!
//! Wraps hecs with stable entity identifiers and dynamic component storage.
//! Components are TOML tables keyed by component name; subsystems look up
//! the components they drive by that name (`"transform"`,
//! `"environment_probe"`, ...).

mod component;
mod entity;
mod world;

pub use component::DynamicComponents;
pub use entity::EntityInfo;
pub use world::{parse_vec3, LumenWorld};
