//! Lumen Core - Foundational types for the Lumen engine
//!
//! This crate provides the core types that all other Lumen crates depend on:
//! - `EntityId` - Stable entity identifiers
//! - `ContentHash` - SHA-256 hash names for shared GPU resources
//! - `Transform`, `Vec3`, `Aabb` - Spatial types
//! - Error types and Result alias

mod error;
mod hash;
mod id;
mod types;

pub use error::{LumenError, Result};
pub use hash::ContentHash;
pub use id::EntityId;
pub use types::{mat4_mul, Aabb, Color, Transform, Vec3};
