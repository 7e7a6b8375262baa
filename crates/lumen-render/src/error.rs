//! Render error type

use crate::texture::{RenderTargetHandle, TextureHandle};
use thiserror::Error;

/// Errors raised by render resources and devices.
///
/// Every variant is fatal for the frame that produced it: callers propagate
/// it to the host rather than attempting partial recovery.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to get adapter")]
    AdapterNotFound,
    #[error("Failed to create device: {0}")]
    DeviceCreation(String),
    #[error("Texture allocation failed for {texture:?}: {reason}")]
    AllocationFailed { texture: TextureHandle, reason: String },
    #[error("Texture name already in use: {0}")]
    TextureNameInUse(String),
    #[error("Unknown texture: {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("Unknown render target: {0:?}")]
    UnknownRenderTarget(RenderTargetHandle),
    #[error("Mip level {level} out of range for a texture with {mip_levels} levels")]
    InvalidMipLevel { level: u32, mip_levels: u32 },
    #[error("Environment probe has no {0} render target")]
    MissingRenderTarget(&'static str),
    #[error("Cannot render into externally supplied texture {0:?}")]
    ReadOnlyTexture(TextureHandle),
}

impl From<RenderError> for lumen_core::LumenError {
    fn from(err: RenderError) -> Self {
        lumen_core::LumenError::RenderError(err.to_string())
    }
}
