//! A `RenderDevice` that records calls instead of touching a GPU
//!
//! Used for dry-run bakes (printing the work a bake would issue) and for
//! tests. It validates handles and mip levels the same way a real device
//! would reject them.

use crate::device::{CubeFaceCapture, RenderDevice};
use crate::error::RenderError;
use crate::texture::{CubeFace, RenderTargetHandle, TextureDesc, TextureHandle};
use std::collections::HashMap;

/// One recorded device call
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    AllocateCubemap {
        texture: TextureHandle,
        desc: TextureDesc,
    },
    ReleaseTexture(TextureHandle),
    CreateRenderTarget {
        target: RenderTargetHandle,
        texture: TextureHandle,
        with_depth: bool,
    },
    ReleaseRenderTarget(RenderTargetHandle),
    CaptureFace {
        target: RenderTargetHandle,
        texture: TextureHandle,
        face: CubeFace,
        capture: CubeFaceCapture,
    },
    ConvolveIrradiance {
        source: TextureHandle,
        target: RenderTargetHandle,
    },
    ConvolveGgxMip {
        source: TextureHandle,
        target: RenderTargetHandle,
        max_level: u32,
        level: u32,
    },
}

impl DeviceCall {
    /// Whether this call issues GPU work (as opposed to resource management)
    pub fn is_work(&self) -> bool {
        matches!(
            self,
            DeviceCall::CaptureFace { .. }
                | DeviceCall::ConvolveIrradiance { .. }
                | DeviceCall::ConvolveGgxMip { .. }
        )
    }
}

#[derive(Default)]
pub struct RecordingDevice {
    calls: Vec<DeviceCall>,
    textures: HashMap<TextureHandle, TextureDesc>,
    targets: HashMap<RenderTargetHandle, TextureHandle>,
    next_target: u32,
    fail_allocations: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent allocation fail, as an out-of-memory device would
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Take the recorded calls, leaving the log empty
    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of GPU work calls recorded
    pub fn work_count(&self) -> usize {
        self.calls.iter().filter(|c| c.is_work()).count()
    }

    pub fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(&texture)
    }

    pub fn is_target_live(&self, target: RenderTargetHandle) -> bool {
        self.targets.contains_key(&target)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    fn target_desc(&self, target: RenderTargetHandle) -> Result<(TextureHandle, TextureDesc), RenderError> {
        let texture = *self
            .targets
            .get(&target)
            .ok_or(RenderError::UnknownRenderTarget(target))?;
        let desc = *self
            .textures
            .get(&texture)
            .ok_or(RenderError::UnknownTexture(texture))?;
        Ok((texture, desc))
    }
}

impl RenderDevice for RecordingDevice {
    fn allocate_cubemap(&mut self, texture: TextureHandle, desc: &TextureDesc) -> Result<(), RenderError> {
        if self.fail_allocations {
            return Err(RenderError::AllocationFailed {
                texture,
                reason: "out of memory".to_string(),
            });
        }
        self.textures.insert(texture, *desc);
        self.calls.push(DeviceCall::AllocateCubemap { texture, desc: *desc });
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.calls.push(DeviceCall::ReleaseTexture(texture));
    }

    fn create_render_target(
        &mut self,
        texture: TextureHandle,
        with_depth: bool,
    ) -> Result<RenderTargetHandle, RenderError> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::UnknownTexture(texture));
        }
        let target = RenderTargetHandle(self.next_target);
        self.next_target += 1;
        self.targets.insert(target, texture);
        self.calls.push(DeviceCall::CreateRenderTarget {
            target,
            texture,
            with_depth,
        });
        Ok(target)
    }

    fn release_render_target(&mut self, target: RenderTargetHandle) {
        self.targets.remove(&target);
        self.calls.push(DeviceCall::ReleaseRenderTarget(target));
    }

    fn capture_scene_to_cube_face(
        &mut self,
        capture: &CubeFaceCapture,
        target: RenderTargetHandle,
        face: CubeFace,
    ) -> Result<(), RenderError> {
        let (texture, _) = self.target_desc(target)?;
        self.calls.push(DeviceCall::CaptureFace {
            target,
            texture,
            face,
            capture: *capture,
        });
        Ok(())
    }

    fn convolve_irradiance(&mut self, source: TextureHandle, target: RenderTargetHandle) -> Result<(), RenderError> {
        if !self.textures.contains_key(&source) {
            return Err(RenderError::UnknownTexture(source));
        }
        self.target_desc(target)?;
        self.calls.push(DeviceCall::ConvolveIrradiance { source, target });
        Ok(())
    }

    fn convolve_ggx_mip(
        &mut self,
        source: TextureHandle,
        target: RenderTargetHandle,
        max_level: u32,
        level: u32,
    ) -> Result<(), RenderError> {
        if !self.textures.contains_key(&source) {
            return Err(RenderError::UnknownTexture(source));
        }
        let (_, desc) = self.target_desc(target)?;
        if level > max_level || level >= desc.mip_levels {
            return Err(RenderError::InvalidMipLevel {
                level,
                mip_levels: desc.mip_levels,
            });
        }
        self.calls.push(DeviceCall::ConvolveGgxMip {
            source,
            target,
            max_level,
            level,
        });
        Ok(())
    }
}
