//! The GPU capabilities environment-probe baking consumes
//!
//! Capture and convolution kernels are opaque to the baking code: it only
//! issues these calls, in order, and never waits on their completion.

use crate::error::RenderError;
use crate::texture::{CubeFace, RenderTargetHandle, TextureDesc, TextureHandle};
use lumen_core::{Color, Vec3};

/// Which scene objects a capture renders
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureFilter {
    Everything,
    /// Immovable geometry only
    StaticOnly,
}

/// How a capture fills pixels not covered by geometry
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureClear {
    Sky,
    Color(Color),
}

/// Parameters of one cube-face scene capture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeFaceCapture {
    pub layer_mask: u32,
    pub filter: CaptureFilter,
    pub origin: Vec3,
    pub near: f32,
    pub far: f32,
    pub clear: CaptureClear,
}

/// Render-side capabilities used by the probe baker.
///
/// Texture handles are assigned by the `TextureManager`; the device only
/// backs them with storage. Every call submits its work and returns without
/// waiting for the GPU; the device must execute submissions in order.
pub trait RenderDevice {
    /// (Re)allocate cubemap storage for `texture`, discarding any previous
    /// contents
    fn allocate_cubemap(&mut self, texture: TextureHandle, desc: &TextureDesc) -> Result<(), RenderError>;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Bind `texture` as a render target, optionally with a depth buffer
    fn create_render_target(
        &mut self,
        texture: TextureHandle,
        with_depth: bool,
    ) -> Result<RenderTargetHandle, RenderError>;

    fn release_render_target(&mut self, target: RenderTargetHandle);

    /// Render the scene as seen from `capture.origin` into mip 0 of one face
    fn capture_scene_to_cube_face(
        &mut self,
        capture: &CubeFaceCapture,
        target: RenderTargetHandle,
        face: CubeFace,
    ) -> Result<(), RenderError>;

    /// Irradiance convolution of `source` mip 0 into all faces of `target`
    fn convolve_irradiance(&mut self, source: TextureHandle, target: RenderTargetHandle) -> Result<(), RenderError>;

    /// GGX prefilter of `source` mip 0 into mip `level` of all faces of
    /// `target`; roughness is `level / max_level`
    fn convolve_ggx_mip(
        &mut self,
        source: TextureHandle,
        target: RenderTargetHandle,
        max_level: u32,
        level: u32,
    ) -> Result<(), RenderError>;
}
