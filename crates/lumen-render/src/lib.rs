//! Lumen Render - environment probe baking
//!
//! This crate holds the render-side state of environment probes (IBL): the
//! texture arena, the probes themselves, the resumable bake job that
//! captures a probe and convolves it into diffuse and specular cubemaps, and
//! the scheduler that spreads bakes across frames. GPU work goes through the
//! `RenderDevice` trait, implemented by a headless wgpu device and by a
//! recording device for dry runs.

mod context;
mod device;
mod env_probe;
mod env_probe_job;
mod error;
mod probe_device;
pub mod probe_pipeline;
mod probe_scheduler;
pub mod recording;
mod render_world;
mod texture;
mod texture_manager;

pub use context::GpuContext;
pub use device::{CaptureClear, CaptureFilter, CubeFaceCapture, RenderDevice};
pub use env_probe::{
    to_actual_resolution, ClearMethod, EnvProbe, EnvProbeState, ProbeTexture, ProbeType, RefreshMode, Resolution,
    TimeSlicing, DIFFUSE_PROBE_SIZE,
};
pub use env_probe_job::{max_specular_level_for, BakePhase, EnvProbeJob};
pub use error::RenderError;
pub use probe_device::{wgpu_format, WgpuProbeDevice};
pub use probe_scheduler::{ProbeScheduler, SchedulerConfig, TickReport};
pub use recording::{DeviceCall, RecordingDevice};
pub use render_world::{EnvProbeHandle, RenderWorld};
pub use texture::{
    ceil_log2, full_mip_count, CubeFace, PixelFormat, RenderTargetHandle, TextureDesc, TextureFlags, TextureHandle,
    CUBE_FACE_COUNT,
};
pub use texture_manager::TextureManager;
