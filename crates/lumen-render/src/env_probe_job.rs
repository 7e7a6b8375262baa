//! Resumable bake of one environment probe
//!
//! A bake is six face captures into mip 0 of the specular cubemap, one
//! irradiance convolution into the diffuse cubemap and one GGX prefilter per
//! remaining specular mip. Each `refresh` call performs exactly one of those
//! passes so the frame loop decides how much work to spend per frame.

use crate::device::RenderDevice;
use crate::env_probe::{to_actual_resolution, EnvProbe, ProbeTexture, Resolution, DIFFUSE_PROBE_SIZE};
use crate::error::RenderError;
use crate::render_world::EnvProbeHandle;
use crate::texture::{
    ceil_log2, full_mip_count, CubeFace, PixelFormat, TextureDesc, TextureFlags, CUBE_FACE_COUNT,
};
use crate::texture_manager::TextureManager;

const LAST_FACE: i32 = CUBE_FACE_COUNT as i32 - 1;

/// Which pass the next `refresh` call performs
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BakePhase {
    CaptureFaces,
    DiffuseConvolution,
    SpecularConvolution,
    Done,
}

/// Highest GGX mip produced for a resolution tier
pub fn max_specular_level_for(resolution: Resolution) -> u32 {
    ceil_log2(to_actual_resolution(resolution))
}

pub struct EnvProbeJob {
    probe: EnvProbeHandle,
    resolution: Resolution,
    use_hdr: bool,
    /// Probe generation the bake started from
    generation: u64,
    /// Last captured face, -1 before the first capture
    level0_face_progress: i32,
    /// Last written specular mip; 0 once mip 0 is complete
    specular_level: i32,
    diffuse_done: bool,
    max_specular_level: i32,
}

impl EnvProbeJob {
    /// Start a bake of `probe` from its current state
    pub fn new(handle: EnvProbeHandle, probe: &EnvProbe) -> Self {
        let resolution = probe.state().resolution;
        Self {
            probe: handle,
            resolution,
            use_hdr: probe.state().use_hdr,
            generation: probe.generation(),
            level0_face_progress: -1,
            specular_level: -1,
            diffuse_done: false,
            max_specular_level: max_specular_level_for(resolution) as i32,
        }
    }

    /// Number of `refresh` calls a full bake at this tier takes
    pub fn total_steps(resolution: Resolution) -> u32 {
        CUBE_FACE_COUNT as u32 + 1 + max_specular_level_for(resolution)
    }

    /// Advance the bake by one pass. Returns `Ok(true)` on the call that
    /// completes the bake, after which the probe no longer needs refresh.
    pub fn refresh(
        &mut self,
        probe: &mut EnvProbe,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<bool, RenderError> {
        debug_assert!(!self.is_finished(), "refresh called on a finished probe job");

        match self.phase() {
            BakePhase::CaptureFaces => self.capture_next_face(probe, textures, device)?,
            BakePhase::DiffuseConvolution => self.convolve_diffuse(probe, textures, device)?,
            BakePhase::SpecularConvolution => self.convolve_next_specular_mip(probe, device)?,
            BakePhase::Done => {}
        }

        if self.is_finished() {
            probe.needs_refresh = false;
            log::info!("environment {} baked", self.probe);
            return Ok(true);
        }
        Ok(false)
    }

    fn capture_next_face(
        &mut self,
        probe: &mut EnvProbe,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        if self.level0_face_progress == -1 {
            self.revalidate_specular(probe, textures, device)?;
        }

        let target = probe
            .specular_render_target
            .ok_or(RenderError::MissingRenderTarget("specular"))?;
        let next = self.level0_face_progress + 1;
        let face = CubeFace::ALL[next as usize];

        device.capture_scene_to_cube_face(&probe.capture_desc(), target, face)?;
        self.level0_face_progress = next;
        if next == LAST_FACE {
            self.specular_level = 0;
        }
        log::debug!("{}: captured face {:?}", self.probe, face);
        Ok(())
    }

    fn convolve_diffuse(
        &mut self,
        probe: &mut EnvProbe,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        if matches!(probe.diffuse_texture, Some(ProbeTexture::Baked(_))) {
            self.diffuse_done = true;
            log::debug!("{}: diffuse supplied by asset, skipping convolution", self.probe);
            return Ok(());
        }

        self.revalidate_diffuse(probe, textures, device)?;
        let source = self.specular_source(probe)?;
        let target = probe
            .diffuse_render_target
            .ok_or(RenderError::MissingRenderTarget("diffuse"))?;

        device.convolve_irradiance(source, target)?;
        self.diffuse_done = true;
        log::debug!("{}: irradiance convolution submitted", self.probe);
        Ok(())
    }

    fn convolve_next_specular_mip(&mut self, probe: &mut EnvProbe, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        let source = self.specular_source(probe)?;
        let target = probe
            .specular_render_target
            .ok_or(RenderError::MissingRenderTarget("specular"))?;
        let level = self.specular_level + 1;

        device.convolve_ggx_mip(source, target, self.max_specular_level as u32, level as u32)?;
        self.specular_level = level;
        log::debug!("{}: GGX mip {}/{}", self.probe, level, self.max_specular_level);
        Ok(())
    }

    fn specular_source(&self, probe: &EnvProbe) -> Result<crate::texture::TextureHandle, RenderError> {
        probe
            .specular_probe_texture()
            .ok_or(RenderError::MissingRenderTarget("specular"))
    }

    /// Make the specular cubemap match the snapshot size and format, and
    /// make sure it has a depth-backed render target
    fn revalidate_specular(
        &self,
        probe: &mut EnvProbe,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        let handle = match probe.specular_texture {
            Some(ProbeTexture::Owned(h)) => h,
            Some(ProbeTexture::Baked(h)) => return Err(RenderError::ReadOnlyTexture(h)),
            None => return Err(RenderError::MissingRenderTarget("specular")),
        };

        let size = to_actual_resolution(self.resolution);
        let wanted = TextureDesc::cubemap(
            size,
            full_mip_count(size),
            PixelFormat::for_hdr(self.use_hdr),
            TextureFlags::CLAMP,
        );
        let current = textures.desc(handle).copied().ok_or(RenderError::UnknownTexture(handle))?;
        if current.size != wanted.size || current.format.is_float() != wanted.format.is_float() {
            probe.drop_specular_render_target(device);
            textures.recreate(handle, wanted, device)?;
        }

        if probe.specular_render_target.is_none() {
            probe.specular_render_target = Some(device.create_render_target(handle, true)?);
        }
        Ok(())
    }

    /// Make the diffuse cubemap 64x64 in the snapshot format, with a render
    /// target
    fn revalidate_diffuse(
        &self,
        probe: &mut EnvProbe,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        let handle = match probe.diffuse_texture {
            Some(ProbeTexture::Owned(h)) => h,
            Some(ProbeTexture::Baked(h)) => return Err(RenderError::ReadOnlyTexture(h)),
            None => return Err(RenderError::MissingRenderTarget("diffuse")),
        };

        let wanted = TextureDesc::cubemap(
            DIFFUSE_PROBE_SIZE,
            1,
            PixelFormat::for_hdr(self.use_hdr),
            TextureFlags::CLAMP_NO_MIPMAPS,
        );
        let current = textures.desc(handle).copied().ok_or(RenderError::UnknownTexture(handle))?;
        if current.size != wanted.size || current.format.is_float() != wanted.format.is_float() {
            probe.drop_diffuse_render_target(device);
            textures.recreate(handle, wanted, device)?;
        }

        if probe.diffuse_render_target.is_none() {
            probe.diffuse_render_target = Some(device.create_render_target(handle, false)?);
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.diffuse_done && self.specular_level >= self.max_specular_level
    }

    pub fn phase(&self) -> BakePhase {
        if self.level0_face_progress < LAST_FACE {
            BakePhase::CaptureFaces
        } else if !self.diffuse_done {
            BakePhase::DiffuseConvolution
        } else if self.specular_level < self.max_specular_level {
            BakePhase::SpecularConvolution
        } else {
            BakePhase::Done
        }
    }

    pub fn steps_remaining(&self) -> u32 {
        let done = (self.level0_face_progress + 1) + self.diffuse_done as i32 + self.specular_level.max(0);
        Self::total_steps(self.resolution) - done as u32
    }

    /// Whether the probe changed in a way that invalidates passes already
    /// committed by this job
    pub fn is_stale_for(&self, probe: &EnvProbe) -> bool {
        probe.generation() != self.generation
    }

    pub fn probe(&self) -> EnvProbeHandle {
        self.probe
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn level0_face_progress(&self) -> i32 {
        self.level0_face_progress
    }

    pub fn specular_level(&self) -> i32 {
        self.specular_level
    }

    pub fn diffuse_done(&self) -> bool {
        self.diffuse_done
    }

    pub fn max_specular_level(&self) -> u32 {
        self.max_specular_level as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CaptureClear, CaptureFilter, CubeFaceCapture};
    use crate::env_probe::{ClearMethod, EnvProbeState, ProbeType};
    use crate::recording::{DeviceCall, RecordingDevice};
    use crate::render_world::RenderWorld;
    use lumen_core::{Color, Vec3};

    fn setup(state: EnvProbeState) -> (RenderWorld, RecordingDevice, EnvProbeHandle) {
        let mut device = RecordingDevice::new();
        let mut world = RenderWorld::new();
        let handle = world.add_env_probe(state, &mut device).unwrap();
        device.take_calls();
        (world, device, handle)
    }

    fn step(world: &mut RenderWorld, device: &mut RecordingDevice, job: &mut EnvProbeJob) -> bool {
        let (probe, textures) = world.probe_with_textures_mut(job.probe()).unwrap();
        job.refresh(probe, textures, device).unwrap()
    }

    fn work(device: &RecordingDevice) -> Vec<DeviceCall> {
        device.calls().iter().filter(|c| c.is_work()).cloned().collect()
    }

    #[test]
    fn test_max_specular_level_all_tiers() {
        for tier in Resolution::ALL {
            let size = to_actual_resolution(tier);
            let expected = (size as f64).log2().ceil() as u32;
            assert_eq!(max_specular_level_for(tier), expected);
        }
        assert_eq!(EnvProbeJob::total_steps(Resolution::Resolution128), 14);
        assert_eq!(EnvProbeJob::total_steps(Resolution::Resolution2048), 18);
    }

    #[test]
    fn test_fresh_job() {
        let (world, _device, handle) = setup(EnvProbeState::default());
        let job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());

        assert_eq!(job.level0_face_progress(), -1);
        assert_eq!(job.specular_level(), -1);
        assert!(!job.diffuse_done());
        assert!(!job.is_finished());
        assert_eq!(job.phase(), BakePhase::CaptureFaces);
        assert_eq!(job.steps_remaining(), 14);
    }

    #[test]
    fn test_tier_128_takes_fourteen_calls() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());

        for i in 0..13 {
            assert!(!step(&mut world, &mut device, &mut job), "call {} finished early", i);
            assert!(world.env_probe(handle).unwrap().needs_refresh());
        }
        assert!(step(&mut world, &mut device, &mut job));
        assert!(job.is_finished());
        assert_eq!(job.phase(), BakePhase::Done);
        assert_eq!(job.steps_remaining(), 0);
        assert!(!world.env_probe(handle).unwrap().needs_refresh());
        assert_eq!(work(&device).len(), 14);
    }

    #[test]
    fn test_pass_order() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        while !step(&mut world, &mut device, &mut job) {}

        let calls = work(&device);
        for (i, call) in calls[..6].iter().enumerate() {
            match call {
                DeviceCall::CaptureFace { face, .. } => assert_eq!(face.index() as usize, i),
                other => panic!("expected capture, got {:?}", other),
            }
        }
        assert!(matches!(calls[6], DeviceCall::ConvolveIrradiance { .. }));
        let levels: Vec<u32> = calls[7..]
            .iter()
            .map(|c| match c {
                DeviceCall::ConvolveGgxMip { level, max_level, .. } => {
                    assert_eq!(*max_level, 7);
                    *level
                }
                other => panic!("expected GGX pass, got {:?}", other),
            })
            .collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_progress_invariants_hold_every_step() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        let mut last = (job.level0_face_progress(), job.specular_level(), job.phase());

        loop {
            let done = step(&mut world, &mut device, &mut job);
            let now = (job.level0_face_progress(), job.specular_level(), job.phase());
            assert!(now.0 >= last.0 && now.1 >= last.1 && now.2 >= last.2);
            if job.specular_level() > -1 {
                assert_eq!(job.level0_face_progress(), LAST_FACE);
            }
            if job.specular_level() > 0 {
                assert!(job.diffuse_done());
            }
            last = now;
            if done {
                break;
            }
        }
    }

    #[test]
    fn test_specular_texture_revalidated_for_hdr() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        step(&mut world, &mut device, &mut job);

        let probe = world.env_probe(handle).unwrap();
        let specular = probe.specular_probe_texture().unwrap();
        let desc = world.textures().desc(specular).unwrap();
        assert_eq!(desc.size, 128);
        assert_eq!(desc.mip_levels, 8);
        assert!(desc.format.is_float());

        let with_depth = device.calls().iter().any(|c| {
            matches!(c, DeviceCall::CreateRenderTarget { texture, with_depth: true, .. } if *texture == specular)
        });
        assert!(with_depth);
    }

    #[test]
    fn test_diffuse_texture_revalidated_to_64() {
        let state = EnvProbeState {
            use_hdr: false,
            ..EnvProbeState::default()
        };
        let (mut world, mut device, handle) = setup(state);
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        for _ in 0..7 {
            step(&mut world, &mut device, &mut job);
        }

        let diffuse = world.env_probe(handle).unwrap().diffuse_probe_texture().unwrap();
        let desc = world.textures().desc(diffuse).unwrap();
        assert_eq!((desc.size, desc.mip_levels), (64, 1));
        assert!(!desc.format.is_float());
        assert!(job.diffuse_done());
    }

    #[test]
    fn test_abandoned_job_keeps_probe_stale() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        for _ in 0..3 {
            step(&mut world, &mut device, &mut job);
        }
        drop(job);

        assert!(world.env_probe(handle).unwrap().needs_refresh());
        let calls = work(&device);
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| matches!(c, DeviceCall::CaptureFace { .. })));
    }

    #[test]
    fn test_capture_filter_follows_probe_type() {
        for (probe_type, expected) in [
            (ProbeType::Realtime, CaptureFilter::StaticOnly),
            (ProbeType::Baked, CaptureFilter::Everything),
        ] {
            let state = EnvProbeState {
                probe_type,
                ..EnvProbeState::default()
            };
            let (mut world, mut device, handle) = setup(state);
            let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
            step(&mut world, &mut device, &mut job);

            assert!(matches!(
                work(&device)[0],
                DeviceCall::CaptureFace { capture, .. } if capture.filter == expected
            ));
        }
    }

    #[test]
    fn test_capture_carries_probe_placement() {
        let state = EnvProbeState {
            origin: Vec3::new(3.0, -1.0, 7.5),
            clipping_near: 0.25,
            clipping_far: 40.0,
            layer_mask: 0b101,
            clear_method: ClearMethod::ColorClear,
            clear_color: Color::new(0.2, 0.4, 0.6, 1.0),
            ..EnvProbeState::default()
        };
        let (mut world, mut device, handle) = setup(state);
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        for _ in 0..CUBE_FACE_COUNT {
            step(&mut world, &mut device, &mut job);
        }

        let expected = CubeFaceCapture {
            layer_mask: 0b101,
            filter: CaptureFilter::StaticOnly,
            origin: Vec3::new(3.0, -1.0, 7.5),
            near: 0.25,
            far: 40.0,
            clear: CaptureClear::Color(Color::new(0.2, 0.4, 0.6, 1.0)),
        };
        let captures: Vec<CubeFaceCapture> = work(&device)
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::CaptureFace { capture, .. } => Some(capture),
                _ => None,
            })
            .collect();
        assert_eq!(captures, vec![expected; CUBE_FACE_COUNT]);
    }

    #[test]
    fn test_baked_diffuse_is_not_convolved() {
        let mut device = RecordingDevice::new();
        let mut world = RenderWorld::new();
        let baked_desc = TextureDesc::cubemap(64, 1, PixelFormat::Rg11b10Float, TextureFlags::CLAMP_NO_MIPMAPS);
        let baked = world.textures_mut().alloc("lobby_diffuse", baked_desc, &mut device).unwrap();
        let state = EnvProbeState {
            resolution: Resolution::Resolution16,
            baked_diffuse_probe_texture: Some(baked),
            ..EnvProbeState::default()
        };
        let handle = world.add_env_probe(state, &mut device).unwrap();

        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        let mut calls = 0;
        loop {
            calls += 1;
            if step(&mut world, &mut device, &mut job) {
                break;
            }
        }

        assert_eq!(calls, EnvProbeJob::total_steps(Resolution::Resolution16));
        assert!(!device
            .calls()
            .iter()
            .any(|c| matches!(c, DeviceCall::ConvolveIrradiance { .. })));
        assert_eq!(world.textures().desc(baked), Some(&baked_desc));
    }

    #[test]
    fn test_stale_after_resolution_change() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        assert!(!job.is_stale_for(world.env_probe(handle).unwrap()));

        let state = EnvProbeState {
            resolution: Resolution::Resolution64,
            ..EnvProbeState::default()
        };
        world.update_env_probe(handle, state, &mut device).unwrap();
        assert!(job.is_stale_for(world.env_probe(handle).unwrap()));
    }

    #[test]
    fn test_stale_after_move_mid_bake() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        step(&mut world, &mut device, &mut job);
        assert!(world.env_probe(handle).unwrap().needs_refresh());

        let moved = EnvProbeState {
            origin: Vec3::new(0.0, 4.0, 0.0),
            ..EnvProbeState::default()
        };
        world.update_env_probe(handle, moved, &mut device).unwrap();
        assert!(job.is_stale_for(world.env_probe(handle).unwrap()));
    }

    #[test]
    fn test_allocation_failure_during_revalidation() {
        let (mut world, mut device, handle) = setup(EnvProbeState::default());
        let mut job = EnvProbeJob::new(handle, world.env_probe(handle).unwrap());
        device.fail_allocations(true);

        let (probe, textures) = world.probe_with_textures_mut(handle).unwrap();
        assert!(matches!(
            job.refresh(probe, textures, &mut device),
            Err(RenderError::AllocationFailed { .. })
        ));
        assert_eq!(job.level0_face_progress(), -1);
    }
}
