//! Environment probes: configuration, cached probe textures and refresh
//! tracking

use crate::device::{CaptureClear, CaptureFilter, CubeFaceCapture, RenderDevice};
use crate::error::RenderError;
use crate::texture::{full_mip_count, PixelFormat, RenderTargetHandle, TextureDesc, TextureFlags, TextureHandle};
use crate::texture_manager::TextureManager;
use lumen_core::{Aabb, Color, Vec3};

/// Whether a probe is captured once and shipped, or refreshed at runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeType {
    Baked,
    Realtime,
}

/// When a realtime probe refreshes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshMode {
    OnAwake,
    EveryFrame,
    ViaScripting,
}

/// How much of a bake the scheduler performs per frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSlicing {
    /// Capture all six faces in one frame, then one convolution pass per frame
    AllFacesAtOnce,
    /// One capture or convolution pass per frame
    IndividualFaces,
    /// The whole bake in a single frame
    NoTimeSlicing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearMethod {
    SkyClear,
    ColorClear,
}

/// Probe resolution tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resolution {
    Resolution16,
    Resolution32,
    Resolution64,
    Resolution128,
    Resolution256,
    Resolution1024,
    Resolution2048,
}

/// Pixel size of each tier, in tier order
const RESOLUTION_SIZES: [u32; 7] = [16, 32, 64, 128, 256, 1024, 2048];

impl Resolution {
    pub const ALL: [Resolution; 7] = [
        Resolution::Resolution16,
        Resolution::Resolution32,
        Resolution::Resolution64,
        Resolution::Resolution128,
        Resolution::Resolution256,
        Resolution::Resolution1024,
        Resolution::Resolution2048,
    ];

    /// Tier with exactly this pixel size
    pub fn from_pixels(pixels: u32) -> Option<Self> {
        RESOLUTION_SIZES
            .iter()
            .position(|&size| size == pixels)
            .map(|i| Self::ALL[i])
    }
}

/// Pixel size of a resolution tier
pub fn to_actual_resolution(resolution: Resolution) -> u32 {
    RESOLUTION_SIZES[resolution as usize]
}

/// Size of the diffuse (irradiance) cubemap, independent of the tier
pub const DIFFUSE_PROBE_SIZE: u32 = 64;

const PLACEHOLDER_DIFFUSE_SIZE: u32 = 16;

/// Full configuration snapshot of a probe
#[derive(Clone, Debug, PartialEq)]
pub struct EnvProbeState {
    pub probe_type: ProbeType,
    pub refresh_mode: RefreshMode,
    pub time_slicing: TimeSlicing,
    /// Higher importance bakes first
    pub importance: i32,
    pub resolution: Resolution,
    pub use_hdr: bool,
    pub layer_mask: u32,
    pub clear_method: ClearMethod,
    pub clear_color: Color,
    pub clipping_near: f32,
    pub clipping_far: f32,
    pub use_box_projection: bool,
    /// Half extents of the influence box
    pub box_size: Vec3,
    pub box_offset: Vec3,
    pub origin: Vec3,
    /// Externally supplied textures; owned by the asset layer
    pub baked_diffuse_probe_texture: Option<TextureHandle>,
    pub baked_specular_probe_texture: Option<TextureHandle>,
}

impl Default for EnvProbeState {
    fn default() -> Self {
        Self {
            probe_type: ProbeType::Realtime,
            refresh_mode: RefreshMode::OnAwake,
            time_slicing: TimeSlicing::IndividualFaces,
            importance: 1,
            resolution: Resolution::Resolution128,
            use_hdr: true,
            layer_mask: u32::MAX,
            clear_method: ClearMethod::SkyClear,
            clear_color: Color::BLACK,
            clipping_near: 0.1,
            clipping_far: 500.0,
            use_box_projection: false,
            box_size: Vec3::splat(10.0),
            box_offset: Vec3::ZERO,
            origin: Vec3::ZERO,
            baked_diffuse_probe_texture: None,
            baked_specular_probe_texture: None,
        }
    }
}

impl EnvProbeState {
    /// Whether moving from `self` to `next` makes the cached textures stale
    fn differs_for_refresh(&self, next: &EnvProbeState) -> bool {
        self.resolution != next.resolution
            || self.use_hdr != next.use_hdr
            || self.clear_method != next.clear_method
            || (next.clear_method == ClearMethod::ColorClear && self.clear_color != next.clear_color)
            || self.clipping_near != next.clipping_near
            || self.clipping_far != next.clipping_far
            || self.origin != next.origin
    }
}

/// A probe texture slot: either allocated by the probe or adopted from the
/// asset layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeTexture {
    Owned(TextureHandle),
    Baked(TextureHandle),
}

impl ProbeTexture {
    pub fn handle(&self) -> TextureHandle {
        match *self {
            ProbeTexture::Owned(h) | ProbeTexture::Baked(h) => h,
        }
    }

    pub fn is_baked(&self) -> bool {
        matches!(self, ProbeTexture::Baked(_))
    }
}

#[derive(Clone, Copy)]
enum Channel {
    Diffuse,
    Specular,
}

impl Channel {
    fn label(self) -> &'static str {
        match self {
            Channel::Diffuse => "diffuse",
            Channel::Specular => "specular",
        }
    }
}

/// Durable state of one placed environment probe
pub struct EnvProbe {
    index: u32,
    pub(crate) state: EnvProbeState,
    pub(crate) diffuse_texture: Option<ProbeTexture>,
    pub(crate) specular_texture: Option<ProbeTexture>,
    pub(crate) diffuse_render_target: Option<RenderTargetHandle>,
    pub(crate) specular_render_target: Option<RenderTargetHandle>,
    world_aabb: Aabb,
    pub(crate) needs_refresh: bool,
    /// Bumped whenever a change makes previously captured content stale
    generation: u64,
}

impl EnvProbe {
    /// An empty probe; its textures appear on the first `update`.
    /// A new probe has never been captured, so it starts out needing refresh.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            state: EnvProbeState::default(),
            diffuse_texture: None,
            specular_texture: None,
            diffuse_render_target: None,
            specular_render_target: None,
            world_aabb: Aabb::default(),
            needs_refresh: true,
            generation: 0,
        }
    }

    /// Apply a new configuration snapshot
    pub fn update(
        &mut self,
        state: EnvProbeState,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        if self.state.differs_for_refresh(&state) {
            // A bake in flight has already set `needs_refresh`; the
            // generation tells it that its committed passes are stale.
            self.generation += 1;
            if !self.needs_refresh {
                self.invalidate();
            }
        }

        self.state = state;
        self.world_aabb =
            Aabb::from_center_half_extents(self.state.origin + self.state.box_offset, self.state.box_size);

        self.reconcile_texture(Channel::Diffuse, textures, device)?;
        self.reconcile_texture(Channel::Specular, textures, device)?;
        Ok(())
    }

    /// Mark the cached textures stale
    pub fn invalidate(&mut self) {
        self.needs_refresh = true;
    }

    /// Release owned textures and render targets. Baked textures belong to
    /// the asset layer and are left alone.
    pub fn purge(&mut self, textures: &mut TextureManager, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        for channel in [Channel::Diffuse, Channel::Specular] {
            self.drop_render_target(channel, device);
            if let Some(ProbeTexture::Owned(handle)) = self.slot(channel).take() {
                textures.release(handle, device)?;
            }
        }
        Ok(())
    }

    fn slot(&mut self, channel: Channel) -> &mut Option<ProbeTexture> {
        match channel {
            Channel::Diffuse => &mut self.diffuse_texture,
            Channel::Specular => &mut self.specular_texture,
        }
    }

    fn render_target_slot(&mut self, channel: Channel) -> &mut Option<RenderTargetHandle> {
        match channel {
            Channel::Diffuse => &mut self.diffuse_render_target,
            Channel::Specular => &mut self.specular_render_target,
        }
    }

    pub(crate) fn drop_specular_render_target(&mut self, device: &mut dyn RenderDevice) {
        self.drop_render_target(Channel::Specular, device);
    }

    pub(crate) fn drop_diffuse_render_target(&mut self, device: &mut dyn RenderDevice) {
        self.drop_render_target(Channel::Diffuse, device);
    }

    fn drop_render_target(&mut self, channel: Channel, device: &mut dyn RenderDevice) {
        if let Some(target) = self.render_target_slot(channel).take() {
            device.release_render_target(target);
        }
    }

    /// Make the channel's slot match the state: adopt a supplied baked
    /// texture, or make sure an owned placeholder exists
    fn reconcile_texture(
        &mut self,
        channel: Channel,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        let baked = match channel {
            Channel::Diffuse => self.state.baked_diffuse_probe_texture,
            Channel::Specular => self.state.baked_specular_probe_texture,
        };

        match (baked, *self.slot(channel)) {
            (Some(baked), current) => {
                if let Some(ProbeTexture::Owned(owned)) = current {
                    self.drop_render_target(channel, device);
                    textures.release(owned, device)?;
                }
                *self.slot(channel) = Some(ProbeTexture::Baked(baked));
            }
            (None, Some(ProbeTexture::Owned(_))) => {}
            (None, current) => {
                let handle = self.alloc_placeholder(channel, textures, device)?;
                *self.slot(channel) = Some(ProbeTexture::Owned(handle));
                if current.is_some() {
                    // The supplied texture went away; the placeholder is empty
                    self.generation += 1;
                    self.invalidate();
                }
            }
        }
        Ok(())
    }

    fn alloc_placeholder(
        &self,
        channel: Channel,
        textures: &mut TextureManager,
        device: &mut dyn RenderDevice,
    ) -> Result<TextureHandle, RenderError> {
        let desc = match channel {
            Channel::Diffuse => TextureDesc::cubemap(
                PLACEHOLDER_DIFFUSE_SIZE,
                1,
                PixelFormat::Rgba8Unorm,
                TextureFlags::CLAMP_NO_MIPMAPS,
            ),
            Channel::Specular => {
                let size = self.size();
                TextureDesc::cubemap(size, full_mip_count(size), PixelFormat::Rgba8Unorm, TextureFlags::CLAMP)
            }
        };

        let name = format!("{}Probe-{}", channel.label(), self.index);
        let handle = textures.alloc(&name, desc, device)?;
        textures.assign_guid(handle)?;
        Ok(handle)
    }

    /// Parameters for capturing one face of this probe
    pub(crate) fn capture_desc(&self) -> CubeFaceCapture {
        CubeFaceCapture {
            layer_mask: self.state.layer_mask,
            filter: match self.state.probe_type {
                ProbeType::Realtime => CaptureFilter::StaticOnly,
                ProbeType::Baked => CaptureFilter::Everything,
            },
            origin: self.state.origin,
            near: self.state.clipping_near,
            far: self.state.clipping_far,
            clear: match self.state.clear_method {
                ClearMethod::SkyClear => CaptureClear::Sky,
                ClearMethod::ColorClear => CaptureClear::Color(self.state.clear_color),
            },
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Counter of changes that invalidate captured content
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &EnvProbeState {
        &self.state
    }

    /// Specular cubemap size for the current resolution tier
    pub fn size(&self) -> u32 {
        to_actual_resolution(self.state.resolution)
    }

    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    pub fn world_aabb(&self) -> Aabb {
        self.world_aabb
    }

    pub fn diffuse_probe_texture(&self) -> Option<TextureHandle> {
        self.diffuse_texture.map(|t| t.handle())
    }

    pub fn specular_probe_texture(&self) -> Option<TextureHandle> {
        self.specular_texture.map(|t| t.handle())
    }

    pub fn diffuse_slot(&self) -> Option<ProbeTexture> {
        self.diffuse_texture
    }

    pub fn specular_slot(&self) -> Option<ProbeTexture> {
        self.specular_texture
    }

    /// A bake captures into the specular texture, so a probe whose specular
    /// channel is supplied by the asset layer cannot be baked
    pub fn is_bakeable(&self) -> bool {
        matches!(self.specular_texture, Some(ProbeTexture::Owned(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;

    fn probe_with(state: EnvProbeState, textures: &mut TextureManager, device: &mut RecordingDevice) -> EnvProbe {
        let mut probe = EnvProbe::new(0);
        probe.update(state, textures, device).unwrap();
        probe
    }

    /// A probe whose textures are considered up to date
    fn refreshed_probe(textures: &mut TextureManager, device: &mut RecordingDevice) -> EnvProbe {
        let mut probe = probe_with(EnvProbeState::default(), textures, device);
        probe.needs_refresh = false;
        probe
    }

    #[test]
    fn test_resolution_table() {
        let expected = [16, 32, 64, 128, 256, 1024, 2048];
        for (tier, size) in Resolution::ALL.iter().zip(expected) {
            assert_eq!(to_actual_resolution(*tier), size);
            assert_eq!(Resolution::from_pixels(size), Some(*tier));
        }
        assert_eq!(Resolution::from_pixels(512), None);
    }

    #[test]
    fn test_new_probe_needs_refresh() {
        let probe = EnvProbe::new(3);
        assert!(probe.needs_refresh());
        assert!(probe.diffuse_probe_texture().is_none());
    }

    #[test]
    fn test_update_allocates_placeholders() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let probe = probe_with(EnvProbeState::default(), &mut textures, &mut device);

        let diffuse = probe.diffuse_probe_texture().unwrap();
        let specular = probe.specular_probe_texture().unwrap();

        let d = textures.desc(diffuse).unwrap();
        assert_eq!((d.size, d.mip_levels), (16, 1));
        assert!(d.flags.clamp && d.flags.no_mipmaps);

        let s = textures.desc(specular).unwrap();
        assert_eq!((s.size, s.mip_levels), (128, 8));
        assert!(!s.flags.no_mipmaps);

        assert!(textures.guid(diffuse).is_some());
        assert!(textures.guid(specular).is_some());
        assert_eq!(textures.find("diffuseProbe-0"), Some(diffuse));
    }

    #[test]
    fn test_identical_state_does_not_invalidate() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let mut probe = refreshed_probe(&mut textures, &mut device);

        probe
            .update(EnvProbeState::default(), &mut textures, &mut device)
            .unwrap();
        assert!(!probe.needs_refresh());
    }

    #[test]
    fn test_origin_change_invalidates() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let mut probe = refreshed_probe(&mut textures, &mut device);

        let state = EnvProbeState {
            origin: Vec3::new(0.0, 0.0, 0.5),
            ..EnvProbeState::default()
        };
        probe.update(state, &mut textures, &mut device).unwrap();
        assert!(probe.needs_refresh());
    }

    #[test]
    fn test_generation_advances_while_already_stale() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let mut probe = probe_with(EnvProbeState::default(), &mut textures, &mut device);
        assert!(probe.needs_refresh());
        let before = probe.generation();

        let moved = EnvProbeState {
            origin: Vec3::new(5.0, 0.0, 0.0),
            ..EnvProbeState::default()
        };
        probe.update(moved.clone(), &mut textures, &mut device).unwrap();
        assert_eq!(probe.generation(), before + 1);

        probe.update(moved, &mut textures, &mut device).unwrap();
        assert_eq!(probe.generation(), before + 1);
    }

    #[test]
    fn test_each_compared_field_invalidates() {
        let base = EnvProbeState::default();
        let variants = [
            EnvProbeState { resolution: Resolution::Resolution256, ..base.clone() },
            EnvProbeState { use_hdr: !base.use_hdr, ..base.clone() },
            EnvProbeState { clear_method: ClearMethod::ColorClear, ..base.clone() },
            EnvProbeState { clipping_near: 0.5, ..base.clone() },
            EnvProbeState { clipping_far: 100.0, ..base.clone() },
        ];

        for state in variants {
            let mut device = RecordingDevice::new();
            let mut textures = TextureManager::new();
            let mut probe = refreshed_probe(&mut textures, &mut device);
            probe.update(state.clone(), &mut textures, &mut device).unwrap();
            assert!(probe.needs_refresh(), "expected invalidation for {:?}", state);
        }
    }

    #[test]
    fn test_clear_color_ignored_without_color_clear() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let mut probe = refreshed_probe(&mut textures, &mut device);

        let state = EnvProbeState {
            clear_color: Color::new(0.2, 0.4, 0.8, 1.0),
            ..EnvProbeState::default()
        };
        probe.update(state, &mut textures, &mut device).unwrap();
        assert!(!probe.needs_refresh());
    }

    #[test]
    fn test_clear_color_counts_with_color_clear() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let color_clear = EnvProbeState {
            clear_method: ClearMethod::ColorClear,
            ..EnvProbeState::default()
        };
        let mut probe = probe_with(color_clear.clone(), &mut textures, &mut device);
        probe.needs_refresh = false;

        let state = EnvProbeState {
            clear_color: Color::new(1.0, 0.0, 0.0, 1.0),
            ..color_clear
        };
        probe.update(state, &mut textures, &mut device).unwrap();
        assert!(probe.needs_refresh());
    }

    #[test]
    fn test_non_compared_fields_do_not_invalidate() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let mut probe = refreshed_probe(&mut textures, &mut device);

        let state = EnvProbeState {
            importance: 9,
            box_size: Vec3::splat(3.0),
            box_offset: Vec3::new(1.0, 0.0, 0.0),
            layer_mask: 0b1010,
            ..EnvProbeState::default()
        };
        probe.update(state, &mut textures, &mut device).unwrap();
        assert!(!probe.needs_refresh());
    }

    #[test]
    fn test_world_aabb() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let state = EnvProbeState {
            origin: Vec3::new(10.0, 0.0, 0.0),
            box_offset: Vec3::new(0.0, 2.0, 0.0),
            box_size: Vec3::new(1.0, 2.0, 3.0),
            ..EnvProbeState::default()
        };
        let probe = probe_with(state, &mut textures, &mut device);

        let aabb = probe.world_aabb();
        assert_eq!(aabb.min, Vec3::new(9.0, 0.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(11.0, 4.0, 3.0));
    }

    #[test]
    fn test_baked_texture_replaces_owned() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let mut probe = probe_with(EnvProbeState::default(), &mut textures, &mut device);
        let owned_diffuse = probe.diffuse_probe_texture().unwrap();

        let baked_desc = TextureDesc::cubemap(64, 1, PixelFormat::Rg11b10Float, TextureFlags::CLAMP_NO_MIPMAPS);
        let baked = textures.alloc("atrium_diffuse", baked_desc, &mut device).unwrap();

        let state = EnvProbeState {
            baked_diffuse_probe_texture: Some(baked),
            ..EnvProbeState::default()
        };
        probe.update(state, &mut textures, &mut device).unwrap();

        assert_eq!(probe.diffuse_probe_texture(), Some(baked));
        assert_eq!(probe.diffuse_slot(), Some(ProbeTexture::Baked(baked)));
        assert!(!textures.contains(owned_diffuse));
        assert!(!device.is_texture_live(owned_diffuse));
        // The asset layer's reference is untouched
        assert_eq!(textures.ref_count(baked), 1);
    }

    #[test]
    fn test_purge_keeps_baked_textures() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let baked_desc = TextureDesc::cubemap(64, 1, PixelFormat::Rgba8Unorm, TextureFlags::CLAMP_NO_MIPMAPS);
        let baked = textures.alloc("hall_diffuse", baked_desc, &mut device).unwrap();

        let state = EnvProbeState {
            baked_diffuse_probe_texture: Some(baked),
            ..EnvProbeState::default()
        };
        let mut probe = probe_with(state, &mut textures, &mut device);
        let owned_specular = probe.specular_probe_texture().unwrap();

        probe.purge(&mut textures, &mut device).unwrap();

        assert!(textures.contains(baked));
        assert!(!textures.contains(owned_specular));
        assert_eq!(textures.len(), 1);
        assert!(probe.specular_probe_texture().is_none());
    }

    #[test]
    fn test_removing_baked_texture_allocates_placeholder() {
        let mut device = RecordingDevice::new();
        let mut textures = TextureManager::new();
        let baked_desc = TextureDesc::cubemap(128, 8, PixelFormat::Rgba8Unorm, TextureFlags::CLAMP);
        let baked = textures.alloc("hall_specular", baked_desc, &mut device).unwrap();

        let baked_state = EnvProbeState {
            baked_specular_probe_texture: Some(baked),
            ..EnvProbeState::default()
        };
        let mut probe = probe_with(baked_state, &mut textures, &mut device);
        assert!(!probe.is_bakeable());

        probe.needs_refresh = false;
        let before = probe.generation();
        probe
            .update(EnvProbeState::default(), &mut textures, &mut device)
            .unwrap();
        assert!(probe.needs_refresh());
        assert!(probe.generation() > before);
        let specular = probe.specular_slot().unwrap();
        assert!(!specular.is_baked());
        assert_ne!(specular.handle(), baked);
        assert!(probe.is_bakeable());
        assert!(textures.contains(baked));
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let mut device = RecordingDevice::new();
        device.fail_allocations(true);
        let mut textures = TextureManager::new();
        let mut probe = EnvProbe::new(0);

        assert!(matches!(
            probe.update(EnvProbeState::default(), &mut textures, &mut device),
            Err(RenderError::AllocationFailed { .. })
        ));
    }
}
