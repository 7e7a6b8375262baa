//! RenderWorld - render-side mirror of the scene's environment probes

use crate::device::RenderDevice;
use crate::env_probe::{EnvProbe, EnvProbeState};
use crate::error::RenderError;
use crate::texture_manager::TextureManager;
use lumen_core::Vec3;
use std::collections::BTreeMap;

/// Non-owning reference to a probe in a `RenderWorld`. Handles are never
/// reused, so a stale handle simply stops resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvProbeHandle(u32);

impl EnvProbeHandle {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EnvProbeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "probe#{}", self.0)
    }
}

/// Owns every environment probe and the textures they reference
#[derive(Default)]
pub struct RenderWorld {
    probes: BTreeMap<EnvProbeHandle, EnvProbe>,
    textures: TextureManager,
    next_probe: u32,
}

impl RenderWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a probe and apply its first state
    pub fn add_env_probe(
        &mut self,
        state: EnvProbeState,
        device: &mut dyn RenderDevice,
    ) -> Result<EnvProbeHandle, RenderError> {
        let handle = EnvProbeHandle(self.next_probe);
        self.next_probe += 1;

        let mut probe = EnvProbe::new(handle.0);
        if let Err(e) = probe.update(state, &mut self.textures, device) {
            probe.purge(&mut self.textures, device)?;
            return Err(e);
        }
        self.probes.insert(handle, probe);
        log::debug!("added environment {}", handle);
        Ok(handle)
    }

    pub fn update_env_probe(
        &mut self,
        handle: EnvProbeHandle,
        state: EnvProbeState,
        device: &mut dyn RenderDevice,
    ) -> Result<(), RenderError> {
        match self.probes.get_mut(&handle) {
            Some(probe) => probe.update(state, &mut self.textures, device),
            None => Ok(()),
        }
    }

    /// Remove a probe, releasing the textures it owns
    pub fn remove_env_probe(&mut self, handle: EnvProbeHandle, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        if let Some(mut probe) = self.probes.remove(&handle) {
            probe.purge(&mut self.textures, device)?;
            log::debug!("removed environment {}", handle);
        }
        Ok(())
    }

    pub fn env_probe(&self, handle: EnvProbeHandle) -> Option<&EnvProbe> {
        self.probes.get(&handle)
    }

    pub fn env_probe_mut(&mut self, handle: EnvProbeHandle) -> Option<&mut EnvProbe> {
        self.probes.get_mut(&handle)
    }

    /// A probe together with the texture manager, for operations that
    /// touch both
    pub fn probe_with_textures_mut(&mut self, handle: EnvProbeHandle) -> Option<(&mut EnvProbe, &mut TextureManager)> {
        let probe = self.probes.get_mut(&handle)?;
        Some((probe, &mut self.textures))
    }

    /// All probes in handle order
    pub fn env_probes(&self) -> impl Iterator<Item = (EnvProbeHandle, &EnvProbe)> {
        self.probes.iter().map(|(h, p)| (*h, p))
    }

    /// Probes whose influence box contains `point`, smallest box first
    pub fn probes_containing(&self, point: Vec3) -> Vec<EnvProbeHandle> {
        let mut hits: Vec<(EnvProbeHandle, f32)> = self
            .probes
            .iter()
            .filter(|(_, p)| p.world_aabb().contains_point(point))
            .map(|(h, p)| (*h, p.world_aabb().volume()))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.into_iter().map(|(h, _)| h).collect()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut TextureManager {
        &mut self.textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;

    fn state_at(origin: Vec3, half: f32) -> EnvProbeState {
        EnvProbeState {
            origin,
            box_size: Vec3::splat(half),
            ..EnvProbeState::default()
        }
    }

    #[test]
    fn test_add_and_remove() {
        let mut device = RecordingDevice::new();
        let mut world = RenderWorld::new();

        let a = world.add_env_probe(EnvProbeState::default(), &mut device).unwrap();
        let b = world.add_env_probe(EnvProbeState::default(), &mut device).unwrap();
        assert_ne!(a, b);
        assert_eq!(world.probe_count(), 2);
        assert_eq!(world.textures().len(), 4);

        world.remove_env_probe(a, &mut device).unwrap();
        assert!(world.env_probe(a).is_none());
        assert_eq!(world.textures().len(), 2);
        assert_eq!(device.live_texture_count(), 2);

        // Removing twice is harmless
        world.remove_env_probe(a, &mut device).unwrap();
    }

    #[test]
    fn test_handles_not_reused() {
        let mut device = RecordingDevice::new();
        let mut world = RenderWorld::new();

        let a = world.add_env_probe(EnvProbeState::default(), &mut device).unwrap();
        world.remove_env_probe(a, &mut device).unwrap();
        let b = world.add_env_probe(EnvProbeState::default(), &mut device).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_failed_add_leaves_nothing_behind() {
        let mut device = RecordingDevice::new();
        device.fail_allocations(true);
        let mut world = RenderWorld::new();

        assert!(world.add_env_probe(EnvProbeState::default(), &mut device).is_err());
        assert_eq!(world.probe_count(), 0);
        assert!(world.textures().is_empty());
    }

    #[test]
    fn test_probes_containing_prefers_smaller_boxes() {
        let mut device = RecordingDevice::new();
        let mut world = RenderWorld::new();

        let hall = world.add_env_probe(state_at(Vec3::ZERO, 20.0), &mut device).unwrap();
        let alcove = world
            .add_env_probe(state_at(Vec3::new(5.0, 0.0, 0.0), 2.0), &mut device)
            .unwrap();
        let _far = world
            .add_env_probe(state_at(Vec3::new(100.0, 0.0, 0.0), 2.0), &mut device)
            .unwrap();

        assert_eq!(world.probes_containing(Vec3::new(5.5, 0.0, 0.0)), vec![alcove, hall]);
        assert_eq!(world.probes_containing(Vec3::new(-10.0, 0.0, 0.0)), vec![hall]);
        assert!(world.probes_containing(Vec3::new(0.0, 50.0, 0.0)).is_empty());
    }
}
