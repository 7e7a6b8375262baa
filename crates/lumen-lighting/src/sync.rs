//! Bridges ECS `environment_probe` components to render-side probes
//!
//! Each entity carrying the component goes through init (first sighting,
//! probe created), awake (initial bake scheduled per refresh mode), update
//! (state pushed whenever it changes) and purge (entity or component gone,
//! probe and job dropped).

use crate::component::{EnvironmentProbeConfig, COMPONENT_NAME};
use lumen_core::{EntityId, Result, Vec3};
use lumen_ecs::LumenWorld;
use lumen_render::{EnvProbeHandle, EnvProbeState, ProbeScheduler, RenderDevice, RenderWorld};
use std::collections::{BTreeMap, HashSet};

struct ProbeBinding {
    handle: EnvProbeHandle,
    config: EnvironmentProbeConfig,
    /// Last state pushed to the probe; `None` forces a push on next sync
    pushed: Option<EnvProbeState>,
    awake: bool,
}

/// Per-entity probe bookkeeping
#[derive(Default)]
pub struct ProbeSync {
    bindings: BTreeMap<EntityId, ProbeBinding>,
}

impl ProbeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the world for probe components and reconcile render-side probes
    pub fn sync_from_world(
        &mut self,
        world: &LumenWorld,
        render: &mut RenderWorld,
        scheduler: &mut ProbeScheduler,
        device: &mut dyn RenderDevice,
    ) -> Result<()> {
        let mut seen = HashSet::new();

        for id in world.entities_with(COMPONENT_NAME) {
            let Some(table) = world.get_component(id, COMPONENT_NAME).and_then(|v| v.as_table()) else {
                continue;
            };
            seen.insert(id);

            let config = EnvironmentProbeConfig::from_toml(table)?;
            let origin = world.get_world_position(id).unwrap_or(Vec3::ZERO);
            let state = config.to_state(origin, render.textures());

            match self.bindings.get_mut(&id) {
                Some(binding) => {
                    if binding.pushed.as_ref() != Some(&state) {
                        render.update_env_probe(binding.handle, state.clone(), device)?;
                        binding.pushed = Some(state);
                    }
                    binding.config = config;
                }
                None => {
                    let handle = render.add_env_probe(state.clone(), device)?;
                    log::info!(
                        "environment probe '{}' ({}px)",
                        world.get_name(id).unwrap_or("?"),
                        lumen_render::to_actual_resolution(state.resolution)
                    );
                    self.bindings.insert(
                        id,
                        ProbeBinding {
                            handle,
                            config,
                            pushed: Some(state),
                            awake: false,
                        },
                    );
                }
            }
        }

        for binding in self.bindings.values_mut().filter(|b| !b.awake) {
            scheduler.on_probe_awake(binding.handle, render);
            binding.awake = true;
        }

        let gone: Vec<EntityId> = self.bindings.keys().copied().filter(|id| !seen.contains(id)).collect();
        for id in gone {
            if let Some(binding) = self.bindings.remove(&id) {
                scheduler.cancel(binding.handle);
                render.remove_env_probe(binding.handle, device)?;
                log::debug!("purged environment probe of entity {}", id);
            }
        }

        Ok(())
    }

    /// Force probes that use the named texture to re-resolve it on the next
    /// sync. Returns how many probes are affected.
    pub fn on_asset_reloaded(&mut self, name: &str) -> usize {
        let mut affected = 0;
        for binding in self.bindings.values_mut() {
            if binding.config.references_texture(name) {
                binding.pushed = None;
                affected += 1;
            }
        }
        affected
    }

    /// Drop every probe, as on scene unload
    pub fn clear(
        &mut self,
        render: &mut RenderWorld,
        scheduler: &mut ProbeScheduler,
        device: &mut dyn RenderDevice,
    ) -> Result<()> {
        for (_, binding) in std::mem::take(&mut self.bindings) {
            scheduler.cancel(binding.handle);
            render.remove_env_probe(binding.handle, device)?;
        }
        Ok(())
    }

    pub fn handle_for(&self, entity: EntityId) -> Option<EnvProbeHandle> {
        self.bindings.get(&entity).map(|b| b.handle)
    }

    pub fn entity_for(&self, handle: EnvProbeHandle) -> Option<EntityId> {
        self.bindings
            .iter()
            .find(|(_, b)| b.handle == handle)
            .map(|(id, _)| *id)
    }

    pub fn probe_count(&self) -> usize {
        self.bindings.len()
    }
}
