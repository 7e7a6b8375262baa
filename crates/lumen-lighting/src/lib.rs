//! Lumen Lighting - environment probes in the frame loop
//!
//! Reads `environment_probe` components from the world, mirrors them into
//! a `RenderWorld` and advances their bakes a bounded amount each frame.

pub mod component;
pub mod sync;

use lumen_core::Result;
use lumen_ecs::LumenWorld;
use lumen_render::{ProbeScheduler, RenderDevice, RenderWorld, SchedulerConfig, TickReport};
use lumen_runtime::{EventBus, GameEvent, RuntimeSystem};

pub use component::{EnvironmentProbeConfig, COMPONENT_NAME};
pub use sync::ProbeSync;

/// The environment probe system, generic over the device bakes run on
pub struct ProbeSystem<D: RenderDevice> {
    pub sync: ProbeSync,
    render_world: RenderWorld,
    scheduler: ProbeScheduler,
    device: D,
    last_report: TickReport,
}

impl<D: RenderDevice> ProbeSystem<D> {
    pub fn new(device: D, config: SchedulerConfig) -> Self {
        Self {
            sync: ProbeSync::new(),
            render_world: RenderWorld::new(),
            scheduler: ProbeScheduler::new(config),
            device,
            last_report: TickReport::default(),
        }
    }

    pub fn render_world(&self) -> &RenderWorld {
        &self.render_world
    }

    /// Mutable access, e.g. for the asset layer to load baked textures
    pub fn render_world_mut(&mut self) -> &mut RenderWorld {
        &mut self.render_world
    }

    pub fn scheduler(&self) -> &ProbeScheduler {
        &self.scheduler
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The render world together with the device, for loading textures
    pub fn resources_mut(&mut self) -> (&mut RenderWorld, &mut D) {
        (&mut self.render_world, &mut self.device)
    }

    /// What the scheduler did on the most recent frame
    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// No bake is in flight
    pub fn is_idle(&self) -> bool {
        self.scheduler.pending() == 0
    }

    fn sync(&mut self, world: &LumenWorld) -> Result<()> {
        self.sync
            .sync_from_world(world, &mut self.render_world, &mut self.scheduler, &mut self.device)
    }
}

impl<D: RenderDevice> RuntimeSystem for ProbeSystem<D> {
    fn initialize(&mut self, world: &mut LumenWorld) -> Result<()> {
        self.sync(world)?;
        let count = self.sync.probe_count();
        if count > 0 {
            log::info!("discovered {} environment probe(s)", count);
        }
        Ok(())
    }

    fn update(&mut self, world: &mut LumenWorld, events: &mut EventBus, _dt: f64) -> Result<()> {
        let reloaded: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::AssetReloaded(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        for name in reloaded {
            let affected = self.sync.on_asset_reloaded(&name);
            if affected > 0 {
                log::debug!("'{}' reloaded, re-resolving {} probe(s)", name, affected);
            }
        }

        self.sync(world)?;

        for event in events.take_matching(|e| matches!(e, GameEvent::ProbeRefreshRequested(_))) {
            let GameEvent::ProbeRefreshRequested(entity) = event else {
                continue;
            };
            match self.sync.handle_for(entity) {
                Some(handle) => {
                    self.scheduler.force_refresh(handle, &mut self.render_world);
                }
                None => log::warn!("refresh requested for entity {} which has no environment probe", entity),
            }
        }

        let report = self.scheduler.tick(&mut self.render_world, &mut self.device)?;
        for handle in &report.completed {
            if let Some(entity) = self.sync.entity_for(*handle) {
                events.push(GameEvent::ProbeBaked(entity));
            }
        }
        self.last_report = report;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.sync
            .clear(&mut self.render_world, &mut self.scheduler, &mut self.device)
    }

    fn name(&self) -> &str {
        "probes"
    }
}
