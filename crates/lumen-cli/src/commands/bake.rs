//! Scene probe bake command

use anyhow::{bail, Context, Result};
use lumen_ecs::LumenWorld;
use lumen_lighting::ProbeSystem;
use lumen_render::{
    DeviceCall, EnvProbeHandle, GpuContext, RecordingDevice, RenderDevice, SchedulerConfig, WgpuProbeDevice,
};
use lumen_runtime::{EventBus, GameClock, GameEvent, RuntimeSystem};
use lumen_scene::load_scene;
use std::collections::BTreeSet;

pub struct BakeArgs {
    pub scene: String,
    pub dry_run: bool,
    pub max_frames: u64,
    pub steps_per_tick: u32,
}

pub fn run(args: BakeArgs) -> Result<()> {
    let (mut world, scene_file) = load_scene(&args.scene).context("Failed to load scene")?;
    println!("Loaded scene: {}", scene_file.scene.name);
    println!("Entities: {}", world.entity_count());

    let config = SchedulerConfig {
        max_steps_per_tick: args.steps_per_tick.max(1),
    };

    if args.dry_run {
        let mut system = ProbeSystem::new(RecordingDevice::new(), config);
        let frames = bake_frames(&mut system, &mut world, args.max_frames)?;
        print_recorded_work(system.device().calls());
        println!("Dry run finished in {} frame(s)", frames);
        system.shutdown()?;
    } else {
        let context = pollster::block_on(GpuContext::new()).context("Failed to create headless GPU context")?;
        let mut system = ProbeSystem::new(WgpuProbeDevice::new(context), config);
        let frames = bake_frames(&mut system, &mut world, args.max_frames)?;
        system.device().context().wait_idle();
        println!(
            "Baked in {} frame(s), {} GPU submission(s)",
            frames,
            system.device().submissions()
        );
        system.shutdown()?;
    }
    Ok(())
}

/// Run frames until every scheduled probe has completed at least one bake;
/// returns the number of frames. Every-frame probes are rescheduled as soon
/// as they finish, so waiting for an idle scheduler would never end.
fn bake_frames<D: RenderDevice>(system: &mut ProbeSystem<D>, world: &mut LumenWorld, max_frames: u64) -> Result<u64> {
    let mut events = EventBus::new();
    let mut clock = GameClock::with_fixed_rate(60.0);

    system.initialize(world)?;
    if system.sync.probe_count() == 0 {
        println!("No environment probes in scene");
        return Ok(0);
    }

    // Probes that only refresh on request are baked by the tool regardless
    for entity in world.entities_with(lumen_lighting::COMPONENT_NAME) {
        events.push(GameEvent::ProbeRefreshRequested(entity));
    }

    let mut baked: BTreeSet<EnvProbeHandle> = BTreeSet::new();
    while clock.frame == 0 || !all_baked(system, &baked) {
        if clock.frame >= max_frames {
            bail!("{} probe(s) still baking after {} frames", system.scheduler().pending(), max_frames);
        }
        clock.tick();
        system.update(world, &mut events, clock.delta_time)?;

        let report = system.last_report();
        log::debug!(
            "frame {}: {} pass(es), {} bake(s) pending",
            clock.frame,
            report.steps,
            report.pending
        );
        for event in events.drain() {
            let GameEvent::ProbeBaked(entity) = event else {
                continue;
            };
            let Some(handle) = system.sync.handle_for(entity) else {
                continue;
            };
            if baked.insert(handle) {
                println!(
                    "  baked '{}' at frame {}",
                    world.get_name(entity).unwrap_or("?"),
                    clock.frame
                );
            }
        }
    }
    Ok(clock.frame)
}

fn all_baked<D: RenderDevice>(system: &ProbeSystem<D>, baked: &BTreeSet<EnvProbeHandle>) -> bool {
    system.scheduler().scheduled().all(|handle| baked.contains(&handle))
}

fn print_recorded_work(calls: &[DeviceCall]) {
    let mut captures = 0;
    let mut irradiance = 0;
    let mut ggx = 0;
    for call in calls {
        match call {
            DeviceCall::CaptureFace { .. } => captures += 1,
            DeviceCall::ConvolveIrradiance { .. } => irradiance += 1,
            DeviceCall::ConvolveGgxMip { .. } => ggx += 1,
            _ => {}
        }
    }
    println!("Face captures:            {}", captures);
    println!("Irradiance convolutions:  {}", irradiance);
    println!("GGX mip convolutions:     {}", ggx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_scene::load_scene_string;

    #[test]
    fn test_bake_finishes_with_every_frame_entity() {
        let scene = r#"
[scene]
name = "Foyer"

[entities.mirror]
environment_probe = { resolution = 16, refresh_mode = "every_frame", time_slicing = "all_faces_at_once" }

[entities.alcove]
environment_probe = { resolution = 16 }
"#;
        let (mut world, _) = load_scene_string(scene).unwrap();
        let mut system = ProbeSystem::new(RecordingDevice::new(), SchedulerConfig::default());

        let frames = bake_frames(&mut system, &mut world, 100).unwrap();

        // alcove: 11 single-pass frames; mirror keeps rebaking meanwhile
        assert_eq!(frames, 11);
        let mirror = system.sync.handle_for(world.get_id("mirror").unwrap()).unwrap();
        assert!(system.scheduler().is_scheduled(mirror));
    }

    #[test]
    fn test_bake_gives_up_after_max_frames() {
        let scene = r#"
[scene]
name = "Tower"

[entities.top]
environment_probe = { resolution = 2048 }
"#;
        let (mut world, _) = load_scene_string(scene).unwrap();
        let mut system = ProbeSystem::new(RecordingDevice::new(), SchedulerConfig::default());
        assert!(bake_frames(&mut system, &mut world, 3).is_err());
    }
}
