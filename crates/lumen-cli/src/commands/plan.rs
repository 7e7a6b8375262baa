//! Print the pass sequence of a single probe bake

use anyhow::{anyhow, Result};
use lumen_render::{
    to_actual_resolution, DeviceCall, EnvProbeJob, EnvProbeState, RecordingDevice, RenderWorld, Resolution,
};

pub fn run(resolution: u32, hdr: bool) -> Result<()> {
    let tier = Resolution::from_pixels(resolution).ok_or_else(|| {
        let sizes: Vec<String> = Resolution::ALL
            .iter()
            .map(|r| to_actual_resolution(*r).to_string())
            .collect();
        anyhow!("unsupported probe resolution {}; valid values: {}", resolution, sizes.join(", "))
    })?;

    let mut device = RecordingDevice::new();
    let mut world = RenderWorld::new();
    let state = EnvProbeState {
        resolution: tier,
        use_hdr: hdr,
        ..EnvProbeState::default()
    };
    let handle = world.add_env_probe(state, &mut device)?;
    let probe = world
        .env_probe(handle)
        .ok_or_else(|| anyhow!("probe vanished after creation"))?;
    let mut job = EnvProbeJob::new(handle, probe);

    println!(
        "{}px {} probe: {} passes",
        resolution,
        if hdr { "HDR" } else { "LDR" },
        EnvProbeJob::total_steps(tier)
    );

    device.take_calls();
    let mut step = 0;
    loop {
        step += 1;
        let phase = job.phase();
        let (probe, textures) = world
            .probe_with_textures_mut(handle)
            .ok_or_else(|| anyhow!("probe vanished during bake"))?;
        let done = job.refresh(probe, textures, &mut device)?;

        let work: Vec<DeviceCall> = device.take_calls().into_iter().filter(|c| c.is_work()).collect();
        for call in &work {
            println!("{:>3}  {:<20} {}", step, format!("{:?}", phase), describe(call, resolution));
        }
        if done {
            break;
        }
    }

    if let Some(probe) = world.env_probe(handle) {
        for (label, texture) in [
            ("diffuse", probe.diffuse_probe_texture()),
            ("specular", probe.specular_probe_texture()),
        ] {
            if let Some(desc) = texture.and_then(|t| world.textures().desc(t)) {
                println!(
                    "{:<9} {}x{} {:?}, {} mip(s)",
                    label, desc.size, desc.size, desc.format, desc.mip_levels
                );
            }
        }
    }
    Ok(())
}

fn describe(call: &DeviceCall, size: u32) -> String {
    match call {
        DeviceCall::CaptureFace { face, capture, .. } => format!("capture {:?} ({:?})", face, capture.filter),
        DeviceCall::ConvolveIrradiance { .. } => "irradiance convolution".to_string(),
        DeviceCall::ConvolveGgxMip { level, max_level, .. } => format!(
            "GGX mip {} ({}px, roughness {:.2})",
            level,
            (size >> level).max(1),
            *level as f32 / *max_level as f32
        ),
        other => format!("{:?}", other),
    }
}
