//! Frame-level scheduling of environment probe bakes
//!
//! The scheduler owns at most one `EnvProbeJob` per probe and decides, once
//! per frame, which jobs advance and by how many passes.

use crate::device::RenderDevice;
use crate::env_probe::{ProbeType, RefreshMode, TimeSlicing};
use crate::env_probe_job::{BakePhase, EnvProbeJob};
use crate::error::RenderError;
use crate::render_world::{EnvProbeHandle, RenderWorld};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Passes allowed per tick across all time-sliced jobs
    pub max_steps_per_tick: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_steps_per_tick: 16 }
    }
}

/// What one `tick` did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Probes whose bake completed this tick
    pub completed: Vec<EnvProbeHandle>,
    /// Passes submitted this tick
    pub steps: u32,
    /// Jobs still in flight after the tick
    pub pending: usize,
}

#[derive(Default)]
pub struct ProbeScheduler {
    config: SchedulerConfig,
    jobs: BTreeMap<EnvProbeHandle, EnvProbeJob>,
    awake: BTreeSet<EnvProbeHandle>,
}

impl ProbeScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            jobs: BTreeMap::new(),
            awake: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Queue a bake of `handle`. Returns whether a job exists afterwards;
    /// scheduling an already scheduled probe keeps its job.
    pub fn schedule(&mut self, handle: EnvProbeHandle, world: &RenderWorld) -> bool {
        if self.jobs.contains_key(&handle) {
            return true;
        }
        let Some(probe) = world.env_probe(handle) else {
            return false;
        };
        if !probe.is_bakeable() {
            log::debug!("{} uses a supplied specular texture, not baking", handle);
            return false;
        }
        self.jobs.insert(handle, EnvProbeJob::new(handle, probe));
        log::debug!("scheduled bake of {}", handle);
        true
    }

    /// First activation of a probe: bake it if its type and refresh mode
    /// ask for an initial capture
    pub fn on_probe_awake(&mut self, handle: EnvProbeHandle, world: &RenderWorld) {
        let Some(probe) = world.env_probe(handle) else {
            return;
        };
        self.awake.insert(handle);

        let state = probe.state();
        let wants_bake = match state.probe_type {
            ProbeType::Baked => true,
            ProbeType::Realtime => matches!(state.refresh_mode, RefreshMode::OnAwake | RefreshMode::EveryFrame),
        };
        if wants_bake && probe.needs_refresh() {
            self.schedule(handle, world);
        }
    }

    /// Invalidate a probe and make sure a bake is queued. Probes whose
    /// specular texture is supplied are left untouched.
    pub fn force_refresh(&mut self, handle: EnvProbeHandle, world: &mut RenderWorld) -> bool {
        match world.env_probe_mut(handle) {
            Some(probe) if probe.is_bakeable() => probe.invalidate(),
            Some(_) => {
                log::debug!("{} uses a supplied specular texture, ignoring refresh", handle);
                return false;
            }
            None => return false,
        }
        self.schedule(handle, world)
    }

    /// Drop the probe's job, if any. Committed passes stay; the probe keeps
    /// needing refresh.
    pub fn cancel(&mut self, handle: EnvProbeHandle) {
        if self.jobs.remove(&handle).is_some() {
            log::debug!("cancelled bake of {}", handle);
        }
        self.awake.remove(&handle);
    }

    pub fn is_scheduled(&self, handle: EnvProbeHandle) -> bool {
        self.jobs.contains_key(&handle)
    }

    pub fn job(&self, handle: EnvProbeHandle) -> Option<&EnvProbeJob> {
        self.jobs.get(&handle)
    }

    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    /// Probes with a bake in flight
    pub fn scheduled(&self) -> impl Iterator<Item = EnvProbeHandle> + '_ {
        self.jobs.keys().copied()
    }

    /// Advance scheduled bakes by one frame's worth of work
    pub fn tick(&mut self, world: &mut RenderWorld, device: &mut dyn RenderDevice) -> Result<TickReport, RenderError> {
        self.jobs.retain(|handle, _| world.env_probe(*handle).is_some());
        self.awake.retain(|handle| world.env_probe(*handle).is_some());

        self.reschedule_every_frame(world);
        self.restart_stale_jobs(world);

        let mut report = TickReport::default();
        for handle in self.run_order(world) {
            let slicing = match world.env_probe(handle) {
                Some(probe) => probe.state().time_slicing,
                None => continue,
            };
            if slicing != TimeSlicing::NoTimeSlicing && report.steps >= self.config.max_steps_per_tick {
                continue;
            }
            let Some(job) = self.jobs.get_mut(&handle) else {
                continue;
            };
            let Some((probe, textures)) = world.probe_with_textures_mut(handle) else {
                continue;
            };

            let mut finished = false;
            match slicing {
                TimeSlicing::IndividualFaces => {
                    finished = job.refresh(probe, textures, device)?;
                    report.steps += 1;
                }
                TimeSlicing::AllFacesAtOnce => {
                    let burst = job.phase() == BakePhase::CaptureFaces;
                    loop {
                        finished = job.refresh(probe, textures, device)?;
                        report.steps += 1;
                        if finished || !burst || job.phase() != BakePhase::CaptureFaces {
                            break;
                        }
                    }
                }
                TimeSlicing::NoTimeSlicing => {
                    while !finished {
                        finished = job.refresh(probe, textures, device)?;
                        report.steps += 1;
                    }
                }
            }

            if finished {
                self.jobs.remove(&handle);
                report.completed.push(handle);
            }
        }

        report.pending = self.jobs.len();
        Ok(report)
    }

    /// Realtime every-frame probes start a new bake as soon as the previous
    /// one completes
    fn reschedule_every_frame(&mut self, world: &mut RenderWorld) {
        let due: Vec<EnvProbeHandle> = self
            .awake
            .iter()
            .copied()
            .filter(|handle| !self.jobs.contains_key(handle))
            .filter(|handle| {
                world.env_probe(*handle).is_some_and(|p| {
                    p.state().probe_type == ProbeType::Realtime && p.state().refresh_mode == RefreshMode::EveryFrame
                })
            })
            .collect();

        for handle in due {
            self.force_refresh(handle, world);
        }
    }

    /// Drop jobs whose probe adopted a supplied specular texture and start
    /// over jobs whose probe changed since their first pass
    fn restart_stale_jobs(&mut self, world: &RenderWorld) {
        self.jobs.retain(|handle, _| {
            let bakeable = world.env_probe(*handle).is_some_and(|p| p.is_bakeable());
            if !bakeable {
                log::debug!("{} now uses a supplied specular texture, dropping its bake", handle);
            }
            bakeable
        });

        for (handle, job) in self.jobs.iter_mut() {
            let Some(probe) = world.env_probe(*handle) else {
                continue;
            };
            if job.is_stale_for(probe) {
                log::debug!("{} changed mid-bake, restarting", handle);
                *job = EnvProbeJob::new(*handle, probe);
            }
        }
    }

    /// Scheduled probes, most important first
    fn run_order(&self, world: &RenderWorld) -> Vec<EnvProbeHandle> {
        let mut order: Vec<(i32, EnvProbeHandle)> = self
            .jobs
            .keys()
            .filter_map(|h| world.env_probe(*h).map(|p| (p.state().importance, *h)))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        order.into_iter().map(|(_, h)| h).collect()
    }
}
