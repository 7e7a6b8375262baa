//! Runtime system trait

use crate::event_bus::EventBus;
use lumen_core::Result;
use lumen_ecs::LumenWorld;

/// A system that can be ticked by the frame loop
///
/// Systems are updated in registration order, once per frame, on the
/// frame thread. A system that has GPU work to do issues a bounded amount
/// of it per `update` and picks up where it left off next frame.
pub trait RuntimeSystem {
    /// Called once when the system is first registered
    fn initialize(&mut self, world: &mut LumenWorld) -> Result<()>;

    /// Called once per frame
    fn update(&mut self, world: &mut LumenWorld, events: &mut EventBus, dt: f64) -> Result<()>;

    /// Called when the system is being shut down
    fn shutdown(&mut self) -> Result<()>;

    /// Human-readable name for this system
    fn name(&self) -> &str;
}
