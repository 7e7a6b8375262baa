//! Lumen Runtime - Frame loop infrastructure
//!
//! Provides the core frame loop building blocks:
//! - `GameClock`: frame timing with an optional fixed frame step
//! - `GameEvent` / `EventBus`: typed event queue for inter-system communication
//! - `RuntimeSystem`: trait for systems ticked by the frame loop

mod clock;
mod event;
mod event_bus;
mod system;

pub use clock::GameClock;
pub use event::GameEvent;
pub use event_bus::EventBus;
pub use system::RuntimeSystem;
