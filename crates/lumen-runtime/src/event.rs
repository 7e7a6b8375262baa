//! Game events exchanged between systems

use lumen_core::EntityId;

/// Events pushed onto the `EventBus` and drained by interested systems
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// An asset was reloaded; holders of derived state keyed by this name
    /// must re-resolve it
    AssetReloaded(String),
    /// Scripts asked for an environment probe to be re-baked
    ProbeRefreshRequested(EntityId),
    /// An environment probe finished baking
    ProbeBaked(EntityId),
}
