//! Event bus for broadcasting game events

use crate::event::GameEvent;

/// A simple event queue that systems push to and consumers drain
#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<GameEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Drain all events from the bus, returning them
    pub fn drain(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Remove and return only the events matching `pred`, keeping the rest
    /// queued for other consumers
    pub fn take_matching(&mut self, pred: impl Fn(&GameEvent) -> bool) -> Vec<GameEvent> {
        let (taken, kept): (Vec<GameEvent>, Vec<GameEvent>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| pred(e));
        self.events = kept;
        taken
    }

    /// Queued events, oldest first, without consuming them
    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::EntityId;

    #[test]
    fn test_push_and_drain() {
        let mut bus = EventBus::new();
        assert!(bus.is_empty());

        bus.push(GameEvent::AssetReloaded("sky_diffuse".into()));
        bus.push(GameEvent::ProbeBaked(EntityId::new()));
        assert_eq!(bus.len(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_take_matching_keeps_others() {
        let mut bus = EventBus::new();
        let id = EntityId::new();
        bus.push(GameEvent::ProbeRefreshRequested(id));
        bus.push(GameEvent::ProbeBaked(id));

        let taken = bus.take_matching(|e| matches!(e, GameEvent::ProbeRefreshRequested(_)));
        assert_eq!(taken, vec![GameEvent::ProbeRefreshRequested(id)]);
        assert_eq!(bus.drain(), vec![GameEvent::ProbeBaked(id)]);
    }
}
