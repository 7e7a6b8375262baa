//! Frame clock

use std::time::Instant;

/// Tracks frame time for the frame loop.
///
/// With a fixed frame step (headless baking, tests) every tick advances by
/// exactly that step regardless of wall-clock time.
pub struct GameClock {
    /// Total elapsed game time in seconds
    pub total_time: f64,
    /// Time since last frame in seconds
    pub delta_time: f64,
    /// Number of ticks so far
    pub frame: u64,
    fixed_step: Option<f64>,
    last_instant: Option<Instant>,
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl GameClock {
    /// Wall-clock driven clock
    pub fn new() -> Self {
        Self {
            total_time: 0.0,
            delta_time: 0.0,
            frame: 0,
            fixed_step: None,
            last_instant: None,
        }
    }

    /// Clock that advances by `1 / hz` per tick
    pub fn with_fixed_rate(hz: f64) -> Self {
        Self {
            fixed_step: Some(1.0 / hz),
            ..Self::new()
        }
    }

    /// Advance the clock. Call once per frame.
    pub fn tick(&mut self) {
        self.frame += 1;

        self.delta_time = match self.fixed_step {
            Some(step) => step,
            None => {
                let now = Instant::now();
                // First tick has no previous frame to measure against
                let elapsed = self
                    .last_instant
                    .map(|last| now.duration_since(last).as_secs_f64())
                    .unwrap_or(0.0);
                self.last_instant = Some(now);
                // Clamp long stalls (debugger, window drag) to 250ms
                elapsed.min(0.25)
            }
        };

        self.total_time += self.delta_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_zero_delta() {
        let mut clock = GameClock::new();
        clock.tick();
        assert_eq!(clock.delta_time, 0.0);
        assert_eq!(clock.frame, 1);
    }

    #[test]
    fn test_fixed_rate_ticks() {
        let mut clock = GameClock::with_fixed_rate(60.0);
        for _ in 0..60 {
            clock.tick();
        }
        assert_eq!(clock.frame, 60);
        assert!((clock.total_time - 1.0).abs() < 1e-9);
        assert!((clock.delta_time - 1.0 / 60.0).abs() < 1e-12);
    }
}
