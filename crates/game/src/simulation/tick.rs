/// Converts variable frame deltas into whole fixed-size ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    max_frame_delta: f32,
    accumulator: f32,
    tick: u32,
}

impl FixedTimestep {
    const DEFAULT_MAX_FRAME_DELTA: f32 = 0.25;

    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            max_frame_delta: Self::DEFAULT_MAX_FRAME_DELTA,
            accumulator: 0.0,
            tick: 0,
        }
    }

    /// Caps how much wall time one frame may feed in, so a long stall
    /// catches up over several frames instead of a burst of ticks.
    pub fn with_max_frame_delta(mut self, max_frame_delta: f32) -> Self {
        self.max_frame_delta = max_frame_delta.max(self.dt);
        self
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn dt_ms(&self) -> f64 {
        1000.0 / self.tick_rate as f64
    }

    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    pub fn accumulate(&mut self, delta: f32) {
        if delta.is_finite() && delta > 0.0 {
            self.accumulator += delta.min(self.max_frame_delta);
        }
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> Option<u32> {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            let tick = self.tick;
            self.tick = self.tick.wrapping_add(1);
            Some(tick)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.tick = 0;
    }
}
