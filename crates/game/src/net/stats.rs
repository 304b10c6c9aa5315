use rand::Rng;
use serde::{Deserialize, Serialize};

/// Artificial network conditions for one direction of a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub enabled: bool,
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LinkConditions {
    pub fn latency(latency_ms: u32, jitter_ms: u32) -> Self {
        Self {
            enabled: true,
            loss_percent: 0.0,
            min_latency_ms: latency_ms,
            max_latency_ms: latency_ms,
            jitter_ms,
        }
    }

    pub fn should_drop(&self, rng: &mut impl Rng) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rng.random::<f32>() * 100.0 < self.loss_percent
    }

    pub fn delay_ms(&self, rng: &mut impl Rng) -> u32 {
        if !self.enabled {
            return 0;
        }
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        self.min_latency_ms + spread(rng, range) + spread(rng, self.jitter_ms)
    }
}

/// Uniform in `[0, width)`, or zero for an empty window.
fn spread(rng: &mut impl Rng, width: u32) -> u32 {
    if width == 0 {
        0
    } else {
        rng.random_range(0..width)
    }
}
