use std::path::Path;

use serde::{Deserialize, Serialize};

use brawl::{Level, MovementConfig, TestingGround};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// RTT samples kept for the mean and spread.
    pub sample_window: usize,
    pub probe_interval_ms: f64,
    pub probe_timeout_ms: f64,
    /// Consecutive timeouts before the link is reported degraded.
    pub degraded_after_timeouts: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sample_window: 5,
            probe_interval_ms: 250.0,
            probe_timeout_ms: 1000.0,
            degraded_after_timeouts: 3,
        }
    }
}

/// Render delay is `base_delay_ms + jitter_multiplier * smoothed jitter`.
/// The multiplier is empirical; tune it, nothing depends on its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    pub base_delay_ms: f64,
    pub jitter_multiplier: f64,
    pub buffer_capacity: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50.0,
            jitter_multiplier: 2.0,
            buffer_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Position/velocity tolerance below which a prediction counts as
    /// confirmed.
    pub epsilon: f32,
    pub history_capacity: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            history_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub tick_rate: u32,
    pub max_frame_delta_secs: f32,
    pub projectile_pool_capacity: usize,
    pub event_queue_capacity: usize,
    pub movement: MovementConfig,
    pub level: Level,
    pub clock: ClockConfig,
    pub interpolation: InterpolationConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: brawl::DEFAULT_TICK_RATE,
            max_frame_delta_secs: 0.25,
            projectile_pool_capacity: 64,
            event_queue_capacity: 64,
            movement: MovementConfig::default(),
            level: TestingGround::level(),
            clock: ClockConfig::default(),
            interpolation: InterpolationConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_ron_str(&source)?;
        log::info!("Loaded client config from {}", path.display());
        Ok(config)
    }

    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}
