use std::collections::{HashMap, VecDeque};

use glam::Vec2;

use brawl::NetcodeError;

use super::clock::ClockEstimate;
use super::config::InterpolationConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteSample {
    pub position: Vec2,
    pub velocity: Option<Vec2>,
    /// Server time the sample describes.
    pub timestamp_ms: f64,
}

impl RemoteSample {
    pub fn new(position: Vec2, timestamp_ms: f64) -> Self {
        Self {
            position,
            velocity: None,
            timestamp_ms,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bracket {
    Between { from: usize, to: usize, t: f32 },
    /// Render time is outside the buffered range; hold this sample.
    Nearest(usize),
}

#[derive(Debug, Default)]
struct SampleBuffer {
    samples: VecDeque<RemoteSample>,
}

impl SampleBuffer {
    fn insert(&mut self, sample: RemoteSample, capacity: usize) {
        let index = self
            .samples
            .iter()
            .position(|s| s.timestamp_ms >= sample.timestamp_ms)
            .unwrap_or(self.samples.len());

        if self
            .samples
            .get(index)
            .is_some_and(|s| s.timestamp_ms == sample.timestamp_ms)
        {
            self.samples[index] = sample;
            return;
        }

        if self.samples.len() >= capacity {
            if index == 0 {
                // Older than everything retained.
                return;
            }
            self.samples.pop_front();
            self.samples.insert(index - 1, sample);
        } else {
            self.samples.insert(index, sample);
        }
    }

    fn bracket(&self, render_ts: f64) -> Option<Bracket> {
        if self.samples.is_empty() {
            return None;
        }

        match self.samples.iter().position(|s| s.timestamp_ms > render_ts) {
            Some(0) => Some(Bracket::Nearest(0)),
            Some(to) => {
                let from = to - 1;
                let a = self.samples[from].timestamp_ms;
                let b = self.samples[to].timestamp_ms;
                let t = ((render_ts - a) / (b - a)).clamp(0.0, 1.0) as f32;
                Some(Bracket::Between { from, to, t })
            }
            None => Some(Bracket::Nearest(self.samples.len() - 1)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InterpolationStats {
    pub entity_count: usize,
    pub buffered_samples: usize,
    pub interpolated: u64,
    /// Samples answered by holding the nearest buffered value.
    pub held: u64,
    pub starved: u64,
    pub last_delay_ms: f64,
}

/// Buffers timestamped snapshots of remote entities and renders them a
/// little in the past so there is usually a pair of samples to blend.
#[derive(Debug)]
pub struct RemoteInterpolator {
    config: InterpolationConfig,
    buffers: HashMap<u32, SampleBuffer>,
    interpolated: u64,
    held: u64,
    starved: u64,
    last_delay_ms: f64,
}

impl RemoteInterpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        let last_delay_ms = config.base_delay_ms;
        Self {
            config,
            buffers: HashMap::new(),
            interpolated: 0,
            held: 0,
            starved: 0,
            last_delay_ms,
        }
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    /// Adds a sample to the entity's time-ordered buffer, evicting the
    /// oldest beyond capacity.
    pub fn ingest(&mut self, entity_id: u32, sample: RemoteSample) {
        if !sample.timestamp_ms.is_finite() || !sample.position.is_finite() {
            log::debug!("Discarding non-finite sample for entity {}", entity_id);
            return;
        }
        let capacity = self.config.buffer_capacity.max(1);
        self.buffers
            .entry(entity_id)
            .or_default()
            .insert(sample, capacity);
    }

    pub fn delay_ms(&self, estimate: &ClockEstimate) -> f64 {
        self.config.base_delay_ms + self.config.jitter_multiplier * estimate.smoothed_jitter_ms
    }

    pub fn render_timestamp(&self, now_ms: f64, estimate: &ClockEstimate) -> f64 {
        estimate.to_server_time(now_ms) - self.delay_ms(estimate)
    }

    /// Position to draw `entity_id` at local time `now_ms`. Never
    /// extrapolates: outside the buffered range the nearest sample is held.
    pub fn sample_render_position(
        &mut self,
        entity_id: u32,
        now_ms: f64,
        estimate: &ClockEstimate,
    ) -> Result<Vec2, NetcodeError> {
        self.last_delay_ms = self.delay_ms(estimate);
        let render_ts = self.render_timestamp(now_ms, estimate);

        let Some(buffer) = self.buffers.get(&entity_id) else {
            self.starved += 1;
            return Err(NetcodeError::Starvation { entity_id });
        };

        match buffer.bracket(render_ts) {
            Some(Bracket::Between { from, to, t }) => {
                self.interpolated += 1;
                let a = buffer.samples[from].position;
                let b = buffer.samples[to].position;
                Ok(a.lerp(b, t))
            }
            Some(Bracket::Nearest(index)) => {
                self.held += 1;
                Ok(buffer.samples[index].position)
            }
            None => {
                self.starved += 1;
                Err(NetcodeError::Starvation { entity_id })
            }
        }
    }

    pub fn samples(&self, entity_id: u32) -> impl Iterator<Item = &RemoteSample> {
        self.buffers
            .get(&entity_id)
            .into_iter()
            .flat_map(|buffer| buffer.samples.iter())
    }

    pub fn buffered(&self, entity_id: u32) -> usize {
        self.buffers
            .get(&entity_id)
            .map_or(0, |buffer| buffer.samples.len())
    }

    pub fn contains(&self, entity_id: u32) -> bool {
        self.buffers.contains_key(&entity_id)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.buffers.keys().copied()
    }

    /// Drops the entity's buffer on despawn.
    pub fn remove(&mut self, entity_id: u32) -> bool {
        self.buffers.remove(&entity_id).is_some()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.buffers.retain(|id, _| keep(*id));
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn stats(&self) -> InterpolationStats {
        InterpolationStats {
            entity_count: self.buffers.len(),
            buffered_samples: self.buffers.values().map(|b| b.samples.len()).sum(),
            interpolated: self.interpolated,
            held: self.held,
            starved: self.starved,
            last_delay_ms: self.last_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpolator() -> RemoteInterpolator {
        RemoteInterpolator::new(InterpolationConfig::default())
    }

    fn estimate(jitter: f64) -> ClockEstimate {
        ClockEstimate {
            offset_ms: 0.0,
            smoothed_rtt_ms: 80.0,
            smoothed_jitter_ms: jitter,
        }
    }

    #[test]
    fn test_lerps_between_bracketing_samples() {
        let mut interp = interpolator();
        interp.ingest(7, RemoteSample::new(Vec2::new(0.0, 0.0), 1000.0));
        interp.ingest(7, RemoteSample::new(Vec2::new(10.0, 20.0), 1100.0));

        // delay 50 ms, so local 1100 renders server time 1050.
        let position = interp.sample_render_position(7, 1100.0, &estimate(0.0)).unwrap();

        assert!((position.x - 5.0).abs() < 1e-4);
        assert!((position.y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_jitter_widens_delay() {
        let interp = interpolator();
        assert_eq!(interp.delay_ms(&estimate(0.0)), 50.0);
        assert_eq!(interp.delay_ms(&estimate(4.0)), 58.0);
        assert!(interp.render_timestamp(1000.0, &estimate(10.0)) < interp.render_timestamp(1000.0, &estimate(1.0)));
    }

    #[test]
    fn test_offset_shifts_render_time() {
        let interp = interpolator();
        let ahead = ClockEstimate {
            offset_ms: 500.0,
            ..estimate(0.0)
        };
        assert_eq!(interp.render_timestamp(1000.0, &ahead), 1450.0);
    }

    #[test]
    fn test_outside_range_holds_nearest_without_extrapolating() {
        let mut interp = interpolator();
        interp.ingest(
            3,
            RemoteSample::new(Vec2::new(5.0, 0.0), 1000.0).with_velocity(Vec2::new(100.0, 0.0)),
        );
        interp.ingest(3, RemoteSample::new(Vec2::new(6.0, 0.0), 1016.0));

        let early = interp.sample_render_position(3, 900.0, &estimate(0.0)).unwrap();
        let late = interp.sample_render_position(3, 5000.0, &estimate(0.0)).unwrap();

        assert_eq!(early, Vec2::new(5.0, 0.0));
        assert_eq!(late, Vec2::new(6.0, 0.0));
        assert_eq!(interp.stats().held, 2);
    }

    #[test]
    fn test_unknown_entity_is_starvation() {
        let mut interp = interpolator();
        let result = interp.sample_render_position(42, 0.0, &estimate(0.0));
        assert!(matches!(
            result,
            Err(NetcodeError::Starvation { entity_id: 42 })
        ));
    }

    #[test]
    fn test_out_of_order_ingest_keeps_time_order() {
        let mut interp = interpolator();
        for ts in [30.0, 10.0, 20.0, 10.0] {
            interp.ingest(1, RemoteSample::new(Vec2::splat(ts as f32), ts));
        }

        let stamps: Vec<f64> = interp.samples(1).map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_buffer_evicts_oldest_past_capacity() {
        let mut interp = interpolator();
        for i in 0..25 {
            interp.ingest(1, RemoteSample::new(Vec2::ZERO, i as f64 * 16.0));
        }
        // Too old to matter once the buffer is full.
        interp.ingest(1, RemoteSample::new(Vec2::ZERO, -5.0));

        assert_eq!(interp.buffered(1), 10);
        assert_eq!(interp.samples(1).next().unwrap().timestamp_ms, 15.0 * 16.0);
    }

    #[test]
    fn test_sixteen_ms_stream_with_58_ms_delay() {
        let mut interp = interpolator();
        let clock = estimate(4.0);
        let appear = 10_000.0;
        let mut bracketed_after = None;

        // Samples are delivered as server time passes; local and server
        // clocks agree.
        let mut next_sample = appear;
        let mut now = appear;
        while now < appear + 400.0 {
            while next_sample <= now {
                let x = ((next_sample - appear) / 16.0) as f32;
                interp.ingest(9, RemoteSample::new(Vec2::new(x, 0.0), next_sample));
                next_sample += 16.0;
            }

            let before = interp.stats();
            let position = interp.sample_render_position(9, now, &clock).unwrap();
            let after = interp.stats();

            if now < appear + 58.0 {
                assert_eq!(position, Vec2::ZERO);
                assert_eq!(after.held, before.held + 1);
            } else if after.interpolated == before.interpolated + 1 {
                bracketed_after.get_or_insert(now);
            } else {
                panic!("no bracketing pair at local time {now}");
            }
            now += 5.0;
        }

        assert_eq!(bracketed_after, Some(appear + 60.0));
    }

    #[test]
    fn test_remove_clears_buffer() {
        let mut interp = interpolator();
        interp.ingest(4, RemoteSample::new(Vec2::ONE, 1.0));

        assert!(interp.remove(4));
        assert!(!interp.contains(4));
        assert_eq!(interp.buffered(4), 0);
    }
}
