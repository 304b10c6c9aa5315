use std::collections::VecDeque;

const SAMPLE_COUNT: usize = 60;

/// Rolling view of how often and how far predictions were corrected.
#[derive(Debug)]
pub struct CorrectionStats {
    magnitudes: VecDeque<f32>,
    confirmations: u64,
    corrections: u64,
    snaps: u64,
    replayed_commands: u64,
    dropped_frames: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectionSummary {
    pub confirmations: u64,
    pub corrections: u64,
    pub snaps: u64,
    pub replayed_commands: u64,
    pub dropped_frames: u64,
    pub mean_correction: f32,
    pub max_correction: f32,
}

impl Default for CorrectionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionStats {
    pub fn new() -> Self {
        Self {
            magnitudes: VecDeque::with_capacity(SAMPLE_COUNT),
            confirmations: 0,
            corrections: 0,
            snaps: 0,
            replayed_commands: 0,
            dropped_frames: 0,
        }
    }

    pub fn record_confirmation(&mut self) {
        self.confirmations += 1;
    }

    pub fn record_correction(&mut self, error: f32, replayed: usize) {
        self.corrections += 1;
        self.replayed_commands += replayed as u64;
        self.push_magnitude(error);
    }

    pub fn record_snap(&mut self) {
        self.snaps += 1;
    }

    pub fn record_dropped_frame(&mut self) {
        self.dropped_frames += 1;
    }

    fn push_magnitude(&mut self, error: f32) {
        if !error.is_finite() {
            return;
        }
        if self.magnitudes.len() >= SAMPLE_COUNT {
            self.magnitudes.pop_front();
        }
        self.magnitudes.push_back(error);
    }

    pub fn mean_correction(&self) -> f32 {
        if self.magnitudes.is_empty() {
            return 0.0;
        }
        self.magnitudes.iter().sum::<f32>() / self.magnitudes.len() as f32
    }

    pub fn max_correction(&self) -> f32 {
        self.magnitudes.iter().copied().fold(0.0, f32::max)
    }

    pub fn summary(&self) -> CorrectionSummary {
        CorrectionSummary {
            confirmations: self.confirmations,
            corrections: self.corrections,
            snaps: self.snaps,
            replayed_commands: self.replayed_commands,
            dropped_frames: self.dropped_frames,
            mean_correction: self.mean_correction(),
            max_correction: self.max_correction(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_recent_magnitudes() {
        let mut stats = CorrectionStats::new();
        stats.record_correction(100.0, 3);
        for _ in 0..SAMPLE_COUNT {
            stats.record_correction(2.0, 1);
        }

        let summary = stats.summary();
        assert_eq!(summary.corrections, SAMPLE_COUNT as u64 + 1);
        assert_eq!(summary.replayed_commands, SAMPLE_COUNT as u64 + 3);
        assert_eq!(summary.max_correction, 2.0);
        assert!((summary.mean_correction - 2.0).abs() < 1e-6);
    }
}
