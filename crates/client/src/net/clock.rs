use std::collections::VecDeque;

use brawl::{DegradedReason, NetcodeError, Probe, ProbeEcho, ProtocolError};

use super::config::ClockConfig;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockEstimate {
    /// Server clock minus local clock.
    pub offset_ms: f64,
    pub smoothed_rtt_ms: f64,
    pub smoothed_jitter_ms: f64,
}

impl ClockEstimate {
    pub fn to_server_time(&self, local_ms: f64) -> f64 {
        local_ms + self.offset_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeState {
    Idle,
    InFlight { sent_at_ms: f64 },
}

#[derive(Debug, Clone, Copy)]
struct ClockSample {
    rtt_ms: f64,
    offset_ms: f64,
}

/// Round-trip, jitter and offset estimation from echo probes. At most one
/// probe is in flight; overlapping probes would queue behind each other and
/// inflate the very RTT being measured.
#[derive(Debug)]
pub struct NetworkClock {
    config: ClockConfig,
    samples: VecDeque<ClockSample>,
    estimate: ClockEstimate,
    state: ProbeState,
    last_probe_ms: Option<f64>,
    dropped_probes: u64,
    consecutive_timeouts: u32,
}

impl NetworkClock {
    pub fn new(config: ClockConfig) -> Self {
        let window = config.sample_window.max(1);
        Self {
            config,
            samples: VecDeque::with_capacity(window),
            estimate: ClockEstimate::default(),
            state: ProbeState::Idle,
            last_probe_ms: None,
            dropped_probes: 0,
            consecutive_timeouts: 0,
        }
    }

    /// Abandons a timed-out probe and returns a new one when the interval
    /// has elapsed and nothing is in flight.
    pub fn poll(&mut self, now_ms: f64) -> Option<Probe> {
        if let ProbeState::InFlight { sent_at_ms } = self.state {
            if now_ms - sent_at_ms >= self.config.probe_timeout_ms {
                self.abandon_probe(sent_at_ms);
            }
        }

        if self.state != ProbeState::Idle {
            return None;
        }

        let due = self
            .last_probe_ms
            .is_none_or(|last| now_ms - last >= self.config.probe_interval_ms);
        if !due {
            return None;
        }

        self.on_probe_sent(now_ms);
        Some(Probe {
            client_send_ms: now_ms,
        })
    }

    pub fn on_probe_sent(&mut self, sent_at_ms: f64) {
        if let ProbeState::InFlight { sent_at_ms: previous } = self.state {
            self.abandon_probe(previous);
        }
        self.state = ProbeState::InFlight { sent_at_ms };
        self.last_probe_ms = Some(sent_at_ms);
    }

    pub fn on_probe_echo(
        &mut self,
        echo: &ProbeEcho,
        now_ms: f64,
    ) -> Result<ClockEstimate, NetcodeError> {
        let sent_at_ms = match self.state {
            ProbeState::InFlight { sent_at_ms } if sent_at_ms == echo.client_send_ms => sent_at_ms,
            _ => {
                return Err(ProtocolError::UnexpectedEcho(echo.client_send_ms).into());
            }
        };

        let rtt_ms = (now_ms - sent_at_ms).max(0.0);
        let offset_ms = echo.server_time_ms - (sent_at_ms + rtt_ms / 2.0);

        if self.samples.len() >= self.config.sample_window.max(1) {
            self.samples.pop_front();
        }
        self.samples.push_back(ClockSample { rtt_ms, offset_ms });

        self.state = ProbeState::Idle;
        if self.consecutive_timeouts >= self.config.degraded_after_timeouts {
            log::info!("Probe echo received, connectivity recovered");
        }
        self.consecutive_timeouts = 0;
        self.recompute();

        log::trace!(
            "Probe rtt {:.1} ms, smoothed {:.1} ms, jitter {:.1} ms, offset {:.1} ms",
            rtt_ms,
            self.estimate.smoothed_rtt_ms,
            self.estimate.smoothed_jitter_ms,
            self.estimate.offset_ms
        );

        Ok(self.estimate)
    }

    fn abandon_probe(&mut self, sent_at_ms: f64) {
        self.state = ProbeState::Idle;
        self.dropped_probes += 1;
        self.consecutive_timeouts += 1;

        if self.consecutive_timeouts == self.config.degraded_after_timeouts {
            log::warn!(
                "{}",
                NetcodeError::ConnectivityDegraded(DegradedReason::ProbeTimeouts {
                    consecutive: self.consecutive_timeouts,
                })
            );
        } else {
            log::debug!("Probe sent at {:.1} ms timed out", sent_at_ms);
        }
    }

    fn recompute(&mut self) {
        let count = self.samples.len() as f64;
        if count == 0.0 {
            return;
        }

        let mean_rtt = self.samples.iter().map(|s| s.rtt_ms).sum::<f64>() / count;
        let variance = self
            .samples
            .iter()
            .map(|s| (s.rtt_ms - mean_rtt).powi(2))
            .sum::<f64>()
            / count;
        let mean_offset = self.samples.iter().map(|s| s.offset_ms).sum::<f64>() / count;

        self.estimate = ClockEstimate {
            offset_ms: mean_offset,
            smoothed_rtt_ms: mean_rtt,
            smoothed_jitter_ms: variance.sqrt(),
        };
    }

    pub fn estimate(&self) -> ClockEstimate {
        self.estimate
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn dropped_probes(&self) -> u64 {
        self.dropped_probes
    }

    pub fn degraded_reason(&self) -> Option<DegradedReason> {
        (self.consecutive_timeouts >= self.config.degraded_after_timeouts).then_some(
            DegradedReason::ProbeTimeouts {
                consecutive: self.consecutive_timeouts,
            },
        )
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason().is_some()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.estimate = ClockEstimate::default();
        self.state = ProbeState::Idle;
        self.last_probe_ms = None;
        self.consecutive_timeouts = 0;
    }
}
