use crate::net::ProtocolError;

/// Why the connection is considered degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    ProbeTimeouts { consecutive: u32 },
    HistoryOverflow { capacity: usize },
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProbeTimeouts { consecutive } => {
                write!(f, "{consecutive} consecutive probe timeouts")
            }
            Self::HistoryOverflow { capacity } => {
                write!(f, "{capacity} commands without acknowledgment")
            }
        }
    }
}

/// Failures the netcode recovers from without stopping the tick loop.
#[derive(Debug, thiserror::Error)]
pub enum NetcodeError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("prediction diverged by {error:.4} at sequence {sequence}")]
    Divergence { sequence: u32, error: f32 },
    #[error("no interpolation samples for entity {entity_id}")]
    Starvation { entity_id: u32 },
    #[error("pool exhausted at capacity {capacity}, reclaimed slot {slot}")]
    Capacity { capacity: usize, slot: usize },
    #[error("connectivity degraded: {0}")]
    ConnectivityDegraded(DegradedReason),
}

impl NetcodeError {
    /// Degraded connectivity is surfaced to the player; everything else is
    /// only logged.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::ConnectivityDegraded(_))
    }
}
