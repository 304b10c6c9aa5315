mod client;
mod clock;
mod config;
mod ephemeral;
mod history;
mod input;
mod interpolation;
mod prediction;
mod reconciliation;
mod speculative;

pub use client::{
    ClientSession, ConnectionQuality, ProjectileHooks, SessionLink, SessionState, SessionStats,
};
pub use clock::{ClockEstimate, NetworkClock, ProbeState};
pub use config::{ClientConfig, ClockConfig, ConfigError, InterpolationConfig, ReconcileConfig};
pub use ephemeral::{EphemeralSync, EphemeralTracker, PARKED_POSITION, Projectile};
pub use history::{CommandHistory, HistoryEntry};
pub use input::{Control, InputSequencer, RawInput};
pub use interpolation::{Bracket, InterpolationStats, RemoteInterpolator, RemoteSample};
pub use prediction::{DEFAULT_HEALTH, LocalPredictor};
pub use reconciliation::{ReconcileOutcome, ReconciliationEngine};
pub use speculative::{ReconcilePolicy, SpeculativeField};
