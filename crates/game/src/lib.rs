pub mod error;
pub mod event;
pub mod map;
pub mod net;
pub mod player;
pub mod pool;
pub mod simulation;

pub use error::{DegradedReason, NetcodeError};
pub use event::{EventQueue, GameEvent};
pub use map::{Level, Platform, TestingGround, WorldBounds};
pub use net::{
    Actions, ClientMessage, Command, DEFAULT_TICK_RATE, EntityFlags, EntityState, EphemeralState,
    InputMask, LinkConditions, LinkSimulator, Probe, ProbeEcho, ProtocolError, ServerMessage,
    Tally, WorldSnapshot,
};
pub use player::{MovementConfig, MovementController, MovementCue, PredictedState};
pub use pool::{DisplayHooks, MountedPool, NoDisplay, ObjectPool, PoolHandle, Poolable};
pub use simulation::FixedTimestep;
