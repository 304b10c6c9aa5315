mod protocol;
mod simulator;
mod stats;

pub use protocol::{
    Actions, ClientMessage, Command, DEFAULT_TICK_RATE, EntityFlags, EntityState, EphemeralState,
    InputMask, MAX_FRAME_SIZE, PROTOCOL_MAGIC, PROTOCOL_VERSION, PacketHeader, Probe, ProbeEcho,
    ProtocolError, ServerMessage, Tally, WorldSnapshot, sequence_greater_than,
};
pub use simulator::LinkSimulator;
pub use stats::{LinkConditions};
