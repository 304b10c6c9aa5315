use bitflags::bitflags;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const MAX_FRAME_SIZE: usize = 64 * 1024;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4252_574C;
pub const DEFAULT_TICK_RATE: u32 = 60;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;
const AXIS_SCALE: f32 = 127.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
        }
    }
}

impl PacketHeader {
    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

bitflags! {
    /// Discrete action buttons carried alongside the movement axes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Actions: u8 {
        /// Set only on the tick the jump control goes down.
        const JUMP = 1 << 0;
        const JUMP_HELD = 1 << 1;
        const FIRE = 1 << 2;
    }
}

/// Quantized control state for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct InputMask {
    pub axes: [i8; 2],
    pub aim: [i8; 2],
    pub actions: u8,
}

impl InputMask {
    pub fn encode_axes(&mut self, axes: [f32; 2]) {
        self.axes = [quantize_axis(axes[0]), quantize_axis(axes[1])];
    }

    pub fn decode_axes(&self) -> [f32; 2] {
        [
            self.axes[0] as f32 / AXIS_SCALE,
            self.axes[1] as f32 / AXIS_SCALE,
        ]
    }

    pub fn encode_aim(&mut self, aim: [f32; 2]) {
        self.aim = [quantize_axis(aim[0]), quantize_axis(aim[1])];
    }

    pub fn decode_aim(&self) -> [f32; 2] {
        [self.aim[0] as f32 / AXIS_SCALE, self.aim[1] as f32 / AXIS_SCALE]
    }

    pub fn actions(&self) -> Actions {
        Actions::from_bits_truncate(self.actions)
    }

    pub fn set_actions(&mut self, actions: Actions) {
        self.actions = actions.bits();
    }

    #[inline]
    pub fn has(&self, action: Actions) -> bool {
        self.actions().contains(action)
    }

    pub fn is_idle(&self) -> bool {
        self.axes == [0, 0] && self.actions == 0
    }
}

fn quantize_axis(value: f32) -> i8 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * AXIS_SCALE).round() as i8
}

/// One tick of local input. Emitted exactly once per simulation tick,
/// idle ticks included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Command {
    pub sequence: u32,
    pub tick: u32,
    pub input: InputMask,
}

impl Command {
    pub fn new(sequence: u32, tick: u32) -> Self {
        Self {
            sequence,
            tick,
            input: InputMask::default(),
        }
    }

    pub fn with_input(mut self, input: InputMask) -> Self {
        self.input = input;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityFlags(pub u8);

impl EntityFlags {
    pub const GROUNDED: u8 = 1 << 0;
    pub const DOUBLE_JUMP_AVAILABLE: u8 = 1 << 1;

    pub fn new(grounded: bool, double_jump_available: bool) -> Self {
        let mut bits = 0;
        if grounded {
            bits |= Self::GROUNDED;
        }
        if double_jump_available {
            bits |= Self::DOUBLE_JUMP_AVAILABLE;
        }
        Self(bits)
    }

    pub fn grounded(&self) -> bool {
        self.0 & Self::GROUNDED != 0
    }

    pub fn double_jump_available(&self) -> bool {
        self.0 & Self::DOUBLE_JUMP_AVAILABLE != 0
    }
}

/// Server-owned scoreboard counters. Never predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Tally {
    pub kills: u16,
    pub deaths: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityState {
    pub entity_id: u32,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub health: Option<u16>,
    pub flags: Option<EntityFlags>,
    pub tally: Option<Tally>,
}

impl EntityState {
    pub fn new(entity_id: u32, position: [f32; 2], velocity: [f32; 2]) -> Self {
        Self {
            entity_id,
            position,
            velocity,
            health: None,
            flags: None,
            tally: None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(&self.velocity).all(|v| v.is_finite())
    }
}

/// Short-lived, server-spawned entity such as a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EphemeralState {
    pub entity_id: u32,
    pub owner_id: u32,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub valid: bool,
}

impl EphemeralState {
    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(&self.velocity).all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WorldSnapshot {
    pub tick: u32,
    pub server_time_ms: f64,
    /// Highest local command sequence the server has simulated; 0 when none.
    pub last_command_ack: u32,
    pub entities: Vec<EntityState>,
    pub ephemeral: Vec<EphemeralState>,
}

impl WorldSnapshot {
    pub fn new(tick: u32, server_time_ms: f64) -> Self {
        Self {
            tick,
            server_time_ms,
            last_command_ack: 0,
            entities: Vec::new(),
            ephemeral: Vec::new(),
        }
    }

    pub fn entity(&self, entity_id: u32) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    /// Rejects snapshots that would poison interpolation or reconciliation.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.server_time_ms.is_finite() {
            return Err(ProtocolError::NonFinite {
                tick: self.tick,
                entity_id: None,
            });
        }
        if let Some(bad) = self.entities.iter().find(|e| !e.is_finite()) {
            return Err(ProtocolError::NonFinite {
                tick: self.tick,
                entity_id: Some(bad.entity_id),
            });
        }
        if let Some(bad) = self.ephemeral.iter().find(|e| !e.is_finite()) {
            return Err(ProtocolError::NonFinite {
                tick: self.tick,
                entity_id: Some(bad.entity_id),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Probe {
    pub client_send_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ProbeEcho {
    pub client_send_ms: f64,
    pub server_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ClientMessage {
    Command(Command),
    Probe(Probe),
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ServerMessage {
    Snapshot(WorldSnapshot),
    ProbeEcho(ProbeEcho),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad packet header (magic {magic:#x}, version {version})")]
    BadHeader { magic: u32, version: u32 },
    #[error("frame of {0} bytes exceeds maximum packet size")]
    Oversized(usize),
    #[error("snapshot for tick {tick} arrived after tick {latest}")]
    OutOfOrder { tick: u32, latest: u32 },
    #[error("non-finite value in snapshot {tick} (entity {entity_id:?})")]
    NonFinite { tick: u32, entity_id: Option<u32> },
    #[error("echo for probe sent at {0} ms does not match any probe in flight")]
    UnexpectedEcho(f64),
}

macro_rules! impl_frame_codec {
    ($ty:ty, $frame:ident) => {
        #[derive(Archive, Serialize, Deserialize)]
        struct $frame {
            header: PacketHeader,
            payload: $ty,
        }

        impl $ty {
            pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
                let frame = $frame {
                    header: PacketHeader::default(),
                    payload: self.clone(),
                };
                rkyv::to_bytes::<rancor::Error>(&frame)
                    .map(|aligned| aligned.into_vec())
                    .map_err(ProtocolError::Serialize)
            }

            pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
                if data.len() > MAX_FRAME_SIZE {
                    return Err(ProtocolError::Oversized(data.len()));
                }
                let frame = rkyv::from_bytes::<$frame, rancor::Error>(data)
                    .map_err(ProtocolError::Deserialize)?;
                if !frame.header.is_valid() {
                    return Err(ProtocolError::BadHeader {
                        magic: frame.header.magic,
                        version: frame.header.version,
                    });
                }
                Ok(frame.payload)
            }
        }
    };
}

impl_frame_codec!(ClientMessage, ClientFrame);
impl_frame_codec!(ServerMessage, ServerFrame);
