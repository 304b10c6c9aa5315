pub mod debug;
pub mod net;

pub use net::{ClientConfig, ClientSession, ConnectionQuality, SessionLink};
