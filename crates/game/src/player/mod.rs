mod config;
mod controller;
mod state;

pub use config::MovementConfig;
pub use controller::{MovementController, MovementCue};
pub use state::PredictedState;
