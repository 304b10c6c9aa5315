use serde::{Deserialize, Serialize};

/// Movement tuning shared by client prediction and the server. Both sides
/// must use identical values or every tick diverges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub move_speed: f32,
    pub jump_impulse: f32,
    pub double_jump_impulse: f32,
    pub gravity: f32,
    pub max_fall_speed: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 120.0,
            jump_impulse: 260.0,
            double_jump_impulse: 220.0,
            gravity: 900.0,
            max_fall_speed: 600.0,
        }
    }
}
