/// Discrete cues for audio and UI collaborators. Never part of the
/// simulation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent {
    Jumped { entity_id: u32 },
    DoubleJumped { entity_id: u32 },
    Landed { entity_id: u32, impact_speed: f32 },
    TookDamage { entity_id: u32, amount: u16 },
    QualityChanged { degraded: bool },
}
