use glam::Vec2;

use crate::net::{EntityFlags, EntityState};

/// Physical state of the locally controlled entity at one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub grounded: bool,
    pub double_jump_available: bool,
}

impl Default for PredictedState {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            grounded: true,
            double_jump_available: true,
        }
    }
}

impl PredictedState {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Builds a state from an authoritative entity record. Flags the server
    /// omitted are taken from `fallback`.
    pub fn from_authoritative(state: &EntityState, fallback: &PredictedState) -> Self {
        let (grounded, double_jump_available) = match state.flags {
            Some(flags) => (flags.grounded(), flags.double_jump_available()),
            None => (fallback.grounded, fallback.double_jump_available),
        };

        Self {
            position: Vec2::from(state.position),
            velocity: Vec2::from(state.velocity),
            grounded,
            double_jump_available,
        }
    }

    pub fn to_entity_state(&self, entity_id: u32) -> EntityState {
        let mut state = EntityState::new(
            entity_id,
            self.position.to_array(),
            self.velocity.to_array(),
        );
        state.flags = Some(EntityFlags::new(self.grounded, self.double_jump_available));
        state
    }

    /// Largest of the position and velocity discrepancies.
    pub fn error_to(&self, other: &PredictedState) -> f32 {
        let position = self.position.distance(other.position);
        let velocity = self.velocity.distance(other.velocity);
        position.max(velocity)
    }

    pub fn flags_match(&self, other: &PredictedState) -> bool {
        self.grounded == other.grounded
            && self.double_jump_available == other.double_jump_available
    }

    /// Within `epsilon` on position and velocity with identical flags.
    pub fn approx_eq(&self, other: &PredictedState, epsilon: f32) -> bool {
        self.flags_match(other) && self.error_to(other) <= epsilon
    }
}
