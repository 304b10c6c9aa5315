use brawl::{Command, MovementController, MovementCue, PredictedState};

use super::speculative::{ReconcilePolicy, SpeculativeField};

pub const DEFAULT_HEALTH: u16 = 100;

/// Owns the locally controlled entity's predicted state and advances it
/// one command at a time.
#[derive(Debug)]
pub struct LocalPredictor {
    controller: MovementController,
    state: PredictedState,
    health: SpeculativeField<u16>,
    dt: f32,
}

impl LocalPredictor {
    pub fn new(controller: MovementController, spawn: PredictedState, dt: f32) -> Self {
        Self {
            controller,
            state: spawn,
            health: SpeculativeField::new(
                DEFAULT_HEALTH,
                ReconcilePolicy::MonotonicDecreaseUntilAck,
            ),
            dt,
        }
    }

    /// Pure step: identical inputs always give identical output.
    pub fn apply_command(
        &self,
        state: &PredictedState,
        command: &Command,
        dt: f32,
        cues: &mut dyn FnMut(MovementCue),
    ) -> PredictedState {
        self.controller.apply_command(state, command, dt, cues)
    }

    /// Applies `command` to the owned state with the fixed tick length.
    pub fn advance(
        &mut self,
        command: &Command,
        cues: &mut dyn FnMut(MovementCue),
    ) -> PredictedState {
        self.state = self.apply_command(&self.state, command, self.dt, cues);
        self.state
    }

    pub fn state(&self) -> &PredictedState {
        &self.state
    }

    pub fn set_state(&mut self, state: PredictedState) {
        self.state = state;
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn controller(&self) -> &MovementController {
        &self.controller
    }

    pub fn health(&self) -> &SpeculativeField<u16> {
        &self.health
    }

    pub fn health_mut(&mut self) -> &mut SpeculativeField<u16> {
        &mut self.health
    }

    pub fn reset(&mut self, spawn: PredictedState) {
        self.state = spawn;
        self.health.reset(DEFAULT_HEALTH);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use brawl::{Actions, InputMask, MovementConfig, TestingGround};

    fn predictor() -> LocalPredictor {
        let controller = MovementController::new(MovementConfig::default(), TestingGround::level());
        LocalPredictor::new(controller, PredictedState::default(), 1.0 / 60.0)
    }

    #[test]
    fn advance_uses_fixed_dt_and_reports_cues() {
        let mut predictor = predictor();
        let mut input = InputMask::default();
        input.encode_axes([1.0, 0.0]);
        input.set_actions(Actions::JUMP);
        let mut cues = Vec::new();

        let state = predictor.advance(&Command::new(1, 0).with_input(input), &mut |c| cues.push(c));

        assert_eq!(cues, vec![MovementCue::Jumped]);
        assert_eq!(predictor.state(), &state);
        assert!((state.position.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn apply_command_does_not_touch_owned_state() {
        let predictor = predictor();
        let start = PredictedState::at(Vec2::new(10.0, 0.0));

        let a = predictor.apply_command(&start, &Command::new(1, 0), 1.0 / 60.0, &mut |_| {});
        let b = predictor.apply_command(&start, &Command::new(1, 0), 1.0 / 60.0, &mut |_| {});

        assert_eq!(a, b);
        assert_eq!(predictor.state(), &PredictedState::default());
    }
}
