use crate::map::Level;
use crate::net::{Actions, Command};

use super::{MovementConfig, PredictedState};

/// Audio/animation hints raised while stepping. They never feed back into
/// the state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementCue {
    Jumped,
    DoubleJumped,
    Landed { impact_speed: f32 },
}

/// Deterministic platformer movement. Holds only immutable tuning and level
/// geometry, so the same controller can replay any command stream.
#[derive(Debug, Clone)]
pub struct MovementController {
    config: MovementConfig,
    level: Level,
}

impl MovementController {
    pub fn new(config: MovementConfig, level: Level) -> Self {
        Self { config, level }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Advances `state` by one tick of `command`.
    ///
    /// Integration order is fixed: horizontal velocity, jump impulse,
    /// gravity with fall cap, position, world bounds, then platform
    /// landing. Landing runs last and is swept between the previous and
    /// new height, so a fast fall cannot skip a thin platform.
    pub fn apply_command(
        &self,
        state: &PredictedState,
        command: &Command,
        dt: f32,
        cues: &mut dyn FnMut(MovementCue),
    ) -> PredictedState {
        let config = &self.config;
        let input = command.input;
        let [axis_x, _] = input.decode_axes();
        let mut next = *state;

        next.velocity.x = axis_x * config.move_speed;

        if input.has(Actions::JUMP) {
            if next.grounded {
                next.velocity.y = config.jump_impulse;
                next.grounded = false;
                cues(MovementCue::Jumped);
            } else if next.double_jump_available {
                next.velocity.y = config.double_jump_impulse;
                next.double_jump_available = false;
                cues(MovementCue::DoubleJumped);
            }
        }

        next.velocity.y = (next.velocity.y - config.gravity * dt).max(-config.max_fall_speed);

        let previous = next.position;
        next.position += next.velocity * dt;

        let bounds = &self.level.bounds;
        let clamped = next.position.clamp(bounds.min, bounds.max);
        if clamped.x != next.position.x {
            next.velocity.x = 0.0;
        }
        if clamped.y != next.position.y {
            next.velocity.y = 0.0;
        }
        next.position = clamped;

        next.grounded = false;
        if next.velocity.y <= 0.0 {
            if let Some(platform) =
                self.level
                    .landing_surface(next.position.x, previous.y, next.position.y)
            {
                let impact_speed = -next.velocity.y;
                next.position.y = platform.top;
                next.velocity.y = 0.0;
                next.grounded = true;
                next.double_jump_available = true;
                if !state.grounded {
                    cues(MovementCue::Landed { impact_speed });
                }
            }
        }

        next
    }

    /// Runs `commands` in order from `start` without emitting cues.
    pub fn replay<'a>(
        &self,
        start: PredictedState,
        commands: impl IntoIterator<Item = &'a Command>,
        dt: f32,
    ) -> PredictedState {
        commands.into_iter().fold(start, |state, command| {
            self.apply_command(&state, command, dt, &mut |_| {})
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::map::{Platform, WorldBounds};
    use crate::net::InputMask;

    const DT: f32 = 1.0 / 60.0;

    fn flat_level() -> Level {
        Level::new(WorldBounds::new(
            Vec2::new(-500.0, -100.0),
            Vec2::new(500.0, 500.0),
        ))
        .with_platform(Platform::new(-500.0, 500.0, 0.0))
    }

    fn controller() -> MovementController {
        MovementController::new(MovementConfig::default(), flat_level())
    }

    fn command(sequence: u32, axis_x: f32, actions: Actions) -> Command {
        let mut input = InputMask::default();
        input.encode_axes([axis_x, 0.0]);
        input.set_actions(actions);
        Command::new(sequence, sequence).with_input(input)
    }

    #[test]
    fn idle_on_ground_stays_put() {
        let controller = controller();
        let state = PredictedState::default();

        let next = controller.apply_command(&state, &command(1, 0.0, Actions::empty()), DT, &mut |_| {});

        assert_eq!(next.position, Vec2::ZERO);
        assert_eq!(next.velocity, Vec2::ZERO);
        assert!(next.grounded);
    }

    #[test]
    fn horizontal_velocity_is_set_from_axis() {
        let controller = controller();
        let next = controller.apply_command(
            &PredictedState::default(),
            &command(1, 1.0, Actions::empty()),
            DT,
            &mut |_| {},
        );

        assert_eq!(next.velocity.x, MovementConfig::default().move_speed);
        assert!((next.position.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn jump_then_double_jump_then_exhausted() {
        let controller = controller();
        let mut cues = Vec::new();

        let s1 = controller.apply_command(
            &PredictedState::default(),
            &command(1, 0.0, Actions::JUMP),
            DT,
            &mut |c| cues.push(c),
        );
        assert!(!s1.grounded);
        assert!(s1.velocity.y > 0.0);

        let s2 = controller.apply_command(&s1, &command(2, 0.0, Actions::JUMP), DT, &mut |c| {
            cues.push(c)
        });
        assert!(!s2.double_jump_available);

        let s3 = controller.apply_command(&s2, &command(3, 0.0, Actions::JUMP), DT, &mut |c| {
            cues.push(c)
        });
        assert!(s3.velocity.y < s2.velocity.y);

        assert_eq!(cues, vec![MovementCue::Jumped, MovementCue::DoubleJumped]);
    }

    #[test]
    fn fall_speed_is_capped() {
        let controller = controller();
        let mut state = PredictedState {
            position: Vec2::new(0.0, 450.0),
            grounded: false,
            ..PredictedState::default()
        };

        for seq in 0..40 {
            state = controller.apply_command(&state, &command(seq, 0.0, Actions::empty()), DT, &mut |_| {});
        }

        assert!(state.velocity.y >= -MovementConfig::default().max_fall_speed);
    }

    #[test]
    fn fast_fall_does_not_tunnel_through_thin_platform() {
        let level = flat_level().with_platform(Platform::new(-10.0, 10.0, 50.0));
        let controller = MovementController::new(MovementConfig::default(), level);
        let mut cues = Vec::new();

        // One tick at max fall speed covers 10 units; start just above the platform.
        let state = PredictedState {
            position: Vec2::new(0.0, 55.0),
            velocity: Vec2::new(0.0, -600.0),
            grounded: false,
            double_jump_available: false,
        };

        let next = controller.apply_command(&state, &command(1, 0.0, Actions::empty()), DT, &mut |c| {
            cues.push(c)
        });

        assert_eq!(next.position.y, 50.0);
        assert!(next.grounded);
        assert!(next.double_jump_available);
        assert!(matches!(cues[0], MovementCue::Landed { .. }));
    }

    #[test]
    fn world_bounds_clamp_position_and_velocity() {
        let controller = controller();
        let state = PredictedState::at(Vec2::new(499.0, 0.0));

        let next = controller.apply_command(&state, &command(1, 1.0, Actions::empty()), DT, &mut |_| {});

        assert_eq!(next.position.x, 500.0);
        assert_eq!(next.velocity.x, 0.0);
    }

    #[test]
    fn replay_matches_stepwise_application() {
        let controller = controller();
        let commands: Vec<_> = (1..=30)
            .map(|seq| {
                let actions = if seq % 10 == 1 { Actions::JUMP } else { Actions::empty() };
                command(seq, if seq % 3 == 0 { -1.0 } else { 0.5 }, actions)
            })
            .collect();

        let mut stepwise = PredictedState::default();
        for cmd in &commands {
            stepwise = controller.apply_command(&stepwise, cmd, DT, &mut |_| {});
        }

        let replayed = controller.replay(PredictedState::default(), &commands, DT);
        assert_eq!(stepwise, replayed);
    }
}
