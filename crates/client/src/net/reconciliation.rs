use brawl::net::sequence_greater_than;
use brawl::{NetcodeError, PredictedState, WorldSnapshot};

use super::history::CommandHistory;
use super::prediction::LocalPredictor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// The acknowledgment is not newer than one already applied.
    Stale { acked_sequence: u32 },
    /// The snapshot does not contain the local entity.
    Absent,
    /// The recorded prediction matched within tolerance and on every flag.
    Confirmed { acked_sequence: u32, pruned: usize },
    /// The prediction diverged; state was rewound and pending commands
    /// replayed on top of the authoritative state.
    Corrected {
        acked_sequence: u32,
        error: f32,
        replayed: usize,
    },
    /// No recorded prediction exists for the acknowledged command, so the
    /// authoritative state was adopted as-is.
    Snapped { acked_sequence: u32 },
}

impl ReconcileOutcome {
    pub fn acked_sequence(&self) -> Option<u32> {
        match *self {
            Self::Stale { .. } | Self::Absent => None,
            Self::Confirmed { acked_sequence, .. }
            | Self::Corrected { acked_sequence, .. }
            | Self::Snapped { acked_sequence } => Some(acked_sequence),
        }
    }

    pub fn is_correction(&self) -> bool {
        matches!(self, Self::Corrected { .. } | Self::Snapped { .. })
    }
}

/// Compares authoritative snapshots with recorded predictions and rewinds
/// and replays the local entity when they disagree.
#[derive(Debug)]
pub struct ReconciliationEngine {
    epsilon: f32,
    last_acked: u32,
}

impl ReconciliationEngine {
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon: epsilon.max(0.0),
            last_acked: 0,
        }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    /// Reconciles `local_entity_id` against `snapshot`. Applying the same
    /// snapshot twice is a no-op the second time.
    pub fn reconcile(
        &mut self,
        snapshot: &WorldSnapshot,
        local_entity_id: u32,
        predictor: &mut LocalPredictor,
        history: &mut CommandHistory,
    ) -> ReconcileOutcome {
        let acked = snapshot.last_command_ack;
        if !sequence_greater_than(acked, self.last_acked) {
            return ReconcileOutcome::Stale {
                acked_sequence: acked,
            };
        }

        let Some(authoritative) = snapshot.entity(local_entity_id) else {
            return ReconcileOutcome::Absent;
        };
        self.last_acked = acked;

        let Some(entry) = history.find(acked).copied() else {
            let server_state = PredictedState::from_authoritative(authoritative, predictor.state());
            predictor.set_state(server_state);
            history.prune(acked);
            log::debug!(
                "No prediction recorded for command {}, adopting server state",
                acked
            );
            return ReconcileOutcome::Snapped {
                acked_sequence: acked,
            };
        };

        let server_state = PredictedState::from_authoritative(authoritative, &entry.resulting_state);
        let error = entry.resulting_state.error_to(&server_state);
        if error <= self.epsilon && entry.resulting_state.flags_match(&server_state) {
            let pruned = history.prune(acked);
            return ReconcileOutcome::Confirmed {
                acked_sequence: acked,
                pruned,
            };
        }

        log::debug!(
            "{}",
            NetcodeError::Divergence {
                sequence: acked,
                error,
            }
        );

        history.prune(acked);
        let pending = history.take_commands();
        let dt = predictor.dt();
        let mut state = server_state;
        for command in &pending {
            state = predictor.apply_command(&state, command, dt, &mut |_| {});
            // Replay re-records exactly as many entries as it drained.
            let _ = history.record(*command, state);
        }
        predictor.set_state(state);

        ReconcileOutcome::Corrected {
            acked_sequence: acked,
            error,
            replayed: pending.len(),
        }
    }

    pub fn reset(&mut self) {
        self.last_acked = 0;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use brawl::{
        Command, EntityFlags, EntityState, InputMask, Level, MovementConfig, MovementController,
        Platform, WorldBounds,
    };

    const LOCAL: u32 = 1;
    const DT: f32 = 0.1;

    fn predictor_at(x: f32) -> LocalPredictor {
        let level = Level::new(WorldBounds::new(
            Vec2::new(-1000.0, -100.0),
            Vec2::new(1000.0, 500.0),
        ))
        .with_platform(Platform::new(-1000.0, 1000.0, 0.0));
        let config = MovementConfig {
            move_speed: 100.0,
            ..MovementConfig::default()
        };
        LocalPredictor::new(
            MovementController::new(config, level),
            PredictedState::at(Vec2::new(x, 0.0)),
            DT,
        )
    }

    fn walk_right(sequence: u32) -> Command {
        let mut input = InputMask::default();
        input.encode_axes([1.0, 0.0]);
        Command::new(sequence, sequence).with_input(input)
    }

    fn run(predictor: &mut LocalPredictor, history: &mut CommandHistory, sequences: &[u32]) {
        for &sequence in sequences {
            let command = walk_right(sequence);
            let state = predictor.advance(&command, &mut |_| {});
            history.record(command, state).unwrap();
        }
    }

    fn snapshot(ack: u32, x: f32) -> WorldSnapshot {
        let mut state = EntityState::new(LOCAL, [x, 0.0], [100.0, 0.0]);
        state.flags = Some(EntityFlags::new(true, true));
        let mut snapshot = WorldSnapshot::new(ack, ack as f64 * 100.0);
        snapshot.last_command_ack = ack;
        snapshot.entities.push(state);
        snapshot
    }

    #[test]
    fn matching_prediction_is_confirmed_and_pruned() {
        let mut predictor = predictor_at(0.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        run(&mut predictor, &mut history, &[1, 2, 3]);

        let before = *predictor.state();
        let outcome = engine.reconcile(&snapshot(2, 20.0), LOCAL, &mut predictor, &mut history);

        assert_eq!(
            outcome,
            ReconcileOutcome::Confirmed {
                acked_sequence: 2,
                pruned: 2
            }
        );
        assert_eq!(predictor.state(), &before);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn divergence_rewinds_and_replays_pending_commands() {
        let mut predictor = predictor_at(90.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        // Prediction for command 10 lands at x=100, but the server says 90.
        run(&mut predictor, &mut history, &[10, 11, 12]);
        assert!((history.find(10).unwrap().resulting_state.position.x - 100.0).abs() < 1e-4);

        let outcome = engine.reconcile(&snapshot(10, 90.0), LOCAL, &mut predictor, &mut history);

        let ReconcileOutcome::Corrected { error, replayed, .. } = outcome else {
            panic!("expected correction, got {outcome:?}");
        };
        assert!((error - 10.0).abs() < 1e-3);
        assert_eq!(replayed, 2);
        assert!((predictor.state().position.x - 110.0).abs() < 1e-3);
        assert!(history.find(10).is_none());
        assert!((history.find(12).unwrap().resulting_state.position.x - 110.0).abs() < 1e-3);
    }

    #[test]
    fn flag_mismatch_is_corrected_even_without_positional_error() {
        let mut predictor = predictor_at(0.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        run(&mut predictor, &mut history, &[1]);
        assert!(predictor.state().double_jump_available);

        let mut snap = snapshot(1, 10.0);
        snap.entities[0].flags = Some(EntityFlags::new(true, false));
        let outcome = engine.reconcile(&snap, LOCAL, &mut predictor, &mut history);

        let ReconcileOutcome::Corrected { error, replayed, .. } = outcome else {
            panic!("expected correction, got {outcome:?}");
        };
        assert!(error < 1e-3);
        assert_eq!(replayed, 0);
        assert!(!predictor.state().double_jump_available);
        assert!(history.is_empty());
    }

    #[test]
    fn reapplying_a_snapshot_changes_nothing() {
        let mut predictor = predictor_at(90.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        run(&mut predictor, &mut history, &[10, 11, 12]);
        let snap = snapshot(10, 90.0);

        engine.reconcile(&snap, LOCAL, &mut predictor, &mut history);
        let state = *predictor.state();
        let len = history.len();

        let again = engine.reconcile(&snap, LOCAL, &mut predictor, &mut history);

        assert_eq!(again, ReconcileOutcome::Stale { acked_sequence: 10 });
        assert_eq!(predictor.state(), &state);
        assert_eq!(history.len(), len);
    }

    #[test]
    fn out_of_order_ack_is_ignored() {
        let mut predictor = predictor_at(0.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        run(&mut predictor, &mut history, &[1, 2, 3, 4]);

        engine.reconcile(&snapshot(3, 30.0), LOCAL, &mut predictor, &mut history);
        let outcome = engine.reconcile(&snapshot(2, -500.0), LOCAL, &mut predictor, &mut history);

        assert_eq!(outcome, ReconcileOutcome::Stale { acked_sequence: 2 });
        assert!((predictor.state().position.x - 40.0).abs() < 1e-3);
    }

    #[test]
    fn missing_history_entry_adopts_server_state() {
        let mut predictor = predictor_at(0.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        run(&mut predictor, &mut history, &[5, 6]);

        let outcome = engine.reconcile(&snapshot(3, 77.0), LOCAL, &mut predictor, &mut history);

        assert_eq!(outcome, ReconcileOutcome::Snapped { acked_sequence: 3 });
        assert_eq!(predictor.state().position, Vec2::new(77.0, 0.0));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn snapshot_without_local_entity_is_absent() {
        let mut predictor = predictor_at(0.0);
        let mut history = CommandHistory::new(64);
        let mut engine = ReconciliationEngine::new(0.01);
        run(&mut predictor, &mut history, &[1]);

        let mut empty = WorldSnapshot::new(1, 0.0);
        empty.last_command_ack = 1;
        let outcome = engine.reconcile(&empty, LOCAL, &mut predictor, &mut history);

        assert_eq!(outcome, ReconcileOutcome::Absent);
        assert_eq!(engine.last_acked(), 0);
    }
}
