use std::collections::HashSet;

use glam::Vec2;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use brawl::net::sequence_greater_than;
use brawl::{
    ClientMessage, Command, DisplayHooks, EventQueue, FixedTimestep, GameEvent, MovementController,
    MovementCue, NetcodeError, NoDisplay, PredictedState, ProtocolError, ServerMessage,
    WorldSnapshot,
};

use super::clock::{ClockEstimate, NetworkClock};
use super::config::ClientConfig;
use super::ephemeral::{EphemeralSync, EphemeralTracker, Projectile};
use super::history::CommandHistory;
use super::input::{InputSequencer, RawInput};
use super::interpolation::{InterpolationStats, RemoteInterpolator, RemoteSample};
use super::prediction::LocalPredictor;
use super::reconciliation::{ReconcileOutcome, ReconciliationEngine};
use super::speculative::{ReconcilePolicy, SpeculativeField};
use crate::debug::{CorrectionStats, CorrectionSummary};

pub type ProjectileHooks = Box<dyn DisplayHooks<Projectile>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected { local_entity_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Good,
    Degraded,
}

/// Transport side of a session's channels. The transport pushes every
/// server frame into `to_client` and forwards whatever arrives on
/// `from_client`.
#[derive(Debug)]
pub struct SessionLink {
    pub to_client: UnboundedSender<Vec<u8>>,
    pub from_client: UnboundedReceiver<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub corrections: CorrectionSummary,
    pub interpolation: InterpolationStats,
    pub clock: ClockEstimate,
    pub dropped_probes: u64,
    pub forced_pool_reuses: u64,
    pub pending_commands: usize,
    pub dropped_events: u64,
    pub quality: ConnectionQuality,
}

#[derive(Debug, Clone, Copy)]
struct LatestSnapshot {
    tick: u32,
    server_time_ms: f64,
}

/// Everything one connection needs, constructed per session and passed
/// explicitly. Dropping or resetting it leaves nothing behind.
pub struct ClientSession {
    config: ClientConfig,
    state: SessionState,
    timestep: FixedTimestep,
    sequencer: InputSequencer,
    clock: NetworkClock,
    history: CommandHistory,
    predictor: LocalPredictor,
    reconciler: ReconciliationEngine,
    interpolator: RemoteInterpolator,
    projectiles: EphemeralTracker<ProjectileHooks>,
    kills: SpeculativeField<u16>,
    deaths: SpeculativeField<u16>,
    events: EventQueue,
    stats: CorrectionStats,
    quality: ConnectionQuality,
    latest: Option<LatestSnapshot>,
    inbox: UnboundedReceiver<Vec<u8>>,
    outbox: UnboundedSender<Vec<u8>>,
}

impl ClientSession {
    pub fn new(config: ClientConfig, hooks: ProjectileHooks) -> (Self, SessionLink) {
        let (to_client, inbox) = mpsc::unbounded_channel();
        let (outbox, from_client) = mpsc::unbounded_channel();

        let dt = config.dt();
        let controller = MovementController::new(config.movement.clone(), config.level.clone());

        let session = Self {
            state: SessionState::Disconnected,
            timestep: FixedTimestep::new(config.tick_rate)
                .with_max_frame_delta(config.max_frame_delta_secs),
            sequencer: InputSequencer::new(),
            clock: NetworkClock::new(config.clock.clone()),
            history: CommandHistory::new(config.reconcile.history_capacity),
            predictor: LocalPredictor::new(controller, PredictedState::default(), dt),
            reconciler: ReconciliationEngine::new(config.reconcile.epsilon),
            interpolator: RemoteInterpolator::new(config.interpolation.clone()),
            projectiles: EphemeralTracker::new(config.projectile_pool_capacity, hooks),
            kills: SpeculativeField::new(0, ReconcilePolicy::TrustServer),
            deaths: SpeculativeField::new(0, ReconcilePolicy::TrustServer),
            events: EventQueue::new(config.event_queue_capacity),
            stats: CorrectionStats::new(),
            quality: ConnectionQuality::Good,
            latest: None,
            inbox,
            outbox,
            config,
        };

        (session, SessionLink { to_client, from_client })
    }

    pub fn headless(config: ClientConfig) -> (Self, SessionLink) {
        Self::new(config, Box::new(NoDisplay))
    }

    pub fn connect(&mut self, local_entity_id: u32, spawn: Vec2) {
        self.reset();
        self.predictor.reset(PredictedState::at(spawn));
        self.state = SessionState::Connected { local_entity_id };
        log::info!(
            "Session connected as entity {} at ({:.1}, {:.1})",
            local_entity_id,
            spawn.x,
            spawn.y
        );
    }

    pub fn disconnect(&mut self) {
        if self.is_connected() {
            log::info!("Session disconnected");
        }
        self.reset();
    }

    /// Abandons probes, clears history, buffers and projectiles, and
    /// discards frames still queued from the previous connection.
    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.timestep.reset();
        self.sequencer.reset();
        self.clock.reset();
        self.history.clear();
        self.reconciler.reset();
        self.interpolator.clear();
        self.projectiles.clear();
        self.kills.reset(0);
        self.deaths.reset(0);
        self.events.clear();
        self.stats.reset();
        self.quality = ConnectionQuality::Good;
        self.latest = None;
        while self.inbox.try_recv().is_ok() {}
    }

    /// Feeds one rendered frame's worth of wall time. Runs as many whole
    /// ticks as have accumulated and returns how many ran.
    pub fn update(&mut self, frame_delta_secs: f32, raw: &RawInput, now_ms: f64) -> u32 {
        self.timestep.accumulate(frame_delta_secs);

        let mut ticks = 0;
        while self.timestep.consume_tick().is_some() {
            self.drain_inbox(now_ms);
            self.tick(raw, now_ms);
            ticks += 1;
        }
        ticks
    }

    /// One fixed simulation step. `update` calls this; drive it directly
    /// when the caller owns the timestep.
    pub fn tick(&mut self, raw: &RawInput, now_ms: f64) {
        let SessionState::Connected { local_entity_id } = self.state else {
            return;
        };

        let command = self.sequencer.sample(raw);
        let events = &mut self.events;
        let state = self.predictor.advance(&command, &mut |cue| {
            events.push(cue_event(local_entity_id, cue));
        });

        if let Err(err) = self.history.record(command, state) {
            log::warn!("{}", err);
        }

        self.send(&ClientMessage::Command(command));

        if let Some(probe) = self.clock.poll(now_ms) {
            self.send(&ClientMessage::Probe(probe));
        }

        self.refresh_quality();
        log::trace!(
            "Tick {} seq {} at ({:.2}, {:.2})",
            command.tick,
            command.sequence,
            state.position.x,
            state.position.y
        );
    }

    fn send(&mut self, message: &ClientMessage) {
        match message.encode() {
            Ok(bytes) => {
                if self.outbox.send(bytes).is_err() {
                    log::debug!("Transport closed, dropping outbound frame");
                }
            }
            Err(err) => log::warn!("Failed to encode outbound frame: {}", err),
        }
    }

    /// Applies every queued server frame. Called only between ticks.
    pub fn drain_inbox(&mut self, now_ms: f64) -> usize {
        let mut handled = 0;
        while let Ok(bytes) = self.inbox.try_recv() {
            handled += 1;
            if let Err(err) = self.handle_frame(&bytes, now_ms) {
                self.stats.record_dropped_frame();
                log::warn!("Dropping server frame: {}", err);
            }
        }
        handled
    }

    fn handle_frame(&mut self, bytes: &[u8], now_ms: f64) -> Result<(), NetcodeError> {
        match ServerMessage::decode(bytes)? {
            ServerMessage::Snapshot(snapshot) => self.handle_snapshot(&snapshot),
            ServerMessage::ProbeEcho(echo) => {
                self.clock.on_probe_echo(&echo, now_ms)?;
                self.refresh_quality();
                Ok(())
            }
        }
    }

    pub fn handle_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<(), NetcodeError> {
        snapshot.validate()?;
        if let Some(latest) = self.latest {
            if !sequence_greater_than(snapshot.tick, latest.tick) {
                return Err(ProtocolError::OutOfOrder {
                    tick: snapshot.tick,
                    latest: latest.tick,
                }
                .into());
            }
        }
        self.latest = Some(LatestSnapshot {
            tick: snapshot.tick,
            server_time_ms: snapshot.server_time_ms,
        });

        let SessionState::Connected { local_entity_id } = self.state else {
            return Ok(());
        };

        let outcome = self.reconciler.reconcile(
            snapshot,
            local_entity_id,
            &mut self.predictor,
            &mut self.history,
        );
        match outcome {
            ReconcileOutcome::Confirmed { .. } => self.stats.record_confirmation(),
            ReconcileOutcome::Corrected { error, replayed, .. } => {
                self.stats.record_correction(error, replayed)
            }
            ReconcileOutcome::Snapped { .. } => self.stats.record_snap(),
            ReconcileOutcome::Stale { .. } | ReconcileOutcome::Absent => {}
        }

        // Non-physical fields follow every snapshot, even one whose ack
        // reconciliation skipped as stale.
        if let Some(local) = snapshot.entity(local_entity_id) {
            let acked = snapshot.last_command_ack;
            if let Some(health) = local.health {
                let before = self.predictor.health().value();
                self.predictor.health_mut().confirm(health, acked);
                let after = self.predictor.health().value();
                if after < before {
                    self.events.push(GameEvent::TookDamage {
                        entity_id: local_entity_id,
                        amount: before - after,
                    });
                }
            }
            if let Some(tally) = local.tally {
                self.kills.confirm(tally.kills, acked);
                self.deaths.confirm(tally.deaths, acked);
            }
        }

        let mut present = HashSet::with_capacity(snapshot.entities.len());
        for entity in snapshot
            .entities
            .iter()
            .filter(|e| e.entity_id != local_entity_id)
        {
            present.insert(entity.entity_id);
            self.interpolator.ingest(
                entity.entity_id,
                RemoteSample::new(Vec2::from(entity.position), snapshot.server_time_ms)
                    .with_velocity(Vec2::from(entity.velocity)),
            );
        }
        self.interpolator.retain(|id| present.contains(&id));

        let sync: EphemeralSync = self.projectiles.sync(&snapshot.ephemeral);
        log::trace!(
            "Snapshot {} ack {} -> {:?}, projectiles {:?}",
            snapshot.tick,
            snapshot.last_command_ack,
            outcome,
            sync
        );
        Ok(())
    }

    fn refresh_quality(&mut self) {
        let degraded = self.clock.is_degraded() || self.history.is_overflowed();
        let quality = if degraded {
            ConnectionQuality::Degraded
        } else {
            ConnectionQuality::Good
        };
        if quality == self.quality {
            return;
        }

        self.quality = quality;
        match quality {
            ConnectionQuality::Degraded => log::warn!("Connection quality degraded"),
            ConnectionQuality::Good => log::info!("Connection quality recovered"),
        }
        self.events
            .push(GameEvent::QualityChanged { degraded });
    }

    /// Lowers local health at once on a locally detected hit. The server
    /// value can only restore it after the current command is acknowledged.
    pub fn predict_damage(&mut self, amount: u16) {
        let SessionState::Connected { local_entity_id } = self.state else {
            return;
        };
        let sequence = self.sequencer.next_sequence().wrapping_sub(1);
        let before = self.predictor.health().value();
        let guess = before.saturating_sub(amount);
        if self.predictor.health_mut().conjecture(guess, sequence) {
            self.events.push(GameEvent::TookDamage {
                entity_id: local_entity_id,
                amount: before - guess,
            });
        }
    }

    /// Render position for any entity: the prediction for the local one,
    /// the interpolated position for everyone else.
    pub fn render_position(&mut self, entity_id: u32, now_ms: f64) -> Option<Vec2> {
        if self.local_entity_id() == Some(entity_id) {
            return Some(self.predictor.state().position);
        }

        let estimate = self.clock.estimate();
        match self
            .interpolator
            .sample_render_position(entity_id, now_ms, &estimate)
        {
            Ok(position) => Some(position),
            Err(err) => {
                log::trace!("{}", err);
                None
            }
        }
    }

    pub fn remote_entities(&self) -> impl Iterator<Item = u32> + '_ {
        self.interpolator.entity_ids()
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = GameEvent> + '_ {
        self.events.drain()
    }

    /// Server tick the local clock believes the server is at now.
    pub fn estimated_server_tick(&self, now_ms: f64) -> Option<u32> {
        let latest = self.latest?;
        let server_now = self.clock.estimate().to_server_time(now_ms);
        let elapsed = (server_now - latest.server_time_ms).max(0.0);
        let ticks = (elapsed / self.timestep.dt_ms()).floor() as u32;
        Some(latest.tick.wrapping_add(ticks))
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        self.quality
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    pub fn local_entity_id(&self) -> Option<u32> {
        match self.state {
            SessionState::Connected { local_entity_id } => Some(local_entity_id),
            SessionState::Disconnected => None,
        }
    }

    pub fn predicted_state(&self) -> &PredictedState {
        self.predictor.state()
    }

    pub fn health(&self) -> u16 {
        self.predictor.health().value()
    }

    pub fn kills(&self) -> u16 {
        self.kills.value()
    }

    pub fn deaths(&self) -> u16 {
        self.deaths.value()
    }

    pub fn pending_commands(&self) -> impl Iterator<Item = &Command> {
        self.history.iter().map(|entry| &entry.command)
    }

    pub fn clock(&self) -> &NetworkClock {
        &self.clock
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            corrections: self.stats.summary(),
            interpolation: self.interpolator.stats(),
            clock: self.clock.estimate(),
            dropped_probes: self.clock.dropped_probes(),
            forced_pool_reuses: self.projectiles.pool().pool().forced_reclaims(),
            pending_commands: self.history.len(),
            dropped_events: self.events.dropped(),
            quality: self.quality,
        }
    }

    /// Detaches pooled projectiles from the display before the session
    /// goes away.
    pub fn shutdown(&mut self) {
        self.disconnect();
        self.projectiles.teardown();
    }
}

fn cue_event(entity_id: u32, cue: MovementCue) -> GameEvent {
    match cue {
        MovementCue::Jumped => GameEvent::Jumped { entity_id },
        MovementCue::DoubleJumped => GameEvent::DoubleJumped { entity_id },
        MovementCue::Landed { impact_speed } => GameEvent::Landed {
            entity_id,
            impact_speed,
        },
    }
}

#[cfg(test)]
mod tests {
    use brawl::{EntityState, ProbeEcho};

    use super::*;
    use crate::net::input::Control;

    const LOCAL: u32 = 1;
    const REMOTE: u32 = 2;

    fn connected() -> (ClientSession, SessionLink) {
        let (mut session, link) = ClientSession::headless(ClientConfig::default());
        session.connect(LOCAL, Vec2::ZERO);
        (session, link)
    }

    fn sent(link: &mut SessionLink) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(bytes) = link.from_client.try_recv() {
            messages.push(ClientMessage::decode(&bytes).unwrap());
        }
        messages
    }

    fn snapshot(tick: u32, server_time_ms: f64) -> WorldSnapshot {
        WorldSnapshot::new(tick, server_time_ms)
    }

    #[test]
    fn test_each_tick_sends_one_command() {
        let (mut session, mut link) = connected();
        let raw = RawInput::default();

        // Two and a half ticks worth of time at 60 Hz.
        let ticks = session.update(2.5 / 60.0, &raw, 0.0);

        let commands: Vec<u32> = sent(&mut link)
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::Command(c) => Some(c.sequence),
                ClientMessage::Probe(_) => None,
            })
            .collect();
        assert_eq!(ticks, 2);
        assert_eq!(commands, vec![1, 2]);
        assert_eq!(session.pending_commands().count(), 2);
    }

    #[test]
    fn test_first_tick_sends_a_probe() {
        let (mut session, mut link) = connected();
        session.tick(&RawInput::default(), 0.0);

        let probes = sent(&mut link)
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::Probe(_)))
            .count();
        assert_eq!(probes, 1);
    }

    #[test]
    fn test_inbox_is_only_applied_at_tick_boundaries() {
        let (mut session, link) = connected();
        let mut snap = snapshot(1, 100.0);
        snap.entities
            .push(EntityState::new(REMOTE, [50.0, 0.0], [0.0, 0.0]));
        link.to_client
            .send(ServerMessage::Snapshot(snap).encode().unwrap())
            .unwrap();

        assert!(session.remote_entities().next().is_none());

        session.update(1.0 / 60.0, &RawInput::default(), 0.0);
        assert_eq!(session.remote_entities().collect::<Vec<_>>(), vec![REMOTE]);
    }

    #[test]
    fn test_garbage_and_out_of_order_frames_are_dropped() {
        let (mut session, link) = connected();
        link.to_client.send(vec![1, 2, 3]).unwrap();
        link.to_client
            .send(ServerMessage::Snapshot(snapshot(5, 50.0)).encode().unwrap())
            .unwrap();
        link.to_client
            .send(ServerMessage::Snapshot(snapshot(4, 40.0)).encode().unwrap())
            .unwrap();

        assert_eq!(session.drain_inbox(0.0), 3);
        assert_eq!(session.stats().corrections.dropped_frames, 2);
        assert_eq!(session.estimated_server_tick(0.0), Some(5));
    }

    #[test]
    fn test_remote_entity_despawn_clears_buffer() {
        let (mut session, _link) = connected();
        let mut first = snapshot(1, 0.0);
        first
            .entities
            .push(EntityState::new(REMOTE, [0.0, 0.0], [0.0, 0.0]));
        session.handle_snapshot(&first).unwrap();
        assert!(session.render_position(REMOTE, 0.0).is_some());

        session.handle_snapshot(&snapshot(2, 16.0)).unwrap();
        assert!(session.render_position(REMOTE, 16.0).is_none());
    }

    #[test]
    fn test_jump_emits_audio_cue() {
        let (mut session, _link) = connected();
        let mut raw = RawInput::default();
        raw.press(Control::Jump);

        session.tick(&raw, 0.0);

        let events: Vec<GameEvent> = session.drain_events().collect();
        assert_eq!(events, vec![GameEvent::Jumped { entity_id: LOCAL }]);
    }

    #[test]
    fn test_health_never_rises_before_ack() {
        let (mut session, _link) = connected();
        let raw = RawInput::default();
        for _ in 0..3 {
            session.tick(&raw, 0.0);
        }
        session.predict_damage(30);
        assert_eq!(session.health(), 70);

        let mut early = snapshot(1, 0.0);
        early.last_command_ack = 1;
        let mut state = session.predicted_state().to_entity_state(LOCAL);
        state.position = [0.0, 0.0];
        state.velocity = [0.0, 0.0];
        state.health = Some(100);
        early.entities.push(state);
        session.handle_snapshot(&early).unwrap();
        assert_eq!(session.health(), 70);

        let mut late = snapshot(2, 16.0);
        late.last_command_ack = 3;
        state.health = Some(80);
        late.entities.push(state);
        session.handle_snapshot(&late).unwrap();
        assert_eq!(session.health(), 80);
    }

    #[test]
    fn test_kill_tally_trusts_server() {
        let (mut session, _link) = connected();
        session.tick(&RawInput::default(), 0.0);

        let mut snap = snapshot(1, 0.0);
        snap.last_command_ack = 1;
        let mut state = session.predicted_state().to_entity_state(LOCAL);
        state.tally = Some(brawl::Tally {
            kills: 2,
            deaths: 1,
        });
        snap.entities.push(state);
        session.handle_snapshot(&snap).unwrap();

        assert_eq!((session.kills(), session.deaths()), (2, 1));
    }

    #[test]
    fn test_repeated_ack_still_applies_server_fields() {
        let (mut session, _link) = connected();
        session.tick(&RawInput::default(), 0.0);

        let mut state = session.predicted_state().to_entity_state(LOCAL);
        state.health = Some(100);
        state.tally = Some(brawl::Tally::default());
        let mut first = snapshot(1, 0.0);
        first.last_command_ack = 1;
        first.entities.push(state);
        session.handle_snapshot(&first).unwrap();

        // Uplink stalled: the next snapshot repeats the same ack.
        state.health = Some(60);
        state.tally = Some(brawl::Tally {
            kills: 1,
            deaths: 0,
        });
        let mut second = snapshot(2, 16.0);
        second.last_command_ack = 1;
        second.entities.push(state);
        session.handle_snapshot(&second).unwrap();

        assert_eq!(session.kills(), 1);
        assert_eq!(session.health(), 60);
        assert!(session.drain_events().any(|e| matches!(
            e,
            GameEvent::TookDamage {
                entity_id: LOCAL,
                amount: 40
            }
        )));
    }

    #[test]
    fn test_probe_timeouts_degrade_quality() {
        let (mut session, mut link) = connected();
        let raw = RawInput::default();
        let mut now = 0.0;
        session.tick(&raw, now);
        for _ in 0..3 {
            now += 1000.0;
            session.tick(&raw, now);
        }

        assert_eq!(session.connection_quality(), ConnectionQuality::Degraded);
        assert!(
            session
                .drain_events()
                .any(|e| e == GameEvent::QualityChanged { degraded: true })
        );

        let probe = sent(&mut link)
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::Probe(p) => Some(p),
                ClientMessage::Command(_) => None,
            })
            .last()
            .unwrap();
        let echo = ServerMessage::ProbeEcho(ProbeEcho {
            client_send_ms: probe.client_send_ms,
            server_time_ms: now + 10.0,
        });
        link.to_client.send(echo.encode().unwrap()).unwrap();
        session.drain_inbox(now + 20.0);

        assert_eq!(session.connection_quality(), ConnectionQuality::Good);
    }

    #[test]
    fn test_disconnect_forgets_session_state() {
        let (mut session, link) = connected();
        session.tick(&RawInput::default(), 0.0);
        link.to_client
            .send(ServerMessage::Snapshot(snapshot(1, 0.0)).encode().unwrap())
            .unwrap();

        session.disconnect();

        assert!(!session.is_connected());
        assert_eq!(session.pending_commands().count(), 0);
        assert_eq!(session.drain_inbox(0.0), 0);
        assert_eq!(session.estimated_server_tick(0.0), None);
        assert!(!session.clock().has_samples());
    }
}
