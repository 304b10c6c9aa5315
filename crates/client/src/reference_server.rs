//! Toy authoritative server for the headless demo. It runs the same
//! movement code as the client but knows about one extra ledge the client
//! level lacks, so the demo exercises corrections.

use glam::Vec2;

use brawl::net::sequence_greater_than;
use brawl::{
    ClientMessage, Command, EntityFlags, EntityState, EphemeralState, Level, MovementConfig,
    MovementController, Platform, PredictedState, ProbeEcho, ProtocolError, ServerMessage, Tally,
    WorldSnapshot,
};

pub const PLAYER_ID: u32 = 1;
pub const BOT_ID: u32 = 2;

const SERVER_CLOCK_LEAD_MS: f64 = 5_000.0;
const SNAPSHOT_EVERY_TICKS: u32 = 2;
const PROJECTILE_EVERY_TICKS: u32 = 45;
const PROJECTILE_LIFETIME_TICKS: u32 = 40;
const PROJECTILE_SPEED: f32 = 240.0;
const BOT_SPEED: f32 = 80.0;
const BOT_PATROL: f32 = 150.0;

#[derive(Debug, Clone, Copy)]
struct LiveProjectile {
    state: EphemeralState,
    expires_tick: u32,
}

#[derive(Debug)]
pub struct ReferenceServer {
    controller: MovementController,
    dt: f32,
    tick: u32,
    player: PredictedState,
    last_ack: u32,
    health: u16,
    tally: Tally,
    bot: Vec2,
    bot_direction: f32,
    projectiles: Vec<LiveProjectile>,
    next_projectile_id: u32,
}

impl ReferenceServer {
    pub fn new(movement: MovementConfig, client_level: &Level, tick_rate: u32, spawn: Vec2) -> Self {
        let level = client_level
            .clone()
            .with_platform(Platform::new(30.0, 90.0, 20.0));
        Self {
            controller: MovementController::new(movement, level),
            dt: 1.0 / tick_rate.max(1) as f32,
            tick: 0,
            player: PredictedState::at(spawn),
            last_ack: 0,
            health: 100,
            tally: Tally::default(),
            bot: Vec2::new(-BOT_PATROL, 0.0),
            bot_direction: 1.0,
            projectiles: Vec::new(),
            next_projectile_id: 1000,
        }
    }

    pub fn server_time(&self, now_ms: f64) -> f64 {
        now_ms + SERVER_CLOCK_LEAD_MS
    }

    /// Handles one client frame, returning an immediate reply if any.
    pub fn receive(&mut self, bytes: &[u8], now_ms: f64) -> Result<Option<Vec<u8>>, ProtocolError> {
        match ClientMessage::decode(bytes)? {
            ClientMessage::Command(command) => {
                self.apply(&command);
                Ok(None)
            }
            ClientMessage::Probe(probe) => {
                let echo = ServerMessage::ProbeEcho(ProbeEcho {
                    client_send_ms: probe.client_send_ms,
                    server_time_ms: self.server_time(now_ms),
                });
                echo.encode().map(Some)
            }
        }
    }

    fn apply(&mut self, command: &Command) {
        if !sequence_greater_than(command.sequence, self.last_ack) {
            return;
        }
        self.player = self
            .controller
            .apply_command(&self.player, command, self.dt, &mut |_| {});
        self.last_ack = command.sequence;
    }

    /// Advances the server world one tick and returns a snapshot frame on
    /// snapshot ticks.
    pub fn step(&mut self, now_ms: f64) -> Result<Option<Vec<u8>>, ProtocolError> {
        self.tick = self.tick.wrapping_add(1);
        self.step_bot();
        self.step_projectiles();

        if self.tick % SNAPSHOT_EVERY_TICKS != 0 {
            return Ok(None);
        }
        ServerMessage::Snapshot(self.snapshot(now_ms))
            .encode()
            .map(Some)
    }

    fn step_bot(&mut self) {
        self.bot.x += self.bot_direction * BOT_SPEED * self.dt;
        if self.bot.x.abs() >= BOT_PATROL {
            self.bot.x = self.bot.x.clamp(-BOT_PATROL, BOT_PATROL);
            self.bot_direction = -self.bot_direction;
        }
    }

    fn step_projectiles(&mut self) {
        let tick = self.tick;
        let dt = self.dt;
        for projectile in &mut self.projectiles {
            projectile.state.position[0] += projectile.state.velocity[0] * dt;
            if tick >= projectile.expires_tick {
                projectile.state.valid = false;
            }
        }

        let player = self.player.position;
        let mut hits = 0u16;
        for projectile in self.projectiles.iter_mut().filter(|p| p.state.valid) {
            if Vec2::from(projectile.state.position).distance(player) < 8.0 {
                projectile.state.valid = false;
                hits += 1;
            }
        }
        if hits > 0 {
            self.health = self.health.saturating_sub(10 * hits);
            if self.health == 0 {
                self.health = 100;
                self.tally.deaths += 1;
            }
        }

        // Invalid entries are reported once, then forgotten.
        self.projectiles
            .retain(|p| p.state.valid || tick < p.expires_tick + SNAPSHOT_EVERY_TICKS);

        if tick % PROJECTILE_EVERY_TICKS == 0 {
            self.projectiles.push(LiveProjectile {
                state: EphemeralState {
                    entity_id: self.next_projectile_id,
                    owner_id: BOT_ID,
                    position: [self.bot.x, 12.0],
                    velocity: [PROJECTILE_SPEED * self.bot_direction, 0.0],
                    valid: true,
                },
                expires_tick: tick + PROJECTILE_LIFETIME_TICKS,
            });
            self.next_projectile_id = self.next_projectile_id.wrapping_add(1);
        }
    }

    fn snapshot(&self, now_ms: f64) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(self.tick, self.server_time(now_ms));
        snapshot.last_command_ack = self.last_ack;

        let mut player = self.player.to_entity_state(PLAYER_ID);
        player.health = Some(self.health);
        player.tally = Some(self.tally);
        snapshot.entities.push(player);

        let mut bot = EntityState::new(
            BOT_ID,
            self.bot.to_array(),
            [self.bot_direction * BOT_SPEED, 0.0],
        );
        bot.flags = Some(EntityFlags::new(true, true));
        snapshot.entities.push(bot);

        snapshot.ephemeral = self.projectiles.iter().map(|p| p.state).collect();
        snapshot
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }
}
