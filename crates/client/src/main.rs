mod reference_server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;

use brawl::{LinkConditions, LinkSimulator};
use brawl_client::net::{ClientConfig, ClientSession, Control, RawInput};
use reference_server::{BOT_ID, PLAYER_ID, ReferenceServer};

#[derive(Parser)]
#[command(name = "brawl-client")]
#[command(about = "Headless netcode session against an in-process server")]
struct Args {
    #[arg(short, long, default_value_t = 900, help = "Frames to simulate")]
    ticks: u32,

    #[arg(long, default_value_t = 60, help = "One-way latency in ms")]
    latency_ms: u32,

    #[arg(long, default_value_t = 10, help = "Jitter in ms")]
    jitter_ms: u32,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 7, help = "Seed for the simulated link")]
    seed: u64,

    #[arg(short, long, help = "RON client config")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };

    let conditions = LinkConditions {
        loss_percent: args.loss_percent.clamp(0.0, 100.0),
        ..LinkConditions::latency(args.latency_ms, args.jitter_ms)
    };
    log::info!(
        "Simulating {} frames at {} Hz, {} ms +{} ms jitter, {:.1}% loss",
        args.ticks,
        config.tick_rate,
        args.latency_ms,
        args.jitter_ms,
        conditions.loss_percent
    );

    let spawn = Vec2::ZERO;
    let mut server =
        ReferenceServer::new(config.movement.clone(), &config.level, config.tick_rate, spawn);
    let mut uplink = LinkSimulator::new(conditions.clone(), args.seed);
    let mut downlink = LinkSimulator::new(conditions, args.seed.wrapping_add(1));

    let server_dt_ms = 1000.0 / config.tick_rate.max(1) as f64;
    let (mut session, mut link) = ClientSession::headless(config);
    session.connect(PLAYER_ID, spawn);

    let mut raw = RawInput::default();
    let mut now_ms = 0.0;
    let mut server_clock_ms = 0.0;
    let mut last_bot_position = None;

    for frame in 0..args.ticks {
        // Uneven frame pacing around 60 fps.
        let frame_ms = if frame % 3 == 0 { 20.0 } else { 15.0 };
        now_ms += frame_ms;

        while let Ok(bytes) = link.from_client.try_recv() {
            uplink.send(bytes, now_ms);
        }
        for bytes in uplink.take_ready(now_ms) {
            match server.receive(&bytes, now_ms) {
                Ok(Some(reply)) => downlink.send(reply, now_ms),
                Ok(None) => {}
                Err(err) => log::warn!("Server rejected frame: {}", err),
            }
        }

        while server_clock_ms + server_dt_ms <= now_ms {
            server_clock_ms += server_dt_ms;
            if let Some(snapshot) = server.step(server_clock_ms)? {
                downlink.send(snapshot, server_clock_ms);
            }
        }

        for bytes in downlink.take_ready(now_ms) {
            link.to_client
                .send(bytes)
                .context("session inbox closed")?;
        }

        script_input(frame, &mut raw);
        session.update((frame_ms / 1000.0) as f32, &raw, now_ms);

        if let Some(position) = session.render_position(BOT_ID, now_ms) {
            last_bot_position = Some(position);
        }
        for event in session.drain_events() {
            log::debug!("Event: {:?}", event);
        }
    }

    let stats = session.stats();
    let state = session.predicted_state();
    log::info!(
        "Server tick {} acked {}, client at ({:.1}, {:.1}) with {} pending commands",
        server.tick(),
        server.last_ack(),
        state.position.x,
        state.position.y,
        stats.pending_commands
    );
    log::info!(
        "Clock rtt {:.1} ms, jitter {:.1} ms, offset {:.1} ms, {} probes dropped",
        stats.clock.smoothed_rtt_ms,
        stats.clock.smoothed_jitter_ms,
        stats.clock.offset_ms,
        stats.dropped_probes
    );
    log::info!(
        "Corrections {} (mean {:.2}, max {:.2}), confirmations {}, snaps {}, replayed {}, dropped frames {}",
        stats.corrections.corrections,
        stats.corrections.mean_correction,
        stats.corrections.max_correction,
        stats.corrections.confirmations,
        stats.corrections.snaps,
        stats.corrections.replayed_commands,
        stats.corrections.dropped_frames
    );
    log::info!(
        "Interpolation: {} interpolated, {} held, {} starved, delay {:.1} ms, bot last drawn at {:?}",
        stats.interpolation.interpolated,
        stats.interpolation.held,
        stats.interpolation.starved,
        stats.interpolation.last_delay_ms,
        last_bot_position
    );
    log::info!(
        "Health {}, deaths {}, projectiles live {}, pool reuses {}, quality {:?}",
        session.health(),
        session.deaths(),
        session.projectiles().count(),
        stats.forced_pool_reuses,
        stats.quality
    );

    session.shutdown();
    Ok(())
}

/// Walks right, hops onto ledges, walks back left, and fires now and then.
fn script_input(frame: u32, raw: &mut RawInput) {
    let phase = frame % 240;
    raw.set_control(Control::Right, phase < 100);
    raw.set_control(Control::Left, (120..220).contains(&phase));
    raw.set_control(Control::Jump, matches!(phase, 30..=33 | 45..=47 | 150..=152));
    raw.set_control(Control::Fire, phase % 60 == 0);
    raw.set_pointer(Some(Vec2::new(1.0, 0.0)));

    if frame == 400 {
        raw.focus_lost();
    } else if frame == 430 {
        raw.focus_gained();
    }
}
