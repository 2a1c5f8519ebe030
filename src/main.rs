//! Asteroid Swarm headless driver
//!
//! Runs the simulation at a fixed timestep and logs progress. Usage:
//!
//! ```text
//! asteroid-swarm [settings.json] [frames]
//! ```

use std::time::Instant;

use glam::Vec2;

use asteroid_swarm::consts::SIM_DT;
use asteroid_swarm::sim::{SimState, TickInput, tick};
use asteroid_swarm::{SimError, Settings};

/// Frames simulated when no count is given (one minute at 60 Hz)
const DEFAULT_FRAMES: u64 = 3600;

fn main() {
    env_logger::init();
    log::info!("Asteroid Swarm (headless) starting...");

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let frames = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| SimError::InvalidSettings(format!("frame count {raw:?}: {e}")))?,
        None => DEFAULT_FRAMES,
    };

    log::info!(
        "Index: {}, distance: {}, parallel: {}",
        settings.index.as_str(),
        settings.distance.as_str(),
        settings.parallel
    );
    let mut state = SimState::with_grid_layout(settings)?;
    let spawn = state.player_position().unwrap_or(Vec2::ZERO);

    let started = Instant::now();
    let mut destroyed = 0u64;
    let mut deaths = 0u32;
    for frame in 0..frames {
        // sweep the aim around once every four seconds
        let angle = frame as f32 * SIM_DT * std::f32::consts::FRAC_PI_2;
        let input = TickInput {
            player_position: None,
            fire: Some(Vec2::from_angle(angle)),
        };
        tick(&mut state, &input, SIM_DT)?;

        let report = state.take_report();
        destroyed += u64::from(report.asteroids_destroyed);
        if report.player_died {
            deaths += 1;
            state.restart_player(spawn)?;
        }

        if (frame + 1) % 600 == 0 {
            log::info!("{:?}", state.stats());
        }
    }

    let elapsed = started.elapsed();
    log::info!(
        "Simulated {frames} frames in {:.2?} ({:.1} frames/s): {destroyed} asteroids shot, {deaths} player deaths",
        elapsed,
        frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}
