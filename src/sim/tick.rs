//! Per-frame simulation step
//!
//! Order within a frame:
//! 1. input (player position, laser cooldown)
//! 2. move asteroids and lasers
//! 3. expire lasers
//! 4. repair the index and drop dead handles
//! 5. fire (the new laser joins an index that no longer holds its old life)
//! 6. detect and resolve collisions
//! 7. apply collision outcomes
//! 8. advance respawns and index revived asteroids

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::respawn::expire_lasers;
use super::state::SimState;
use crate::error::SimError;

/// Input commands for a single tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    /// Player position from the transform layer
    pub player_position: Option<Vec2>,
    /// Fire a laser along this direction
    pub fire: Option<Vec2>,
}

/// Advance the simulation by `dt` seconds
pub fn tick(state: &mut SimState, input: &TickInput, dt: f32) -> Result<(), SimError> {
    if let (Some(pos), Some(handle)) = (input.player_position, state.store.player_handle()) {
        state.set_position(handle, pos);
    }
    state.laser_cooldown = (state.laser_cooldown - dt).max(0.0);

    state.move_agents(dt);
    expire_lasers(dt, &mut state.store);

    let parallel = state.settings.parallel;
    state.index.maintain(&state.store, parallel)?;

    if let Some(direction) = input.fire {
        if state.laser_cooldown <= 0.0 && state.fire(direction)?.is_some() {
            state.laser_cooldown = state.settings.laser_fire_interval;
        }
    }

    let events = state.index.detect(&mut state.store, &state.narrow, parallel);
    state.apply_events(events);

    let player = state
        .store
        .player()
        .filter(|p| p.is_alive())
        .map(|p| p.pos);
    let revived = state
        .respawn
        .tick(dt, &mut state.store, player, &mut state.rng);
    for handle in revived {
        state.index.insert(handle, &state.store)?;
    }

    state.frame += 1;
    if log::log_enabled!(log::Level::Debug) && state.frame % 60 == 0 {
        log::debug!("{:?}", state.stats());
    }
    Ok(())
}
