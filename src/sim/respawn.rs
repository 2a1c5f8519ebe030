//! Respawn countdowns and laser lifetimes
//!
//! Destroyed asteroids keep their slot and wait here until their countdown
//! runs out, then reappear somewhere off-screen with fresh motion bytes.

use glam::Vec2;
use rand::Rng;

use super::agent::{AgentStore, Kind, Status};
use crate::settings::Settings;
use crate::wrap_coord;

/// Where revived asteroids are placed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPlacement {
    pub world_dimension: f32,
    /// Half extents of the player's view
    pub frustum: Vec2,
}

impl SpawnPlacement {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            world_dimension: settings.world_dimension,
            frustum: Vec2::new(settings.frustum_half_width, settings.frustum_half_height),
        }
    }

    /// Uniform point in the world, pushed one half extent further away from
    /// the player on every axis where it falls inside the view.
    ///
    /// This is a heuristic, not rejection sampling: a point pushed on one
    /// axis can still wrap back next to the player in a world smaller than
    /// the view.
    pub fn location<R: Rng>(&self, player: Option<Vec2>, rng: &mut R) -> Vec2 {
        let dim = self.world_dimension;
        let mut pos = Vec2::new(rng.random_range(0.0..dim), rng.random_range(0.0..dim));
        if let Some(player) = player {
            pos.x = push_out(pos.x, player.x, self.frustum.x);
            pos.y = push_out(pos.y, player.y, self.frustum.y);
        }
        Vec2::new(wrap_coord(pos.x, dim), wrap_coord(pos.y, dim))
    }
}

#[inline]
fn push_out(value: f32, center: f32, half_extent: f32) -> f32 {
    let offset = value - center;
    if offset.abs() >= half_extent {
        value
    } else if offset > 0.0 {
        value + half_extent
    } else {
        value - half_extent
    }
}

#[derive(Debug, Clone)]
pub struct RespawnScheduler {
    delay: f32,
    placement: SpawnPlacement,
    /// Counting down this frame
    pending: Vec<u32>,
    /// Scheduled this frame; start counting on the next tick
    incoming: Vec<u32>,
    scheduled: Vec<bool>,
}

impl RespawnScheduler {
    pub fn new(delay: f32, placement: SpawnPlacement, agent_count: usize) -> Self {
        Self {
            delay,
            placement,
            pending: Vec::new(),
            incoming: Vec::new(),
            scheduled: vec![false; agent_count],
        }
    }

    pub fn from_settings(settings: &Settings, agent_count: usize) -> Self {
        Self::new(
            settings.respawn_delay,
            SpawnPlacement::from_settings(settings),
            agent_count,
        )
    }

    /// Start the countdown for a destroyed asteroid. Returns false (and
    /// leaves the running countdown alone) when it is already scheduled.
    pub fn schedule(&mut self, handle: u32, store: &mut AgentStore) -> bool {
        let slot = &mut self.scheduled[handle as usize];
        if *slot {
            return false;
        }
        *slot = true;
        store.get_mut(handle).timer = self.delay;
        self.incoming.push(handle);
        true
    }

    #[inline]
    pub fn is_scheduled(&self, handle: u32) -> bool {
        self.scheduled[handle as usize]
    }

    /// Asteroids waiting to respawn
    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.incoming.len()
    }

    pub fn spawn_location<R: Rng>(&self, player: Option<Vec2>, rng: &mut R) -> Vec2 {
        self.placement.location(player, rng)
    }

    /// Advance every running countdown by `dt` and revive the asteroids whose
    /// countdown ran out. Returns the revived handles, which the caller must
    /// put back into the spatial index.
    pub fn tick<R: Rng>(
        &mut self,
        dt: f32,
        store: &mut AgentStore,
        player: Option<Vec2>,
        rng: &mut R,
    ) -> Vec<u32> {
        let placement = self.placement;
        let scheduled = &mut self.scheduled;
        let mut revived = Vec::new();

        self.pending.retain(|&handle| {
            let agent = store.get_mut(handle);
            agent.timer -= dt;
            if agent.timer > 0.0 {
                return true;
            }
            agent.timer = 0.0;
            agent.pos = placement.location(player, rng);
            agent.status = Status::Asteroid;
            agent.randomize_motion(rng);
            scheduled[handle as usize] = false;
            revived.push(handle);
            false
        });
        self.pending.append(&mut self.incoming);

        if !revived.is_empty() {
            log::debug!(
                "Respawned {} asteroids, {} still pending",
                revived.len(),
                self.pending.len()
            );
        }
        revived
    }
}

/// Count down live lasers and retire the ones whose lifetime ran out.
/// Returns how many were retired.
pub fn expire_lasers(dt: f32, store: &mut AgentStore) -> usize {
    let mut expired = 0;
    for (_, agent) in store.iter_mut() {
        if agent.status != Status::alive(Kind::Laser) {
            continue;
        }
        agent.timer -= dt;
        if agent.timer <= 0.0 {
            agent.timer = 0.0;
            agent.status = Status::DeadLaser;
            expired += 1;
        }
    }
    expired
}
