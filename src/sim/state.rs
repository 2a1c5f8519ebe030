//! Simulation state
//!
//! Everything a frame needs lives in [`SimState`]; there are no globals.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::agent::{Agent, AgentStore, Kind, MotionTables, Status};
use super::collision::{CollisionEvent, NarrowPhase};
use super::index::SpatialIndex;
use super::respawn::RespawnScheduler;
use crate::error::{InvariantViolation, SimError};
use crate::settings::Settings;
use crate::wrap_coord;

/// What happened during one frame. Accumulates until the consumer calls
/// [`SimState::take_report`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Asteroids shot down by lasers
    pub asteroids_destroyed: u32,
    pub player_died: bool,
    pub events: Vec<CollisionEvent>,
}

/// Aggregate counters for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub frame: u64,
    pub live_asteroids: usize,
    pub live_lasers: usize,
    pub pending_respawns: usize,
    pub indexed: usize,
    pub score: u64,
}

#[derive(Debug, Clone)]
pub struct SimState {
    pub settings: Settings,
    pub store: AgentStore,
    pub index: SpatialIndex,
    pub respawn: RespawnScheduler,
    pub motion: MotionTables,
    pub narrow: NarrowPhase,
    pub rng: Pcg32,
    pub score: u64,
    pub frame: u64,
    /// Seconds until the next shot is allowed
    pub laser_cooldown: f32,
    report: FrameReport,
}

impl SimState {
    /// Validate settings, index every live agent of `store`, and seed the RNG
    pub fn new(settings: Settings, store: AgentStore) -> Result<Self, SimError> {
        settings.validate()?;
        let mut index = SpatialIndex::from_settings(&settings)?;
        index.build(&store)?;

        log::info!(
            "Simulation ready: {} index, {} agents ({} asteroids), world {}",
            index.kind().as_str(),
            store.count(),
            store.live_count_of(Kind::Asteroid),
            settings.world_dimension
        );

        Ok(Self {
            respawn: RespawnScheduler::from_settings(&settings, store.count()),
            motion: MotionTables::from_settings(&settings),
            narrow: NarrowPhase::from_settings(&settings),
            rng: Pcg32::seed_from_u64(settings.seed),
            score: 0,
            frame: 0,
            laser_cooldown: 0.0,
            report: FrameReport::default(),
            settings,
            store,
            index,
        })
    }

    /// One asteroid per integer grid point of the world
    pub fn with_grid_layout(settings: Settings) -> Result<Self, SimError> {
        // layout draws from its own stream so the sim RNG starts at the seed
        let mut rng = Pcg32::seed_from_u64(settings.seed ^ LAYOUT_STREAM);
        let store = AgentStore::grid_layout(&settings, &mut rng);
        Self::new(settings, store)
    }

    /// `count` asteroids at uniformly random positions
    pub fn with_random_layout(settings: Settings, count: usize) -> Result<Self, SimError> {
        let mut rng = Pcg32::seed_from_u64(settings.seed ^ LAYOUT_STREAM);
        let store = AgentStore::random_layout(&settings, count, &mut rng);
        Self::new(settings, store)
    }

    #[inline]
    pub fn score(&self) -> u64 {
        self.score
    }

    #[inline]
    pub fn report(&self) -> &FrameReport {
        &self.report
    }

    /// Hand the accumulated report to the caller and start a fresh one
    pub fn take_report(&mut self) -> FrameReport {
        std::mem::take(&mut self.report)
    }

    pub fn player_position(&self) -> Option<Vec2> {
        self.store.player().map(|p| p.pos)
    }

    pub fn player_alive(&self) -> bool {
        self.store.player().is_some_and(Agent::is_alive)
    }

    /// Write a position from outside (transform layer). Takes effect in the
    /// index at the next tick.
    pub fn set_position(&mut self, handle: u32, pos: Vec2) {
        let dim = self.settings.world_dimension;
        self.store.get_mut(handle).pos = Vec2::new(wrap_coord(pos.x, dim), wrap_coord(pos.y, dim));
    }

    /// Bring the player back at `pos` and reset the score
    pub fn restart_player(&mut self, pos: Vec2) -> Result<(), SimError> {
        let Some(handle) = self.store.player_handle() else {
            return Ok(());
        };
        self.set_position(handle, pos);
        self.score = 0;
        if self.store.get(handle).is_alive() {
            return Ok(());
        }
        // the old body may still be indexed from the frame it died in
        self.index.purge_dead(&self.store);
        self.store.get_mut(handle).status = Status::Player;
        self.index.insert(handle, &self.store)?;
        log::info!("Player restarted at ({:.2}, {:.2})", pos.x, pos.y);
        Ok(())
    }

    /// Launch a laser from the player along `direction`. Returns the laser
    /// handle, or `None` when the player is dead, the direction is zero, or
    /// the pool is empty. Cooldown is the caller's business.
    pub fn fire(&mut self, direction: Vec2) -> Result<Option<u32>, SimError> {
        let Some(player) = self.store.player().filter(|p| p.is_alive()).copied() else {
            return Ok(None);
        };
        let Some(direction) = direction.try_normalize() else {
            return Ok(None);
        };
        let Some(handle) = self.store.free_laser_slot() else {
            log::warn!("Laser pool exhausted ({} slots)", self.settings.laser_pool);
            return Ok(None);
        };

        let laser = self.store.get_mut(handle);
        *laser = Agent::laser(player.pos).with_motion(
            0,
            MotionTables::direction_byte(direction.x),
            MotionTables::direction_byte(direction.y),
        );
        laser.timer = self.settings.laser_lifetime;
        self.index.insert(handle, &self.store)?;
        Ok(Some(handle))
    }

    /// Advance asteroids and lasers along their encoded headings and wrap
    /// them into the world. The player is moved from outside.
    pub fn move_agents(&mut self, dt: f32) {
        let dim = self.settings.world_dimension;
        let laser_speed = self.settings.laser_speed;
        let motion = &self.motion;
        for (_, agent) in self.store.iter_mut() {
            let speed = match agent.status {
                Status::Asteroid => motion.speed(agent.speed),
                Status::Laser => laser_speed,
                _ => continue,
            };
            let pos = agent.pos + motion.heading(agent) * speed * dt;
            agent.pos = Vec2::new(wrap_coord(pos.x, dim), wrap_coord(pos.y, dim));
        }
    }

    /// Turn resolved collisions into game state: asteroids start their
    /// respawn countdown, a dead player is flagged, laser hits score
    pub fn apply_events(&mut self, events: Vec<CollisionEvent>) {
        for event in &events {
            for (handle, kind) in event.participants() {
                match kind {
                    Kind::Asteroid => {
                        self.respawn.schedule(handle, &mut self.store);
                    }
                    Kind::Player => {
                        if !self.report.player_died {
                            log::info!("Player destroyed at frame {}", self.frame);
                        }
                        self.report.player_died = true;
                    }
                    Kind::Laser => {}
                }
            }
            if event.awards_score() {
                self.score += 1;
                self.report.asteroids_destroyed += 1;
            }
        }
        self.report.events.extend(events);
    }

    /// Index consistency between frames
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        self.index.verify(&self.store)
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            frame: self.frame,
            live_asteroids: self.store.live_count_of(Kind::Asteroid),
            live_lasers: self.store.live_count_of(Kind::Laser),
            pending_respawns: self.respawn.pending_count(),
            indexed: self.index.len(),
            score: self.score,
        }
    }
}

/// Mixed into the seed for layout generation
const LAYOUT_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;
