//! Agents and the dense store that owns them
//!
//! The store is allocated once per session and never grows or shrinks.
//! Destroyed agents stay in their slot with a dead status until they are
//! revived in place, so handles (`u32` slot indices) never dangle.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// What an agent is, independent of whether it is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Player,
    Laser,
    Asteroid,
}

/// Kind and liveness packed into one byte.
///
/// `0..=2` are the live kinds, `3..=5` their dead counterparts (offset by 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Player = 0,
    Laser = 1,
    Asteroid = 2,
    DeadPlayer = 3,
    DeadLaser = 4,
    DeadAsteroid = 5,
}

impl Status {
    /// Offset between a live kind and its dead counterpart
    pub const DEAD_OFFSET: u8 = 3;

    pub fn alive(kind: Kind) -> Self {
        match kind {
            Kind::Player => Status::Player,
            Kind::Laser => Status::Laser,
            Kind::Asteroid => Status::Asteroid,
        }
    }

    pub fn dead(kind: Kind) -> Self {
        match kind {
            Kind::Player => Status::DeadPlayer,
            Kind::Laser => Status::DeadLaser,
            Kind::Asteroid => Status::DeadAsteroid,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Status::Player),
            1 => Some(Status::Laser),
            2 => Some(Status::Asteroid),
            3 => Some(Status::DeadPlayer),
            4 => Some(Status::DeadLaser),
            5 => Some(Status::DeadAsteroid),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_alive(self) -> bool {
        self.as_u8() < Self::DEAD_OFFSET
    }

    #[inline]
    pub fn kind(self) -> Kind {
        match self {
            Status::Player | Status::DeadPlayer => Kind::Player,
            Status::Laser | Status::DeadLaser => Kind::Laser,
            Status::Asteroid | Status::DeadAsteroid => Kind::Asteroid,
        }
    }

    /// Dead counterpart of this status (dead stays dead)
    #[inline]
    pub fn killed(self) -> Self {
        Status::dead(self.kind())
    }
}

/// A simulated circle: 16 bytes with `#[repr(C)]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Agent {
    pub pos: Vec2,
    /// Respawn countdown for a destroyed asteroid, remaining lifetime for a
    /// live laser
    pub timer: f32,
    /// Index into [`MotionTables::speed`]
    pub speed: u8,
    /// Index into [`MotionTables::direction`]
    pub dir_x: u8,
    pub dir_y: u8,
    pub status: Status,
}

impl Agent {
    pub fn new(status: Status, pos: Vec2) -> Self {
        Self {
            pos,
            timer: 0.0,
            speed: 0,
            dir_x: MotionTables::STILL,
            dir_y: MotionTables::STILL,
            status,
        }
    }

    pub fn asteroid(pos: Vec2) -> Self {
        Self::new(Status::Asteroid, pos)
    }

    pub fn laser(pos: Vec2) -> Self {
        Self::new(Status::Laser, pos)
    }

    pub fn player(pos: Vec2) -> Self {
        Self::new(Status::Player, pos)
    }

    /// Builder-style motion bytes
    pub fn with_motion(mut self, speed: u8, dir_x: u8, dir_y: u8) -> Self {
        self.speed = speed;
        self.dir_x = dir_x;
        self.dir_y = dir_y;
        self
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.status.kind()
    }

    /// Pick fresh random motion bytes
    pub fn randomize_motion<R: Rng>(&mut self, rng: &mut R) {
        self.speed = rng.random();
        self.dir_x = rng.random();
        self.dir_y = rng.random();
    }
}

/// 256-entry lookup tables turning motion bytes into continuous values
#[derive(Debug, Clone)]
pub struct MotionTables {
    speed: [f32; 256],
    direction: [f32; 256],
}

impl MotionTables {
    /// Direction byte closest to zero. Byte 127 maps to -1/255, not 0;
    /// use speed 0 (with a zero minimum) for agents that must not move.
    pub const STILL: u8 = 127;

    pub fn new(speed_min: f32, speed_max: f32) -> Self {
        let mut speed = [0.0; 256];
        let mut direction = [0.0; 256];
        for i in 0..256 {
            let t = i as f32 / 255.0;
            speed[i] = speed_min + (speed_max - speed_min) * t;
            direction[i] = t * 2.0 - 1.0;
        }
        Self { speed, direction }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.asteroid_speed_min, settings.asteroid_speed_max)
    }

    #[inline]
    pub fn speed(&self, byte: u8) -> f32 {
        self.speed[byte as usize]
    }

    #[inline]
    pub fn direction(&self, byte: u8) -> f32 {
        self.direction[byte as usize]
    }

    /// Nearest byte for a direction component in `[-1, 1]`
    pub fn direction_byte(component: f32) -> u8 {
        let t = (component.clamp(-1.0, 1.0) + 1.0) / 2.0;
        (t * 255.0).round() as u8
    }

    /// Direction vector encoded by an agent's bytes
    #[inline]
    pub fn heading(&self, agent: &Agent) -> Vec2 {
        Vec2::new(self.direction(agent.dir_x), self.direction(agent.dir_y))
    }
}

/// Fixed-capacity dense array of agents
#[derive(Debug, Clone)]
pub struct AgentStore {
    agents: Vec<Agent>,
    player: Option<u32>,
}

impl AgentStore {
    /// Wrap an explicit agent list; the first player (if any) is the player
    pub fn from_agents(agents: Vec<Agent>) -> Self {
        let player = agents
            .iter()
            .position(|a| a.kind() == Kind::Player)
            .map(|i| i as u32);
        Self { agents, player }
    }

    /// One asteroid per integer grid point, the player in slot 0 between grid
    /// points at the world centre, and the laser pool at the end
    pub fn grid_layout<R: Rng>(settings: &Settings, rng: &mut R) -> Self {
        let dim = settings.world_dimension.floor() as usize;
        let mut agents = Vec::with_capacity(1 + dim * dim + settings.laser_pool);

        let center = settings.world_dimension / 2.0 - 0.5;
        agents.push(Agent::player(Vec2::splat(center)));

        for x in 0..dim {
            for y in 0..dim {
                let mut asteroid = Agent::asteroid(Vec2::new(x as f32, y as f32));
                asteroid.randomize_motion(rng);
                agents.push(asteroid);
            }
        }

        Self::push_laser_pool(&mut agents, settings.laser_pool);
        Self::from_agents(agents)
    }

    /// `count` asteroids at uniformly random positions, player at the centre
    pub fn random_layout<R: Rng>(settings: &Settings, count: usize, rng: &mut R) -> Self {
        let dim = settings.world_dimension;
        let mut agents = Vec::with_capacity(1 + count + settings.laser_pool);
        agents.push(Agent::player(Vec2::splat(dim / 2.0)));

        for _ in 0..count {
            let pos = Vec2::new(rng.random_range(0.0..dim), rng.random_range(0.0..dim));
            let mut asteroid = Agent::asteroid(pos);
            asteroid.randomize_motion(rng);
            agents.push(asteroid);
        }

        Self::push_laser_pool(&mut agents, settings.laser_pool);
        Self::from_agents(agents)
    }

    fn push_laser_pool(agents: &mut Vec<Agent>, pool: usize) {
        agents.extend((0..pool).map(|_| Agent::new(Status::DeadLaser, Vec2::ZERO)));
    }

    /// Total slots, live or dead
    #[inline]
    pub fn count(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// # Panics
    /// If `handle` is not a slot of this store.
    #[inline]
    pub fn get(&self, handle: u32) -> &Agent {
        &self.agents[handle as usize]
    }

    /// # Panics
    /// If `handle` is not a slot of this store.
    #[inline]
    pub fn get_mut(&mut self, handle: u32) -> &mut Agent {
        &mut self.agents[handle as usize]
    }

    #[inline]
    pub fn position(&self, handle: u32) -> Vec2 {
        self.agents[handle as usize].pos
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Agent)> {
        self.agents.iter().enumerate().map(|(i, a)| (i as u32, a))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut Agent)> {
        self.agents
            .iter_mut()
            .enumerate()
            .map(|(i, a)| (i as u32, a))
    }

    pub fn as_slice(&self) -> &[Agent] {
        &self.agents
    }

    pub fn live_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_alive()).count()
    }

    pub fn live_count_of(&self, kind: Kind) -> usize {
        self.agents
            .iter()
            .filter(|a| a.is_alive() && a.kind() == kind)
            .count()
    }

    pub fn player_handle(&self) -> Option<u32> {
        self.player
    }

    pub fn player(&self) -> Option<&Agent> {
        self.player.map(|h| self.get(h))
    }

    /// First dead laser slot available for firing
    pub fn free_laser_slot(&self) -> Option<u32> {
        self.agents
            .iter()
            .position(|a| a.status == Status::DeadLaser)
            .map(|i| i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_status_encoding() {
        for kind in [Kind::Player, Kind::Laser, Kind::Asteroid] {
            let alive = Status::alive(kind);
            let dead = Status::dead(kind);
            assert!(alive.is_alive());
            assert!(!dead.is_alive());
            assert_eq!(dead.as_u8(), alive.as_u8() + Status::DEAD_OFFSET);
            assert_eq!(alive.killed(), dead);
            assert_eq!(dead.killed(), dead);
            assert_eq!(Status::from_u8(dead.as_u8()), Some(dead));
        }
        assert_eq!(Status::from_u8(6), None);
    }

    #[test]
    fn test_agent_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<Agent>(), 16);
    }

    #[test]
    fn test_motion_tables_span_range() {
        let tables = MotionTables::new(0.5, 1.5);
        assert!((tables.speed(0) - 0.5).abs() < 1e-6);
        assert!((tables.speed(255) - 1.5).abs() < 1e-6);
        assert!((tables.direction(0) + 1.0).abs() < 1e-6);
        assert!((tables.direction(255) - 1.0).abs() < 1e-6);
        assert!(tables.direction(MotionTables::STILL).abs() < 0.01);
    }

    #[test]
    fn test_direction_byte_inverse() {
        let tables = MotionTables::new(0.0, 1.0);
        for &d in &[-1.0f32, -0.5, 0.0, 0.3, 1.0] {
            let byte = MotionTables::direction_byte(d);
            assert!((tables.direction(byte) - d).abs() <= 1.0 / 255.0);
        }
    }

    #[test]
    fn test_grid_layout() {
        let settings = Settings {
            world_dimension: 10.0,
            laser_pool: 4,
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let store = AgentStore::grid_layout(&settings, &mut rng);

        assert_eq!(store.count(), 1 + 100 + 4);
        assert_eq!(store.player_handle(), Some(0));
        assert_eq!(store.live_count_of(Kind::Asteroid), 100);
        assert_eq!(store.live_count_of(Kind::Laser), 0);
        assert_eq!(store.live_count(), 101);
        assert_eq!(store.free_laser_slot(), Some(101));
    }

    #[test]
    fn test_random_layout_inside_world() {
        let settings = Settings {
            world_dimension: 50.0,
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(9);
        let store = AgentStore::random_layout(&settings, 500, &mut rng);
        for (_, agent) in store.iter() {
            assert!(agent.pos.x >= 0.0 && agent.pos.x < 50.0);
            assert!(agent.pos.y >= 0.0 && agent.pos.y < 50.0);
        }
    }
}
