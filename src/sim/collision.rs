//! Narrow phase and collision resolution
//!
//! Broad phases (quadtree scan, grid query) only decide which pairs to test.
//! Everything about *whether* two agents touch and *what happens* when they
//! do lives here, so both index strategies resolve collisions identically.

use std::sync::atomic::{AtomicU8, Ordering};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::agent::{AgentStore, Kind, Status};
use crate::fast_sqrt;
use crate::settings::{DistanceMode, Settings};

/// Collision radius per agent kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Radii {
    pub player: f32,
    pub laser: f32,
    pub asteroid: f32,
}

impl Radii {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            player: settings.player_radius,
            laser: settings.laser_radius,
            asteroid: settings.asteroid_radius,
        }
    }

    #[inline]
    pub fn of(&self, kind: Kind) -> f32 {
        match kind {
            Kind::Player => self.player,
            Kind::Laser => self.laser,
            Kind::Asteroid => self.asteroid,
        }
    }

    #[inline]
    pub fn max(&self) -> f32 {
        self.player.max(self.laser).max(self.asteroid)
    }
}

/// Circle-circle test with a configurable distance function
#[derive(Debug, Clone, Copy)]
pub struct NarrowPhase {
    pub radii: Radii,
    pub distance: DistanceMode,
}

impl NarrowPhase {
    pub fn new(radii: Radii, distance: DistanceMode) -> Self {
        Self { radii, distance }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Radii::from_settings(settings), settings.distance)
    }

    #[inline]
    pub fn distance(&self, a: Vec2, b: Vec2) -> f32 {
        match self.distance {
            DistanceMode::Exact => a.distance(b),
            DistanceMode::Fast => fast_sqrt(a.distance_squared(b)),
        }
    }

    /// True iff the two circles overlap: `distance < r_a + r_b`
    #[inline]
    pub fn overlaps(&self, pa: Vec2, ka: Kind, pb: Vec2, kb: Kind) -> bool {
        let reach = self.radii.of(ka) + self.radii.of(kb);
        // cheap per-axis rejection before any square root
        if (pb.x - pa.x).abs() >= reach || (pb.y - pa.y).abs() >= reach {
            return false;
        }
        self.distance(pa, pb) < reach
    }

    /// No pair further apart than this can collide
    #[inline]
    pub fn prune_distance(&self) -> f32 {
        2.0 * self.radii.max()
    }

    /// Distance from a quadtree division line (or grid border) inside which an
    /// agent may touch something on the other side
    #[inline]
    pub fn margin(&self) -> f32 {
        self.radii.max()
    }
}

/// What a collision between two kinds does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Player dies, asteroid enters respawn
    PlayerHit,
    /// Laser retired, asteroid enters respawn, score +1
    AsteroidShot,
    /// Both asteroids enter respawn
    AsteroidsCollide,
}

/// Collision policy. Order independent; pairs without an asteroid never
/// interact.
pub fn resolve(a: Kind, b: Kind) -> Option<Resolution> {
    match (a, b) {
        (Kind::Asteroid, Kind::Asteroid) => Some(Resolution::AsteroidsCollide),
        (Kind::Player, Kind::Asteroid) | (Kind::Asteroid, Kind::Player) => {
            Some(Resolution::PlayerHit)
        }
        (Kind::Laser, Kind::Asteroid) | (Kind::Asteroid, Kind::Laser) => {
            Some(Resolution::AsteroidShot)
        }
        _ => None,
    }
}

/// A resolved collision between two handles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub a: u32,
    pub b: u32,
    pub kind_a: Kind,
    pub kind_b: Kind,
    pub resolution: Resolution,
}

impl CollisionEvent {
    pub fn awards_score(&self) -> bool {
        self.resolution == Resolution::AsteroidShot
    }

    pub fn involves(&self, handle: u32) -> bool {
        self.a == handle || self.b == handle
    }

    /// Both participants with their kinds
    pub fn participants(&self) -> [(u32, Kind); 2] {
        [(self.a, self.kind_a), (self.b, self.kind_b)]
    }
}

/// What a broad phase needs while it scans candidate pairs.
///
/// `try_collide` is only called with two live agents. It returns true when
/// the pair collided, in which case both are dead afterwards and the caller
/// stops scanning for `a`.
pub trait Contacts {
    fn position(&self, handle: u32) -> Vec2;
    fn is_alive(&self, handle: u32) -> bool;
    fn try_collide(&mut self, a: u32, b: u32) -> bool;
}

/// Test a pair and build the event if it collides
#[inline]
fn judge(
    narrow: &NarrowPhase,
    a: u32,
    pa: Vec2,
    kind_a: Kind,
    b: u32,
    pb: Vec2,
    kind_b: Kind,
) -> Option<CollisionEvent> {
    let resolution = resolve(kind_a, kind_b)?;
    if !narrow.overlaps(pa, kind_a, pb, kind_b) {
        return None;
    }
    Some(CollisionEvent {
        a,
        b,
        kind_a,
        kind_b,
        resolution,
    })
}

/// Single-threaded contacts writing statuses straight into the store
pub struct StoreContacts<'a> {
    store: &'a mut AgentStore,
    narrow: &'a NarrowPhase,
    pub events: Vec<CollisionEvent>,
}

impl<'a> StoreContacts<'a> {
    pub fn new(store: &'a mut AgentStore, narrow: &'a NarrowPhase) -> Self {
        Self {
            store,
            narrow,
            events: Vec::new(),
        }
    }

    /// Store slots, live or dead
    pub fn len(&self) -> usize {
        self.store.count()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Position and kind of a slot
    #[inline]
    pub fn agent(&self, handle: u32) -> (Vec2, Kind) {
        let agent = self.store.get(handle);
        (agent.pos, agent.kind())
    }

    pub fn into_events(self) -> Vec<CollisionEvent> {
        self.events
    }
}

impl Contacts for StoreContacts<'_> {
    #[inline]
    fn position(&self, handle: u32) -> Vec2 {
        self.store.position(handle)
    }

    #[inline]
    fn is_alive(&self, handle: u32) -> bool {
        self.store.get(handle).is_alive()
    }

    fn try_collide(&mut self, a: u32, b: u32) -> bool {
        let (agent_a, agent_b) = (*self.store.get(a), *self.store.get(b));
        let Some(event) = judge(
            self.narrow,
            a,
            agent_a.pos,
            agent_a.kind(),
            b,
            agent_b.pos,
            agent_b.kind(),
        ) else {
            return false;
        };
        self.store.get_mut(a).status = agent_a.status.killed();
        self.store.get_mut(b).status = agent_b.status.killed();
        self.events.push(event);
        true
    }
}

/// Status bytes shared between worker threads during a parallel scan.
///
/// Positions are read from the (frozen) store; liveness goes through the
/// atomics so several subtree scans can run at once.
pub struct StatusOverlay {
    status: Vec<AtomicU8>,
}

impl StatusOverlay {
    pub fn capture(store: &AgentStore) -> Self {
        Self {
            status: store
                .iter()
                .map(|(_, a)| AtomicU8::new(a.status.as_u8()))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, handle: u32) -> Status {
        let raw = self.status[handle as usize].load(Ordering::Relaxed);
        // only ever written from valid statuses
        Status::from_u8(raw).unwrap_or(Status::DeadAsteroid)
    }

    #[inline]
    fn kill(&self, handle: u32, status: Status) {
        self.status[handle as usize].store(status.killed().as_u8(), Ordering::Relaxed);
    }

    /// Copy the overlay back into the store
    pub fn commit(self, store: &mut AgentStore) {
        for (handle, agent) in store.iter_mut() {
            let raw = self.status[handle as usize].load(Ordering::Relaxed);
            if let Some(status) = Status::from_u8(raw) {
                agent.status = status;
            }
        }
    }
}

/// Contacts for one worker of a parallel scan
pub struct SharedContacts<'a> {
    store: &'a AgentStore,
    overlay: &'a StatusOverlay,
    narrow: &'a NarrowPhase,
    pub events: Vec<CollisionEvent>,
}

impl<'a> SharedContacts<'a> {
    pub fn new(store: &'a AgentStore, overlay: &'a StatusOverlay, narrow: &'a NarrowPhase) -> Self {
        Self {
            store,
            overlay,
            narrow,
            events: Vec::new(),
        }
    }
}

impl Contacts for SharedContacts<'_> {
    #[inline]
    fn position(&self, handle: u32) -> Vec2 {
        self.store.position(handle)
    }

    #[inline]
    fn is_alive(&self, handle: u32) -> bool {
        self.overlay.get(handle).is_alive()
    }

    fn try_collide(&mut self, a: u32, b: u32) -> bool {
        let (status_a, status_b) = (self.overlay.get(a), self.overlay.get(b));
        let Some(event) = judge(
            self.narrow,
            a,
            self.store.position(a),
            status_a.kind(),
            b,
            self.store.position(b),
            status_b.kind(),
        ) else {
            return false;
        };
        self.overlay.kill(a, status_a);
        self.overlay.kill(b, status_b);
        self.events.push(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::agent::Agent;
    use proptest::prelude::*;

    fn narrow() -> NarrowPhase {
        NarrowPhase::new(
            Radii {
                player: 0.2,
                laser: 0.07,
                asteroid: 0.19,
            },
            DistanceMode::Exact,
        )
    }

    #[test]
    fn test_policy_is_order_independent() {
        let kinds = [Kind::Player, Kind::Laser, Kind::Asteroid];
        for &a in &kinds {
            for &b in &kinds {
                assert_eq!(resolve(a, b), resolve(b, a));
            }
        }
        assert_eq!(resolve(Kind::Laser, Kind::Laser), None);
        assert_eq!(resolve(Kind::Player, Kind::Laser), None);
        assert_eq!(resolve(Kind::Player, Kind::Player), None);
    }

    #[test]
    fn test_overlap_threshold() {
        let n = narrow();
        let a = Vec2::new(0.0, 0.0);
        assert!(n.overlaps(a, Kind::Asteroid, Vec2::new(0.37, 0.0), Kind::Asteroid));
        assert!(!n.overlaps(a, Kind::Asteroid, Vec2::new(0.38, 0.0), Kind::Asteroid));
        assert!(!n.overlaps(a, Kind::Asteroid, Vec2::new(0.39, 0.0), Kind::Asteroid));
        assert!(n.overlaps(a, Kind::Laser, Vec2::new(0.25, 0.0), Kind::Asteroid));
        assert!(!n.overlaps(a, Kind::Laser, Vec2::new(0.27, 0.0), Kind::Asteroid));
    }

    #[test]
    fn test_fast_distance_close_to_exact() {
        let exact = narrow();
        let fast = NarrowPhase::new(exact.radii, DistanceMode::Fast);
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(1.3, 2.1);
        let d_exact = exact.distance(a, b);
        let d_fast = fast.distance(a, b);
        assert!((d_exact - d_fast).abs() / d_exact < 0.07);
    }

    #[test]
    fn test_store_contacts_kill_both() {
        let n = narrow();
        let mut store = AgentStore::from_agents(vec![
            Agent::laser(Vec2::new(5.0, 5.0)),
            Agent::asteroid(Vec2::new(5.05, 5.0)),
            Agent::laser(Vec2::new(5.1, 5.0)),
        ]);
        let mut contacts = StoreContacts::new(&mut store, &n);
        assert!(!contacts.try_collide(0, 2), "lasers never interact");
        assert!(contacts.try_collide(0, 1));
        let events = contacts.into_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].awards_score());
        assert_eq!(store.get(0).status, Status::DeadLaser);
        assert_eq!(store.get(1).status, Status::DeadAsteroid);
        assert_eq!(store.get(2).status, Status::Laser);
    }

    #[test]
    fn test_overlay_commit() {
        let n = narrow();
        let mut store = AgentStore::from_agents(vec![
            Agent::player(Vec2::new(1.0, 1.0)),
            Agent::asteroid(Vec2::new(1.1, 1.0)),
        ]);
        let overlay = StatusOverlay::capture(&store);
        let mut contacts = SharedContacts::new(&store, &overlay, &n);
        assert!(contacts.try_collide(1, 0));
        assert_eq!(contacts.events[0].resolution, Resolution::PlayerHit);
        assert!(!contacts.is_alive(0));
        overlay.commit(&mut store);
        assert_eq!(store.get(0).status, Status::DeadPlayer);
        assert_eq!(store.get(1).status, Status::DeadAsteroid);
    }

    fn kind() -> impl Strategy<Value = Kind> {
        prop::sample::select(vec![Kind::Player, Kind::Laser, Kind::Asteroid])
    }

    proptest! {
        #[test]
        fn prop_collision_is_symmetric(
            (ax, ay) in (0.0f32..2.0, 0.0f32..2.0),
            (bx, by) in (0.0f32..2.0, 0.0f32..2.0),
            ka in kind(),
            kb in kind(),
        ) {
            let n = narrow();
            let (pa, pb) = (Vec2::new(ax, ay), Vec2::new(bx, by));
            let touching = pa.distance(pb) < n.radii.of(ka) + n.radii.of(kb);
            prop_assert_eq!(n.overlaps(pa, ka, pb, kb), touching);
            prop_assert_eq!(n.overlaps(pb, kb, pa, ka), touching);

            let store = AgentStore::from_agents(vec![
                Agent::new(Status::alive(ka), pa),
                Agent::new(Status::alive(kb), pb),
            ]);
            let (mut forward, mut backward) = (store.clone(), store);
            let hit_ab = StoreContacts::new(&mut forward, &n).try_collide(0, 1);
            let hit_ba = StoreContacts::new(&mut backward, &n).try_collide(1, 0);
            prop_assert_eq!(hit_ab, hit_ba);
            prop_assert_eq!(hit_ab, touching && resolve(ka, kb).is_some());
            prop_assert_eq!(forward.as_slice(), backward.as_slice());
        }
    }
}
