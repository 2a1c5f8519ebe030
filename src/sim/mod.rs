//! Deterministic simulation module
//!
//! The collision core: agents, the spatial index, collision resolution and
//! respawns. This module must stay pure and deterministic:
//! - Caller-supplied timestep only
//! - Seeded RNG only
//! - Stable iteration order (by handle)
//! - No rendering or platform dependencies

pub mod agent;
pub mod collision;
pub mod grid;
pub mod index;
pub mod quadtree;
pub mod rect;
pub mod respawn;
pub mod scan;
pub mod state;
pub mod tick;

pub use agent::{Agent, AgentStore, Kind, MotionTables, Status};
pub use collision::{CollisionEvent, Contacts, NarrowPhase, Radii, Resolution, resolve};
pub use grid::GridIndex;
pub use index::SpatialIndex;
pub use quadtree::{Node, NodeId, QuadTree, QuadTreeConfig, ROOT};
pub use rect::{Quadrant, Rect};
pub use respawn::{RespawnScheduler, SpawnPlacement, expire_lasers};
pub use state::{FrameReport, SimState, SimStats};
pub use tick::{TickInput, tick};
