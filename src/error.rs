//! Error types
//!
//! `SimError` covers everything a caller can hit at runtime: bad
//! configuration and index capacity exhaustion. `InvariantViolation` is only
//! produced by the opt-in consistency checks.

use thiserror::Error;

/// Errors surfaced by configuration loading and index maintenance
#[derive(Debug, Error)]
pub enum SimError {
    /// The quadtree node arena is full; raise `node_capacity`
    #[error("quadtree node arena is full (capacity {capacity})")]
    NodeArenaFull { capacity: usize },

    /// An agent left every node of the quadtree, including the root
    #[error("agent {handle} at ({x:.3}, {y:.3}) is outside the world bounds")]
    OutOfBounds { handle: u32, x: f32, y: f32 },

    /// Settings failed validation
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Config(#[from] serde_json::Error),
}

/// Consistency violations reported by the index self-checks
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("dead agent {handle} still indexed at depth {depth}")]
    DeadAgentIndexed { handle: u32, depth: u32 },

    #[error("node at depth {depth} holds {count} movable agents despite having children")]
    IntermediateMovables { depth: u32, count: usize },

    #[error("store has {store} live agents but the index holds {indexed}")]
    LiveCountMismatch { store: usize, indexed: usize },

    #[error("bucket at depth {depth} is not sorted by x around agent {handle}")]
    Unsorted { handle: u32, depth: u32 },

    #[error("agent {handle} at ({x:.3}, {y:.3}) lies outside its bucket at depth {depth}")]
    OutsideBucket { handle: u32, x: f32, y: f32, depth: u32 },

    #[error("agent {handle} is indexed more than once")]
    Duplicate { handle: u32 },
}
