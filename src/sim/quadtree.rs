//! Loose quadtree on a node arena
//!
//! Every node owns two handle tables:
//! - `permanent`: agents within `margin` of one of the node's division lines.
//!   These may touch agents in more than one child, so they are checked at
//!   this level.
//! - `movable`: agents of a leaf that sit clear of both division lines.
//!   Intermediate nodes never keep movables.
//!
//! Agents are kept at least `margin` away from every interior edge of the
//! node holding them (each such edge is an ancestor's division line), so
//! agents in two different children of a node can never touch.
//!
//! The tree is built once and then repaired incrementally each frame with
//! [`QuadTree::update`], so only agents that actually crossed a boundary move
//! between tables. Nodes are never freed; the arena only grows until
//! `node_capacity`.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec2;

use super::agent::AgentStore;
use super::rect::{Quadrant, Rect};
use crate::error::{InvariantViolation, SimError};
use crate::settings::Settings;

/// Index into the node arena
pub type NodeId = usize;

/// The root is always the first node
pub const ROOT: NodeId = 0;

/// Tuning shared by every node
#[derive(Debug, Clone, Copy)]
pub struct QuadTreeConfig {
    /// Movables a leaf holds before it subdivides
    pub max_per_bucket: usize,
    pub initial_permanent_capacity: usize,
    pub node_capacity: usize,
    /// Distance from a division line below which an agent is permanent
    pub margin: f32,
    /// Pairs further apart than this (on x, or from a node's bounds) are skipped
    pub prune: f32,
}

impl QuadTreeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let margin = settings.max_radius();
        Self {
            max_per_bucket: settings.max_per_bucket,
            initial_permanent_capacity: settings.initial_permanent_capacity,
            node_capacity: settings.node_capacity,
            margin,
            prune: 2.0 * margin,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub bounds: Rect,
    /// `bounds` pulled in by `margin` on every edge that is not a world edge.
    /// Agents outside it belong to an ancestor.
    pub core: Rect,
    /// Centre of `bounds`; the two division lines cross here
    pub division: Vec2,
    pub parent: Option<NodeId>,
    /// TL, TR, BL, BR
    pub children: Option<[NodeId; 4]>,
    pub depth: u32,
    /// Top-level subtree this node belongs to (`None` for the root)
    pub quadrant: Option<Quadrant>,
    pub permanent: Vec<u32>,
    pub movable: Vec<u32>,
}

impl Node {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Within `margin` of either division line
    #[inline]
    fn near_division(&self, pos: Vec2, margin: f32) -> bool {
        (pos.x - self.division.x).abs() < margin || (pos.y - self.division.y).abs() < margin
    }

    /// Child slot the position falls in (ties go right and up)
    #[inline]
    fn slot_for(&self, pos: Vec2) -> Quadrant {
        match (pos.x >= self.division.x, pos.y >= self.division.y) {
            (false, true) => Quadrant::TopLeft,
            (true, true) => Quadrant::TopRight,
            (false, false) => Quadrant::BottomLeft,
            (true, false) => Quadrant::BottomRight,
        }
    }

    /// Drop dead handles from both tables of this node only
    pub fn remove_dead(&mut self, store: &AgentStore) {
        retain_live(&mut self.permanent, store);
        retain_live(&mut self.movable, store);
    }

    /// Sort both tables of this node by ascending x
    pub fn sort(&mut self, store: &AgentStore) {
        sort_by_x(&mut self.permanent, store);
        sort_by_x(&mut self.movable, store);
    }

    pub fn len(&self) -> usize {
        self.permanent.len() + self.movable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permanent.is_empty() && self.movable.is_empty()
    }
}

fn retain_live(table: &mut Vec<u32>, store: &AgentStore) {
    let mut i = 0;
    while i < table.len() {
        if store.get(table[i]).is_alive() {
            i += 1;
        } else {
            table.swap_remove(i);
        }
    }
}

/// Shrink `bounds` by `margin` on each edge not shared with `world`
fn inset_interior(bounds: Rect, world: Rect, margin: f32) -> Rect {
    let inset = |edge: f32, world_edge: f32, delta: f32| {
        if edge == world_edge { edge } else { edge + delta }
    };
    Rect::new(
        inset(bounds.min_x, world.min_x, margin),
        inset(bounds.max_x, world.max_x, -margin),
        inset(bounds.min_y, world.min_y, margin),
        inset(bounds.max_y, world.max_y, -margin),
    )
}

fn sort_by_x(table: &mut [u32], store: &AgentStore) {
    table.sort_unstable_by(|&a, &b| store.position(a).x.total_cmp(&store.position(b).x));
}

#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<Node>,
    config: QuadTreeConfig,
}

impl QuadTree {
    /// Empty tree over `bounds` with the root already split into quadrants
    pub fn new(bounds: Rect, config: QuadTreeConfig) -> Result<Self, SimError> {
        let mut tree = Self {
            nodes: Vec::with_capacity(config.node_capacity.min(1024)),
            config,
        };
        tree.create_node(bounds, None)?;
        tree.subdivide(ROOT)?;
        Ok(tree)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SimError> {
        Self::new(
            Rect::square(settings.world_dimension),
            QuadTreeConfig::from_settings(settings),
        )
    }

    /// Insert every live agent of `store`
    pub fn build(&mut self, store: &AgentStore) -> Result<(), SimError> {
        for (handle, agent) in store.iter() {
            if agent.is_alive() {
                self.add(ROOT, handle, store)?;
            }
        }
        log::debug!(
            "Quadtree built: {} live agents, {} nodes",
            self.indexed_count(),
            self.nodes.len()
        );
        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &QuadTreeConfig {
        &self.config
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Handles currently held, dead ones included
    pub fn indexed_count(&self) -> usize {
        self.nodes.iter().map(Node::len).sum()
    }

    /// Allocate a node in the arena
    pub fn create_node(&mut self, bounds: Rect, parent: Option<NodeId>) -> Result<NodeId, SimError> {
        if self.nodes.len() >= self.config.node_capacity {
            log::warn!(
                "Quadtree node arena exhausted at {} nodes",
                self.config.node_capacity
            );
            return Err(SimError::NodeArenaFull {
                capacity: self.config.node_capacity,
            });
        }
        let (depth, quadrant) = match parent {
            Some(p) => (self.nodes[p].depth + 1, self.nodes[p].quadrant),
            None => (0, None),
        };
        let core = match self.nodes.first() {
            Some(root) => inset_interior(bounds, root.bounds, self.config.margin),
            None => bounds,
        };
        let id = self.nodes.len();
        self.nodes.push(Node {
            bounds,
            core,
            division: bounds.center(),
            parent,
            children: None,
            depth,
            quadrant,
            permanent: Vec::with_capacity(self.config.initial_permanent_capacity),
            movable: Vec::new(),
        });
        Ok(id)
    }

    /// Split a leaf into four children. Movables stay where they are; callers
    /// migrate them.
    pub fn subdivide(&mut self, id: NodeId) -> Result<(), SimError> {
        if self.nodes[id].children.is_some() {
            return Ok(());
        }
        if self.nodes.len() + 4 > self.config.node_capacity {
            log::warn!(
                "Quadtree node arena exhausted at {} nodes",
                self.config.node_capacity
            );
            return Err(SimError::NodeArenaFull {
                capacity: self.config.node_capacity,
            });
        }
        let bounds = self.nodes[id].bounds;
        let mut children = [ROOT; 4];
        for q in Quadrant::ALL {
            let child = self.create_node(bounds.quadrant(q), Some(id))?;
            if id == ROOT {
                self.nodes[child].quadrant = Some(q);
            }
            children[q.index()] = child;
        }
        self.nodes[id].children = Some(children);
        Ok(())
    }

    /// Insert `handle` at or below node `id`
    pub fn add(&mut self, id: NodeId, handle: u32, store: &AgentStore) -> Result<(), SimError> {
        let pos = store.position(handle);
        if self.nodes[id].near_division(pos, self.config.margin) {
            self.nodes[id].permanent.push(handle);
            return Ok(());
        }
        self.place_movable(id, handle, store)
    }

    /// Route to the child containing the agent
    fn add_to_child(&mut self, id: NodeId, handle: u32, store: &AgentStore) -> Result<(), SimError> {
        let node = &self.nodes[id];
        let Some(children) = node.children else {
            return self.place_movable(id, handle, store);
        };
        let child = children[node.slot_for(store.position(handle)).index()];
        self.add(child, handle, store)
    }

    /// Agent is clear of this node's division lines: push it down, keep it as
    /// a movable, or split the leaf
    fn place_movable(&mut self, id: NodeId, handle: u32, store: &AgentStore) -> Result<(), SimError> {
        if self.nodes[id].children.is_some() {
            return self.add_to_child(id, handle, store);
        }
        if self.nodes[id].movable.len() < self.config.max_per_bucket {
            self.nodes[id].movable.push(handle);
            return Ok(());
        }

        self.subdivide(id)?;
        self.add_to_child(id, handle, store)?;
        let movable = std::mem::take(&mut self.nodes[id].movable);
        for &moved in movable.iter().rev() {
            self.add_to_child(id, moved, store)?;
        }
        Ok(())
    }

    /// Re-insert from the nearest ancestor (starting at `from`) whose core
    /// still contains the agent
    fn bubble_up(
        &mut self,
        from: Option<NodeId>,
        handle: u32,
        store: &AgentStore,
    ) -> Result<(), SimError> {
        let pos = store.position(handle);
        let mut current = from;
        while let Some(id) = current {
            if self.nodes[id].core.contains(pos) {
                return self.add(id, handle, store);
            }
            current = self.nodes[id].parent;
        }
        log::warn!(
            "Agent {handle} at ({:.3}, {:.3}) left the world bounds",
            pos.x,
            pos.y
        );
        Err(SimError::OutOfBounds {
            handle,
            x: pos.x,
            y: pos.y,
        })
    }

    /// Repair the whole tree after agents moved
    pub fn update(&mut self, store: &AgentStore) -> Result<(), SimError> {
        self.update_node(ROOT, store)
    }

    /// Repair the subtree at `id`: agents that left the node bubble up, and
    /// agents whose table no longer matches their position are re-placed.
    /// Dead agents are skipped and left for [`QuadTree::remove_dead`].
    pub fn update_node(&mut self, id: NodeId, store: &AgentStore) -> Result<(), SimError> {
        let margin = self.config.margin;

        let mut i = 0;
        while i < self.nodes[id].permanent.len() {
            let handle = self.nodes[id].permanent[i];
            let agent = store.get(handle);
            if !agent.is_alive() {
                i += 1;
                continue;
            }
            let node = &self.nodes[id];
            if !node.core.contains(agent.pos) {
                let parent = node.parent;
                self.nodes[id].permanent.swap_remove(i);
                self.bubble_up(parent, handle, store)?;
            } else if !node.near_division(agent.pos, margin) {
                self.nodes[id].permanent.swap_remove(i);
                self.place_movable(id, handle, store)?;
            } else {
                i += 1;
            }
        }

        let mut i = 0;
        while i < self.nodes[id].movable.len() {
            let handle = self.nodes[id].movable[i];
            let agent = store.get(handle);
            if !agent.is_alive() {
                i += 1;
                continue;
            }
            let node = &self.nodes[id];
            if !node.core.contains(agent.pos) {
                let parent = node.parent;
                self.nodes[id].movable.swap_remove(i);
                self.bubble_up(parent, handle, store)?;
            } else if node.near_division(agent.pos, margin) {
                self.nodes[id].movable.swap_remove(i);
                self.nodes[id].permanent.push(handle);
            } else {
                i += 1;
            }
        }

        if let Some(children) = self.nodes[id].children {
            for child in children {
                self.update_node(child, store)?;
            }
        }
        Ok(())
    }

    /// Drop dead handles everywhere
    pub fn remove_dead(&mut self, store: &AgentStore) {
        self.remove_dead_from(ROOT, store);
    }

    /// Drop dead handles in the subtree at `id`
    pub fn remove_dead_from(&mut self, id: NodeId, store: &AgentStore) {
        self.nodes[id].remove_dead(store);
        if let Some(children) = self.nodes[id].children {
            for child in children {
                self.remove_dead_from(child, store);
            }
        }
    }

    /// Sort every table by ascending x
    pub fn sort(&mut self, store: &AgentStore) {
        self.sort_from(ROOT, store);
    }

    pub fn sort_from(&mut self, id: NodeId, store: &AgentStore) {
        self.nodes[id].sort(store);
        if let Some(children) = self.nodes[id].children {
            for child in children {
                self.sort_from(child, store);
            }
        }
    }

    /// Run `op` over every node, one rayon task per top-level subtree.
    ///
    /// The root is handled on the calling thread once the first subtree task
    /// has finished; the call returns after all four are done.
    pub fn for_each_node_parallel<F>(&mut self, op: F)
    where
        F: Fn(&mut Node) + Sync,
    {
        let Some((root, rest)) = self.nodes.split_first_mut() else {
            return;
        };
        let mut groups: [Vec<&mut Node>; 4] = Default::default();
        for node in rest {
            if let Some(q) = node.quadrant {
                groups[q.index()].push(node);
            }
        }

        let finished = AtomicUsize::new(0);
        let op = &op;
        let finished_ref = &finished;
        rayon::scope(|s| {
            for group in groups {
                s.spawn(move |_| {
                    for node in group {
                        op(node);
                    }
                    finished_ref.fetch_add(1, Ordering::Release);
                });
            }
            // wait for any subtree, helping with queued work instead of blocking
            while finished.load(Ordering::Acquire) == 0 {
                if !matches!(rayon::yield_now(), Some(rayon::Yield::Executed)) {
                    std::thread::yield_now();
                }
            }
            op(root);
        });
    }

    /// [`QuadTree::remove_dead`] with the four subtrees in parallel
    pub fn remove_dead_parallel(&mut self, store: &AgentStore) {
        self.for_each_node_parallel(|node| node.remove_dead(store));
    }

    /// [`QuadTree::sort`] with the four subtrees in parallel
    pub fn sort_parallel(&mut self, store: &AgentStore) {
        self.for_each_node_parallel(|node| node.sort(store));
    }

    /// Handles of every table whose region covers `pos`: the permanent table
    /// of each node on the root-to-leaf path plus the leaf's movables
    pub fn query_point(&self, pos: Vec2) -> Vec<u32> {
        let mut found = Vec::new();
        if !self.nodes[ROOT].bounds.contains(pos) {
            return found;
        }
        let mut id = ROOT;
        loop {
            let node = &self.nodes[id];
            found.extend_from_slice(&node.permanent);
            match node.children {
                Some(children) => id = children[node.slot_for(pos).index()],
                None => {
                    found.extend_from_slice(&node.movable);
                    return found;
                }
            }
        }
    }

    /// Node holding `handle`, and whether it sits in the permanent table
    pub fn locate(&self, handle: u32) -> Option<(NodeId, bool)> {
        self.nodes.iter().enumerate().find_map(|(id, node)| {
            if node.permanent.contains(&handle) {
                Some((id, true))
            } else if node.movable.contains(&handle) {
                Some((id, false))
            } else {
                None
            }
        })
    }

    // === Consistency checks ===

    pub fn check_no_dead(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        for node in &self.nodes {
            for &handle in node.permanent.iter().chain(&node.movable) {
                if !store.get(handle).is_alive() {
                    return Err(InvariantViolation::DeadAgentIndexed {
                        handle,
                        depth: node.depth,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn check_no_intermediate_movables(&self) -> Result<(), InvariantViolation> {
        for node in &self.nodes {
            if !node.is_leaf() && !node.movable.is_empty() {
                return Err(InvariantViolation::IntermediateMovables {
                    depth: node.depth,
                    count: node.movable.len(),
                });
            }
        }
        Ok(())
    }

    /// Live handles held == live agents in the store
    pub fn check_live_count(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        let indexed = self
            .nodes
            .iter()
            .flat_map(|n| n.permanent.iter().chain(&n.movable))
            .filter(|&&h| store.get(h).is_alive())
            .count();
        let live = store.live_count();
        if indexed != live {
            return Err(InvariantViolation::LiveCountMismatch {
                store: live,
                indexed,
            });
        }
        Ok(())
    }

    pub fn check_sorted(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        for node in &self.nodes {
            for table in [&node.permanent, &node.movable] {
                for pair in table.windows(2) {
                    if store.position(pair[0]).x > store.position(pair[1]).x {
                        return Err(InvariantViolation::Unsorted {
                            handle: pair[1],
                            depth: node.depth,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Every live handle lies inside its node's core, and permanents
    /// (movables) are near (clear of) the division lines
    pub fn check_containment(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        let margin = self.config.margin;
        for node in &self.nodes {
            let tables = [(&node.permanent, true), (&node.movable, false)];
            for (table, permanent) in tables {
                for &handle in table {
                    let agent = store.get(handle);
                    if !agent.is_alive() {
                        continue;
                    }
                    let pos = agent.pos;
                    if !node.core.contains(pos) || node.near_division(pos, margin) != permanent {
                        return Err(InvariantViolation::OutsideBucket {
                            handle,
                            x: pos.x,
                            y: pos.y,
                            depth: node.depth,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn check_unique(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        let mut seen = vec![false; store.count()];
        for node in &self.nodes {
            for &handle in node.permanent.iter().chain(&node.movable) {
                let slot = &mut seen[handle as usize];
                if *slot {
                    return Err(InvariantViolation::Duplicate { handle });
                }
                *slot = true;
            }
        }
        Ok(())
    }

    /// All checks that hold between frames (dead handles are allowed until
    /// the next [`QuadTree::remove_dead`])
    pub fn verify(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        self.check_no_intermediate_movables()?;
        self.check_live_count(store)?;
        self.check_containment(store)?;
        self.check_unique(store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::agent::{Agent, Status};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn config(max_per_bucket: usize, node_capacity: usize) -> QuadTreeConfig {
        QuadTreeConfig {
            max_per_bucket,
            initial_permanent_capacity: 4,
            node_capacity,
            margin: 0.2,
            prune: 0.4,
        }
    }

    fn tree_over(dim: f32, store: &AgentStore, max_per_bucket: usize) -> QuadTree {
        let mut tree = QuadTree::new(Rect::square(dim), config(max_per_bucket, 4096)).unwrap();
        tree.build(store).unwrap();
        tree
    }

    #[test]
    fn test_root_is_subdivided() {
        let tree = QuadTree::new(Rect::square(100.0), config(4, 64)).unwrap();
        assert_eq!(tree.node_count(), 5);
        let children = tree.node(ROOT).children.unwrap();
        for (q, &child) in Quadrant::ALL.iter().zip(children.iter()) {
            assert_eq!(tree.node(child).quadrant, Some(*q));
            assert_eq!(tree.node(child).depth, 1);
            assert_eq!(tree.node(child).parent, Some(ROOT));
        }
    }

    #[test]
    fn test_division_line_agent_is_permanent() {
        let store = AgentStore::from_agents(vec![
            Agent::asteroid(Vec2::new(50.0, 20.0)),
            Agent::asteroid(Vec2::new(20.0, 20.0)),
        ]);
        let tree = tree_over(100.0, &store, 4);
        assert_eq!(tree.locate(0), Some((ROOT, true)));
        let (node, permanent) = tree.locate(1).unwrap();
        assert!(!permanent);
        assert_eq!(tree.node(node).quadrant, Some(Quadrant::BottomLeft));
        tree.verify(&store).unwrap();
    }

    #[test]
    fn test_leaf_split_migrates_movables() {
        let agents = (0..5)
            .map(|i| Agent::asteroid(Vec2::new(5.0 + i as f32 * 4.0, 5.0 + i as f32 * 3.0)))
            .collect();
        let store = AgentStore::from_agents(agents);
        let tree = tree_over(100.0, &store, 2);
        assert!(tree.node_count() > 5);
        tree.check_no_intermediate_movables().unwrap();
        tree.verify(&store).unwrap();
        for node in tree.nodes() {
            assert!(node.movable.len() <= 2);
        }
    }

    #[test]
    fn test_arena_exhaustion_is_an_error() {
        // all agents in one quadrant and clear of each other's lines
        let agents = (0..40)
            .map(|i| Agent::asteroid(Vec2::new(1.0 + (i % 7) as f32 * 6.3, 1.0 + (i / 7) as f32 * 6.1)))
            .collect();
        let store = AgentStore::from_agents(agents);
        let mut tree = QuadTree::new(Rect::square(100.0), config(1, 9)).unwrap();
        let err = tree.build(&store).unwrap_err();
        assert!(matches!(err, SimError::NodeArenaFull { capacity: 9 }));
    }

    #[test]
    fn test_update_moves_agent_across_tree() {
        let mut store = AgentStore::from_agents(vec![
            Agent::asteroid(Vec2::new(10.0, 10.0)),
            Agent::asteroid(Vec2::new(70.0, 80.0)),
        ]);
        let mut tree = tree_over(100.0, &store, 4);

        store.get_mut(0).pos = Vec2::new(90.0, 90.0);
        store.get_mut(1).pos = Vec2::new(70.0, 50.05);
        tree.update(&store).unwrap();
        tree.verify(&store).unwrap();

        let (node, _) = tree.locate(0).unwrap();
        assert_eq!(tree.node(node).quadrant, Some(Quadrant::TopRight));
        assert_eq!(tree.locate(1), Some((ROOT, true)));
    }

    #[test]
    fn test_permanent_stays_permanent_on_line() {
        let store = AgentStore::from_agents(vec![Agent::asteroid(Vec2::new(100.0, 37.0))]);
        let mut tree = tree_over(200.0, &store, 4);
        for _ in 0..10 {
            tree.update(&store).unwrap();
            assert_eq!(tree.locate(0), Some((ROOT, true)));
        }
    }

    #[test]
    fn test_update_rejects_agent_outside_world() {
        let mut store = AgentStore::from_agents(vec![Agent::asteroid(Vec2::new(10.0, 10.0))]);
        let mut tree = tree_over(100.0, &store, 4);
        store.get_mut(0).pos = Vec2::new(-5.0, 10.0);
        let err = tree.update(&store).unwrap_err();
        assert!(matches!(err, SimError::OutOfBounds { handle: 0, .. }));
    }

    #[test]
    fn test_remove_dead_and_sort() {
        let mut store = AgentStore::from_agents(vec![
            Agent::asteroid(Vec2::new(30.0, 10.0)),
            Agent::asteroid(Vec2::new(10.0, 12.0)),
            Agent::asteroid(Vec2::new(20.0, 14.0)),
        ]);
        let mut tree = tree_over(100.0, &store, 8);
        store.get_mut(2).status = Status::DeadAsteroid;

        assert!(tree.check_no_dead(&store).is_err());
        tree.remove_dead(&store);
        tree.check_no_dead(&store).unwrap();
        tree.sort(&store);
        tree.check_sorted(&store).unwrap();
        assert_eq!(tree.indexed_count(), 2);
    }

    #[test]
    fn test_parallel_maintenance_matches_sequential() {
        let settings = Settings {
            world_dimension: 60.0,
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(3);
        let mut store = AgentStore::random_layout(&settings, 3000, &mut rng);
        for (handle, agent) in store.iter_mut() {
            if handle % 3 == 0 {
                agent.status = agent.status.killed();
            }
        }
        let mut seq = QuadTree::from_settings(&settings).unwrap();
        seq.build(&store).unwrap();
        let mut par = seq.clone();

        seq.remove_dead(&store);
        seq.sort(&store);
        par.remove_dead_parallel(&store);
        par.sort_parallel(&store);

        par.check_no_dead(&store).unwrap();
        par.check_sorted(&store).unwrap();
        par.verify(&store).unwrap();
        assert_eq!(seq.indexed_count(), par.indexed_count());
        for (a, b) in seq.nodes().iter().zip(par.nodes()) {
            let mut pa = a.permanent.clone();
            let mut pb = b.permanent.clone();
            pa.sort_unstable();
            pb.sort_unstable();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_query_point_finds_agent() {
        let store = AgentStore::from_agents(vec![
            Agent::asteroid(Vec2::new(12.0, 88.0)),
            Agent::asteroid(Vec2::new(50.0, 50.0)),
        ]);
        let tree = tree_over(100.0, &store, 4);
        assert!(tree.query_point(Vec2::new(12.0, 88.0)).contains(&0));
        assert!(tree.query_point(Vec2::new(50.0, 50.0)).contains(&1));
        assert!(tree.query_point(Vec2::new(150.0, 50.0)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_inserted_agents_are_queryable(
            points in prop::collection::vec((0.0f32..100.0, 0.0f32..100.0), 1..300),
            bucket in 1usize..16,
        ) {
            let agents = points
                .iter()
                .map(|&(x, y)| Agent::asteroid(Vec2::new(x, y)))
                .collect();
            let store = AgentStore::from_agents(agents);
            let tree = tree_over(100.0, &store, bucket);
            prop_assert!(tree.verify(&store).is_ok());
            for (handle, agent) in store.iter() {
                prop_assert!(tree.query_point(agent.pos).contains(&handle));
            }
        }

        #[test]
        fn prop_update_preserves_invariants(
            points in prop::collection::vec((0.0f32..100.0, 0.0f32..100.0), 1..200),
            moves in prop::collection::vec((0.0f32..100.0, 0.0f32..100.0), 1..200),
        ) {
            let agents = points
                .iter()
                .map(|&(x, y)| Agent::asteroid(Vec2::new(x, y)))
                .collect();
            let mut store = AgentStore::from_agents(agents);
            let mut tree = tree_over(100.0, &store, 3);
            for (i, &(x, y)) in moves.iter().enumerate() {
                let handle = (i % store.count()) as u32;
                store.get_mut(handle).pos = Vec2::new(x, y);
            }
            tree.update(&store).unwrap();
            prop_assert!(tree.verify(&store).is_ok());
            tree.sort(&store);
            prop_assert!(tree.check_sorted(&store).is_ok());
        }
    }
}
