//! Broad-phase strategy selected at startup

use glam::Vec2;

use super::agent::AgentStore;
use super::collision::{CollisionEvent, NarrowPhase};
use super::grid::GridIndex;
use super::quadtree::QuadTree;
use crate::error::{InvariantViolation, SimError};
use crate::settings::{IndexKind, Settings};

/// Quadtree or grid behind one interface. Both hold handles only; the
/// store stays the single source of agent state.
#[derive(Debug, Clone)]
pub enum SpatialIndex {
    Quadtree(QuadTree),
    Grid(GridIndex),
}

impl SpatialIndex {
    pub fn from_settings(settings: &Settings) -> Result<Self, SimError> {
        Ok(match settings.index {
            IndexKind::Quadtree => SpatialIndex::Quadtree(QuadTree::from_settings(settings)?),
            IndexKind::Grid => SpatialIndex::Grid(GridIndex::from_settings(settings)),
        })
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            SpatialIndex::Quadtree(_) => IndexKind::Quadtree,
            SpatialIndex::Grid(_) => IndexKind::Grid,
        }
    }

    /// Index every live agent
    pub fn build(&mut self, store: &AgentStore) -> Result<(), SimError> {
        match self {
            SpatialIndex::Quadtree(tree) => tree.build(store),
            SpatialIndex::Grid(grid) => {
                grid.rebuild(store);
                Ok(())
            }
        }
    }

    /// Bring the index in line with the store after agents moved or died:
    /// repair and drop dead handles (quadtree) or rebuild (grid)
    pub fn maintain(&mut self, store: &AgentStore, parallel: bool) -> Result<(), SimError> {
        match self {
            SpatialIndex::Quadtree(tree) => {
                tree.update(store)?;
                if parallel {
                    tree.remove_dead_parallel(store);
                } else {
                    tree.remove_dead(store);
                }
                Ok(())
            }
            SpatialIndex::Grid(grid) => {
                grid.rebuild(store);
                Ok(())
            }
        }
    }

    /// Index an agent that just came back to life. Its handle must not still
    /// be held from an earlier life; see [`SpatialIndex::purge_dead`].
    pub fn insert(&mut self, handle: u32, store: &AgentStore) -> Result<(), SimError> {
        match self {
            SpatialIndex::Quadtree(tree) => tree.add(super::quadtree::ROOT, handle, store),
            SpatialIndex::Grid(grid) => {
                grid.insert(handle, store);
                Ok(())
            }
        }
    }

    /// Drop dead handles outside the regular per-frame maintenance
    pub fn purge_dead(&mut self, store: &AgentStore) {
        match self {
            SpatialIndex::Quadtree(tree) => tree.remove_dead(store),
            SpatialIndex::Grid(grid) => grid.remove_dead(store),
        }
    }

    /// Find and resolve every collision. Colliding agents are dead in the
    /// store afterwards; the returned events say what happened.
    pub fn detect(
        &mut self,
        store: &mut AgentStore,
        narrow: &NarrowPhase,
        parallel: bool,
    ) -> Vec<CollisionEvent> {
        match self {
            SpatialIndex::Quadtree(tree) if parallel => {
                tree.sort_parallel(store);
                tree.detect_collisions_parallel(store, narrow)
            }
            SpatialIndex::Quadtree(tree) => {
                tree.sort(store);
                tree.detect_collisions(store, narrow)
            }
            SpatialIndex::Grid(grid) => grid.detect_collisions(store, narrow),
        }
    }

    /// Consistency checks that hold between frames
    pub fn verify(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        match self {
            SpatialIndex::Quadtree(tree) => tree.verify(store),
            SpatialIndex::Grid(grid) => grid.verify(store),
        }
    }

    /// Handles in every bucket covering `pos`
    pub fn query_point(&self, pos: Vec2) -> Vec<u32> {
        match self {
            SpatialIndex::Quadtree(tree) => tree.query_point(pos),
            SpatialIndex::Grid(grid) => grid.query_point(pos).to_vec(),
        }
    }

    /// Handles held, dead ones included
    pub fn len(&self) -> usize {
        match self {
            SpatialIndex::Quadtree(tree) => tree.indexed_count(),
            SpatialIndex::Grid(grid) => grid.indexed_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_quadtree(&self) -> Option<&QuadTree> {
        match self {
            SpatialIndex::Quadtree(tree) => Some(tree),
            SpatialIndex::Grid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DistanceMode;
    use crate::sim::agent::{Agent, Kind};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn settings(index: IndexKind) -> Settings {
        Settings {
            world_dimension: 40.0,
            index,
            ..Default::default()
        }
    }

    /// Same store, same collisions, whatever the broad phase
    #[test]
    fn test_grid_and_quadtree_agree_on_isolated_pairs() {
        let mut agents = vec![Agent::player(Vec2::new(0.5, 0.5))];
        for i in 0..12 {
            for j in 0..12 {
                let base = Vec2::new(1.6 + i as f32 * 3.1, 1.3 + j as f32 * 3.2);
                agents.push(Agent::asteroid(base));
                match (i + j) % 4 {
                    0 => agents.push(Agent::asteroid(base + Vec2::new(0.25, 0.2))),
                    1 => agents.push(Agent::laser(base + Vec2::new(-0.1, 0.2))),
                    _ => {}
                }
            }
        }
        let base = AgentStore::from_agents(agents);

        for distance in [DistanceMode::Exact, DistanceMode::Fast] {
            let narrow = NarrowPhase::from_settings(&Settings {
                distance,
                ..settings(IndexKind::Grid)
            });
            let mut outcomes = Vec::new();
            for kind in [IndexKind::Grid, IndexKind::Quadtree] {
                let mut store = base.clone();
                let mut index = SpatialIndex::from_settings(&settings(kind)).unwrap();
                index.build(&store).unwrap();
                let mut pairs: Vec<_> = index
                    .detect(&mut store, &narrow, false)
                    .iter()
                    .map(|e| (e.a.min(e.b), e.a.max(e.b)))
                    .collect();
                pairs.sort_unstable();
                outcomes.push((pairs, store));
            }
            assert_eq!(outcomes[0].0.len(), 72, "{distance:?}");
            assert_eq!(outcomes[0].0, outcomes[1].0);
            assert_eq!(outcomes[0].1.as_slice(), outcomes[1].1.as_slice());
        }
    }

    /// Diagonal pairs right at the reach limit, straddling the root lines
    #[test]
    fn test_fast_distance_agrees_across_indexes_at_the_limit() {
        let narrow = NarrowPhase::from_settings(&Settings {
            distance: DistanceMode::Fast,
            ..settings(IndexKind::Grid)
        });
        let mut agents = Vec::new();
        for (i, gap) in [0.26f32, 0.27, 0.275, 0.28, 0.3].iter().enumerate() {
            let center = Vec2::new(20.0, 4.0 + i as f32 * 6.0);
            agents.push(Agent::asteroid(center - Vec2::splat(gap / 2.0)));
            agents.push(Agent::asteroid(center + Vec2::splat(gap / 2.0)));
        }
        let base = AgentStore::from_agents(agents);

        let mut outcomes = Vec::new();
        for kind in [IndexKind::Grid, IndexKind::Quadtree] {
            let mut store = base.clone();
            let mut index = SpatialIndex::from_settings(&settings(kind)).unwrap();
            index.build(&store).unwrap();
            index.detect(&mut store, &narrow, false);
            outcomes.push(store);
        }
        assert_eq!(outcomes[0].as_slice(), outcomes[1].as_slice());
    }

    #[test]
    fn test_no_touching_pair_survives_either_index() {
        let mut rng = Pcg32::seed_from_u64(11);
        let base = AgentStore::random_layout(&settings(IndexKind::Grid), 2500, &mut rng);
        let narrow = NarrowPhase::from_settings(&settings(IndexKind::Grid));

        for kind in [IndexKind::Grid, IndexKind::Quadtree] {
            let mut store = base.clone();
            let mut index = SpatialIndex::from_settings(&settings(kind)).unwrap();
            index.build(&store).unwrap();
            index.detect(&mut store, &narrow, false);

            let live: Vec<_> = store.iter().filter(|(_, a)| a.is_alive()).collect();
            for (i, (_, a)) in live.iter().enumerate() {
                for (_, b) in &live[i + 1..] {
                    let interacts = a.kind() == Kind::Asteroid || b.kind() == Kind::Asteroid;
                    assert!(!interacts || !narrow.overlaps(a.pos, a.kind(), b.pos, b.kind()));
                }
            }
        }
    }

    #[test]
    fn test_insert_then_query() {
        for kind in [IndexKind::Grid, IndexKind::Quadtree] {
            let mut rng = Pcg32::seed_from_u64(4);
            let store = AgentStore::random_layout(&settings(kind), 300, &mut rng);
            let mut index = SpatialIndex::from_settings(&settings(kind)).unwrap();
            index.build(&store).unwrap();
            assert_eq!(index.kind(), kind);
            index.verify(&store).unwrap();
            for (handle, agent) in store.iter().filter(|(_, a)| a.is_alive()) {
                assert!(index.query_point(agent.pos).contains(&handle));
            }
        }
    }
}
