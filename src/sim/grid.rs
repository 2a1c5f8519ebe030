//! Uniform grid hash
//!
//! Alternative broad phase. Cells are square with side `cell_size` and are
//! keyed by `col + multiplier * row`; the whole map is rebuilt from the live
//! agents every frame.
//!
//! A cell is at least as wide as the largest collision diameter, so an agent
//! can only touch agents in its own cell or in the eight cells around it,
//! and only in those whose border it is close to.

use ahash::AHashMap;
use glam::Vec2;

use super::agent::AgentStore;
use super::collision::{CollisionEvent, Contacts, NarrowPhase, StoreContacts};
use crate::error::InvariantViolation;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct GridIndex {
    cell_size: f32,
    multiplier: i64,
    cells: AHashMap<i64, Vec<u32>>,
}

impl GridIndex {
    pub fn new(cell_size: f32, multiplier: i64) -> Self {
        Self {
            cell_size,
            multiplier,
            cells: AHashMap::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.grid_cell_size, settings.grid_key_multiplier)
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cell_of(&self, pos: Vec2) -> (i64, i64) {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.y / self.cell_size).floor() as i64,
        )
    }

    #[inline]
    pub fn key(&self, col: i64, row: i64) -> i64 {
        col + self.multiplier * row
    }

    #[inline]
    pub fn key_of(&self, pos: Vec2) -> i64 {
        let (col, row) = self.cell_of(pos);
        self.key(col, row)
    }

    /// Handles held, dead ones included
    pub fn indexed_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Non-empty cells
    pub fn occupied_cells(&self) -> usize {
        self.cells.values().filter(|c| !c.is_empty()).count()
    }

    /// Drop everything and re-insert every live agent. Cell vectors are kept
    /// so their allocations are reused.
    pub fn rebuild(&mut self, store: &AgentStore) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        for (handle, agent) in store.iter() {
            if agent.is_alive() {
                let key = self.key_of(agent.pos);
                self.cells.entry(key).or_default().push(handle);
            }
        }
    }

    /// Add one agent at its current position
    pub fn insert(&mut self, handle: u32, store: &AgentStore) {
        let key = self.key_of(store.position(handle));
        self.cells.entry(key).or_default().push(handle);
    }

    pub fn remove_dead(&mut self, store: &AgentStore) {
        for cell in self.cells.values_mut() {
            cell.retain(|&h| store.get(h).is_alive());
        }
    }

    /// Handles in the cell covering `pos`
    pub fn query_point(&self, pos: Vec2) -> &[u32] {
        self.cells
            .get(&self.key_of(pos))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve every collision, scanning agents in handle order
    pub fn detect_collisions(
        &self,
        store: &mut AgentStore,
        narrow: &NarrowPhase,
    ) -> Vec<CollisionEvent> {
        let max_radius = narrow.radii.max();
        let mut contacts = StoreContacts::new(store, narrow);
        let mut neighbours = Vec::with_capacity(8);

        for handle in 0..contacts.len() as u32 {
            if !contacts.is_alive(handle) {
                continue;
            }
            let (pos, kind) = contacts.agent(handle);
            let (col, row) = self.cell_of(pos);

            if self.scan_own_cell(self.key(col, row), handle, &mut contacts) {
                continue;
            }

            let reach = narrow.radii.of(kind) + max_radius;
            self.neighbour_keys(pos, col, row, reach, &mut neighbours);
            for &key in &neighbours {
                if self.scan_cell(key, handle, &mut contacts) {
                    break;
                }
            }
        }
        contacts.into_events()
    }

    /// Same-cell partners with a larger handle
    fn scan_own_cell<C: Contacts>(&self, key: i64, a: u32, contacts: &mut C) -> bool {
        let Some(cell) = self.cells.get(&key) else {
            return false;
        };
        for &b in cell {
            if b > a && contacts.is_alive(b) && contacts.try_collide(a, b) {
                return true;
            }
        }
        false
    }

    /// Every live partner of a neighbouring cell
    fn scan_cell<C: Contacts>(&self, key: i64, a: u32, contacts: &mut C) -> bool {
        let Some(cell) = self.cells.get(&key) else {
            return false;
        };
        for &b in cell {
            if contacts.is_alive(b) && contacts.try_collide(a, b) {
                return true;
            }
        }
        false
    }

    /// Keys of the neighbouring cells within `reach` of `pos`: the side cells
    /// whose border is in reach, plus the corners where both axes are. Reach
    /// never exceeds `cell_size`, but it may exceed half of it, in which case
    /// both sides of an axis qualify.
    fn neighbour_keys(&self, pos: Vec2, col: i64, row: i64, reach: f32, out: &mut Vec<i64>) {
        out.clear();
        let fx = pos.x - col as f32 * self.cell_size;
        let fy = pos.y - row as f32 * self.cell_size;

        let sides = |offset: f32| {
            let mut steps = [0i64; 2];
            let mut n = 0;
            if offset < reach {
                steps[n] = -1;
                n += 1;
            }
            if self.cell_size - offset < reach {
                steps[n] = 1;
                n += 1;
            }
            (steps, n)
        };
        let (xs, nx) = sides(fx);
        let (ys, ny) = sides(fy);

        for &dx in &xs[..nx] {
            out.push(self.key(col + dx, row));
        }
        for &dy in &ys[..ny] {
            out.push(self.key(col, row + dy));
        }
        for &dx in &xs[..nx] {
            for &dy in &ys[..ny] {
                out.push(self.key(col + dx, row + dy));
            }
        }
    }

    /// Every live agent sits once in the cell of its position
    pub fn verify(&self, store: &AgentStore) -> Result<(), InvariantViolation> {
        let mut seen = vec![false; store.count()];
        let mut indexed = 0;
        for (&key, cell) in &self.cells {
            for &handle in cell {
                let agent = store.get(handle);
                if !agent.is_alive() {
                    continue;
                }
                if std::mem::replace(&mut seen[handle as usize], true) {
                    return Err(InvariantViolation::Duplicate { handle });
                }
                if self.key_of(agent.pos) != key {
                    return Err(InvariantViolation::OutsideBucket {
                        handle,
                        x: agent.pos.x,
                        y: agent.pos.y,
                        depth: 0,
                    });
                }
                indexed += 1;
            }
        }
        let live = store.live_count();
        if indexed != live {
            return Err(InvariantViolation::LiveCountMismatch {
                store: live,
                indexed,
            });
        }
        Ok(())
    }
}
