//! Quadtree collision traversal
//!
//! Tables must be sorted by x (see [`QuadTree::sort`]) before scanning; every
//! loop relies on it to stop early once candidates are further than the prune
//! distance along x.

use glam::Vec2;

use super::agent::AgentStore;
use super::collision::{
    CollisionEvent, Contacts, NarrowPhase, SharedContacts, StatusOverlay, StoreContacts,
};
use super::quadtree::{NodeId, QuadTree, ROOT};
use super::rect::Quadrant;

impl QuadTree {
    /// Resolve every collision in the tree against the live store
    pub fn detect_collisions(
        &self,
        store: &mut AgentStore,
        narrow: &NarrowPhase,
    ) -> Vec<CollisionEvent> {
        let mut contacts = StoreContacts::new(store, narrow);
        self.check_node(ROOT, &mut contacts);
        contacts.into_events()
    }

    /// Same result shape as [`QuadTree::detect_collisions`], with the four
    /// top-level subtrees scanned on rayon tasks. The root's permanent table
    /// spans all of them and is scanned after the join.
    pub fn detect_collisions_parallel(
        &self,
        store: &mut AgentStore,
        narrow: &NarrowPhase,
    ) -> Vec<CollisionEvent> {
        let Some(children) = self.node(ROOT).children else {
            return self.detect_collisions(store, narrow);
        };

        let overlay = StatusOverlay::capture(store);
        let mut events = {
            let frozen: &AgentStore = store;
            let overlay = &overlay;
            let mut per_subtree: [Vec<CollisionEvent>; 4] = Default::default();
            rayon::scope(|s| {
                for (slot, &child) in per_subtree.iter_mut().zip(children.iter()) {
                    s.spawn(move |_| {
                        let mut contacts = SharedContacts::new(frozen, overlay, narrow);
                        self.check_node(child, &mut contacts);
                        *slot = contacts.events;
                    });
                }
            });

            let mut contacts = SharedContacts::new(frozen, overlay, narrow);
            self.check_permanent(ROOT, &mut contacts);
            let mut events: Vec<CollisionEvent> = per_subtree.into_iter().flatten().collect();
            events.append(&mut contacts.events);
            events
        };
        overlay.commit(store);
        events.shrink_to_fit();
        events
    }

    /// Collisions of everything held at or below `id`
    pub fn check_node<C: Contacts>(&self, id: NodeId, contacts: &mut C) {
        let node = self.node(id);
        if !node.permanent.is_empty() {
            self.check_permanent(id, contacts);
        }
        match node.children {
            Some(children) => {
                for child in children {
                    self.check_node(child, contacts);
                }
            }
            None => self.check_movable(id, contacts),
        }
    }

    /// Permanents of `id` against later permanents, the node's own movables,
    /// and every agent below it
    pub fn check_permanent<C: Contacts>(&self, id: NodeId, contacts: &mut C) {
        let node = self.node(id);
        let margin = self.config().margin;

        for (i, &a) in node.permanent.iter().enumerate() {
            if !contacts.is_alive(a) {
                continue;
            }
            let pa = contacts.position(a);

            if self.scan_forward(&node.permanent[i + 1..], a, pa, contacts) {
                continue;
            }

            let Some(children) = node.children else {
                self.scan_window(&node.movable, a, pa, contacts);
                continue;
            };

            // near the vertical line every left element is to our left and
            // every right element to our right
            let straddles = (pa.x - node.division.x).abs() < margin;
            for q in Quadrant::ALL {
                let child = children[q.index()];
                let died = if !straddles {
                    self.check_subtree(child, a, pa, contacts)
                } else if q.is_left() {
                    self.check_left(child, a, pa, contacts)
                } else {
                    self.check_right(child, a, pa, contacts)
                };
                if died {
                    break;
                }
            }
        }
    }

    /// Movables of a leaf against each other
    pub fn check_movable<C: Contacts>(&self, id: NodeId, contacts: &mut C) {
        let movable = &self.node(id).movable;
        for (i, &a) in movable.iter().enumerate() {
            if contacts.is_alive(a) {
                let pa = contacts.position(a);
                self.scan_forward(&movable[i + 1..], a, pa, contacts);
            }
        }
    }

    /// `a` against every agent at or below `id`. Returns true once `a` died.
    fn check_subtree<C: Contacts>(&self, id: NodeId, a: u32, pa: Vec2, contacts: &mut C) -> bool {
        let node = self.node(id);
        if node.bounds.distance_to(pa) >= self.config().prune {
            return false;
        }
        if self.scan_window(&node.permanent, a, pa, contacts) {
            return true;
        }
        match node.children {
            Some(children) => children
                .iter()
                .any(|&child| self.check_subtree(child, a, pa, contacts)),
            None => self.scan_window(&node.movable, a, pa, contacts),
        }
    }

    /// `a` against a subtree lying entirely to its left
    fn check_left<C: Contacts>(&self, id: NodeId, a: u32, pa: Vec2, contacts: &mut C) -> bool {
        let node = self.node(id);
        if node.bounds.distance_to(pa) >= self.config().prune {
            return false;
        }
        if self.scan_backward(&node.permanent, a, pa, contacts) {
            return true;
        }
        match node.children {
            Some(children) => children
                .iter()
                .any(|&child| self.check_left(child, a, pa, contacts)),
            None => self.scan_backward(&node.movable, a, pa, contacts),
        }
    }

    /// `a` against a subtree lying entirely to its right
    fn check_right<C: Contacts>(&self, id: NodeId, a: u32, pa: Vec2, contacts: &mut C) -> bool {
        let node = self.node(id);
        if node.bounds.distance_to(pa) >= self.config().prune {
            return false;
        }
        if self.scan_forward(&node.permanent, a, pa, contacts) {
            return true;
        }
        match node.children {
            Some(children) => children
                .iter()
                .any(|&child| self.check_right(child, a, pa, contacts)),
            None => self.scan_forward(&node.movable, a, pa, contacts),
        }
    }

    /// Candidates all at or right of `pa.x`, ascending
    fn scan_forward<C: Contacts>(&self, table: &[u32], a: u32, pa: Vec2, contacts: &mut C) -> bool {
        let prune = self.config().prune;
        for &b in table {
            let pb = contacts.position(b);
            if pb.x - pa.x >= prune {
                break;
            }
            if b != a && contacts.is_alive(b) && contacts.try_collide(a, b) {
                return true;
            }
        }
        false
    }

    /// Candidates all left of `pa.x`; walked from the right end
    fn scan_backward<C: Contacts>(&self, table: &[u32], a: u32, pa: Vec2, contacts: &mut C) -> bool {
        let prune = self.config().prune;
        for &b in table.iter().rev() {
            let pb = contacts.position(b);
            if pa.x - pb.x >= prune {
                break;
            }
            if b != a && contacts.is_alive(b) && contacts.try_collide(a, b) {
                return true;
            }
        }
        false
    }

    /// Candidates anywhere on x: binary search to the window start
    fn scan_window<C: Contacts>(&self, table: &[u32], a: u32, pa: Vec2, contacts: &mut C) -> bool {
        let lo = pa.x - self.config().prune;
        let start = table.partition_point(|&h| contacts.position(h).x <= lo);
        self.scan_forward(&table[start..], a, pa, contacts)
    }
}
