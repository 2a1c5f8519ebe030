//! Axis-aligned rectangles used as quadtree node boundaries

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Immutable axis-aligned boundary. Containment is inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

/// Child slot of a quadtree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopLeft,
        Quadrant::TopRight,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// True for the two children left of the vertical division line
    #[inline]
    pub fn is_left(self) -> bool {
        matches!(self, Quadrant::TopLeft | Quadrant::BottomLeft)
    }
}

impl Rect {
    pub fn new(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Square `[0, size]` on both axes
    pub fn square(size: f32) -> Self {
        Self::new(0.0, size, 0.0, size)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Euclidean distance from `p` to the closest point of the rectangle
    /// (zero inside)
    pub fn distance_to(&self, p: Vec2) -> f32 {
        let dx = (self.min_x - p.x).max(0.0).max(p.x - self.max_x);
        let dy = (self.min_y - p.y).max(0.0).max(p.y - self.max_y);
        (dx * dx + dy * dy).sqrt()
    }

    /// One of the four equal sub-rectangles split at the centre
    pub fn quadrant(&self, q: Quadrant) -> Rect {
        let c = self.center();
        match q {
            Quadrant::TopLeft => Rect::new(self.min_x, c.x, c.y, self.max_y),
            Quadrant::TopRight => Rect::new(c.x, self.max_x, c.y, self.max_y),
            Quadrant::BottomLeft => Rect::new(self.min_x, c.x, self.min_y, c.y),
            Quadrant::BottomRight => Rect::new(c.x, self.max_x, self.min_y, c.y),
        }
    }
}
