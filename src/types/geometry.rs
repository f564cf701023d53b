//! Page-space geometry primitives.
//!
//! All rectangles in the engine live in unrotated page coordinate space:
//! origin at the top-left corner of the page, x to the right, y downward,
//! units in PDF points. Provider-reported rectangles in rotated display
//! space are converted on entry and never travel further.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    /// Creates a rectangle, normalizing corner order
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// Intersection area as a fraction of the smaller rectangle's area.
    ///
    /// 1.0 when one rectangle fully covers the other, 0.0 when disjoint.
    pub fn overlap_ratio(&self, other: &Rect) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        match self.intersection(other) {
            Some(i) => i.area() / smaller,
            None => 0.0,
        }
    }

    /// Rectangle expanded by `margin` on every side
    pub fn expanded(&self, margin: f64) -> Rect {
        Rect::new(
            self.x0 - margin,
            self.y0 - margin,
            self.x1 + margin,
            self.y1 + margin,
        )
    }
}

/// Page rotation as reported by the layout provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Parses a degree value; accepts negatives and multiples of 360
    pub fn from_degrees(degrees: i32) -> Option<Rotation> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    pub fn is_swapped(&self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// Unrotated page dimensions plus the rotation under which the layout
/// provider reported its coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Unrotated page width in points
    pub width: f64,
    /// Unrotated page height in points
    pub height: f64,
    pub rotation: Rotation,
}

impl PageGeometry {
    pub fn new(width: f64, height: f64, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            rotation,
        }
    }

    /// Maps a point from rotated display space into unrotated page space.
    ///
    /// Display space has its own top-left origin; for 90/270 rotations its
    /// width and height are the page's swapped.
    pub fn to_unrotated_point(&self, x: f64, y: f64) -> (f64, f64) {
        match self.rotation {
            Rotation::R0 => (x, y),
            Rotation::R90 => (y, self.height - x),
            Rotation::R180 => (self.width - x, self.height - y),
            Rotation::R270 => (self.width - y, x),
        }
    }

    /// Maps a provider rectangle from rotated display space into unrotated
    /// page space, renormalizing corner order
    pub fn to_unrotated_rect(&self, rect: &Rect) -> Rect {
        let (ax, ay) = self.to_unrotated_point(rect.x0, rect.y0);
        let (bx, by) = self.to_unrotated_point(rect.x1, rect.y1);
        Rect::new(ax, ay, bx, by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_normalizes_corners() {
        let r = Rect::new(50.0, 30.0, 10.0, 10.0);
        assert_eq!(r, Rect::new(10.0, 10.0, 50.0, 30.0));
        assert_eq!(r.width(), 40.0);
        assert_eq!(r.height(), 20.0);
    }

    #[test]
    fn overlap_ratio_is_relative_to_smaller() {
        let big = Rect::new(0.0, 0.0, 100.0, 100.0);
        let small = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(big.overlap_ratio(&small), 1.0);

        let disjoint = Rect::new(200.0, 200.0, 210.0, 210.0);
        assert_eq!(big.overlap_ratio(&disjoint), 0.0);
    }

    #[test]
    fn rotation_parses_degree_multiples() {
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::R90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::R270));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn quarter_turn_maps_to_reference_layout() {
        // A token reported at (10,10,50,30) on a 90-degree rotated 600x800
        // page lands at the equivalent unrotated rectangle.
        let geom = PageGeometry::new(600.0, 800.0, Rotation::R90);
        let mapped = geom.to_unrotated_rect(&Rect::new(10.0, 10.0, 50.0, 30.0));
        assert_eq!(mapped, Rect::new(10.0, 750.0, 30.0, 790.0));
        // Width and height swap under a quarter turn.
        assert_eq!(mapped.width(), 20.0);
        assert_eq!(mapped.height(), 40.0);
    }

    #[test]
    fn identity_and_half_turn() {
        let geom = PageGeometry::new(600.0, 800.0, Rotation::R0);
        let r = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(geom.to_unrotated_rect(&r), r);

        let geom = PageGeometry::new(600.0, 800.0, Rotation::R180);
        assert_eq!(
            geom.to_unrotated_rect(&r),
            Rect::new(597.0, 796.0, 599.0, 798.0)
        );
    }
}
