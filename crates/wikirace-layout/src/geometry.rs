//! 2D vector math for the layout, in abstract pixel units.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Distances below this are treated as coincident.
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Vec2) -> f64 {
        (self - other).length()
    }

    /// Unit vector, or `None` when the length is (near) zero.
    #[must_use]
    pub fn normalized(self) -> Option<Vec2> {
        let len = self.length();
        if len < EPSILON || !len.is_finite() {
            None
        } else {
            Some(Vec2::new(self.x / len, self.y / len))
        }
    }

    /// Rotated 90° counter-clockwise.
    #[must_use]
    pub fn perp(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    #[must_use]
    pub fn cross(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Same vector with each component clamped to `±limit`.
    #[must_use]
    pub fn clamp_components(self, limit: f64) -> Vec2 {
        Vec2::new(self.x.clamp(-limit, limit), self.y.clamp(-limit, limit))
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Deterministic unit direction for index `i`, used to separate coincident points.
pub fn fallback_direction(i: usize) -> Vec2 {
    let angle = i as f64 * 2.399_963_229_728_653; // golden angle
    Vec2::new(angle.cos(), angle.sin())
}
