//! Pure force functions
//!
//! Each returns the force acting on one body; the simulation sums them per
//! tick. None of them touch positions or velocities.

use crate::config::LayoutConfig;
use crate::geometry::{Vec2, EPSILON};
use wikirace_core::{EdgeKind, Side};

/// What a force needs to know about one node.
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub pos: Vec2,
    pub radius: f64,
    pub distance: Option<u32>,
    pub side: Option<Side>,
}

/// Concentric bands around the target, one per hop.
#[derive(Debug, Clone, Copy)]
pub struct OrbitField {
    pub center: Vec2,
    pub spacing: f64,
    pub strength: f64,
}

/// Pixel distance per hop: anchor separation over the shortest path length.
/// Zero or unknown lengths count as one hop; coincident anchors use `fallback`.
pub fn orbit_spacing(start: Vec2, target: Vec2, shortest_path_length: Option<u32>, fallback: f64) -> f64 {
    let hops = shortest_path_length.unwrap_or(1).max(1) as f64;
    let spacing = start.distance(target) / hops;
    if spacing.is_finite() && spacing > EPSILON {
        spacing
    } else {
        fallback.max(1.0)
    }
}

/// Radial pull toward radius `distance × spacing`. Never tangential.
/// `fallback_dir` is used when the body sits on the centre.
pub fn orbital_force(body: &Body, field: &OrbitField, fallback_dir: Vec2) -> Vec2 {
    let Some(distance) = body.distance else {
        return Vec2::ZERO;
    };
    let offset = body.pos - field.center;
    let radius = offset.length();
    let desired = distance as f64 * field.spacing;
    let dir = offset.normalized().unwrap_or(fallback_dir);
    dir * ((desired - radius) * field.strength)
}

/// Spring strength for an edge.
///
/// Lateral moves (no distance change) pull hard; moves that changed the
/// distance barely pull; multi-visit endpoints weaken either.
pub fn link_strength(kind: EdgeKind, distance_change: Option<i64>, multi_visit: bool, config: &LayoutConfig) -> f64 {
    let base = match (kind, distance_change) {
        (EdgeKind::PathHint, _) => config.hint_link_strength,
        (EdgeKind::Move, Some(0)) => config.lateral_link_strength,
        (EdgeKind::Move, _) => config.progress_link_strength,
    };
    if multi_visit {
        base * config.multi_visit_link_factor
    } else {
        base
    }
}

/// Force on the body at `a` from a spring to `b`.
pub fn spring_force(a: Vec2, b: Vec2, rest_length: f64, strength: f64) -> Vec2 {
    let delta = b - a;
    match delta.normalized() {
        Some(dir) => dir * ((delta.length() - rest_length) * strength),
        None => Vec2::ZERO,
    }
}

/// Short-range push on `a` away from `b` while their rims overlap.
/// `tie_break` separates exactly coincident bodies.
pub fn collision_force(a: &Body, b: &Body, padding: f64, strength: f64, tie_break: Vec2) -> Vec2 {
    let min_dist = a.radius + b.radius + padding;
    let delta = a.pos - b.pos;
    let dist = delta.length();
    if dist >= min_dist {
        return Vec2::ZERO;
    }
    let dir = delta.normalized().unwrap_or(tie_break);
    dir * ((min_dist - dist) * strength)
}

/// Nudge a body back across the start–target axis when it sits on the wrong
/// side. `axis_dir` points from the target toward the start; left is its
/// counter-clockwise normal.
pub fn side_force(body: &Body, axis_origin: Vec2, axis_dir: Vec2, strength: f64) -> Vec2 {
    let Some(side) = body.side else {
        return Vec2::ZERO;
    };
    let signed = axis_dir.cross(body.pos - axis_origin);
    if signed * side.sign() >= 0.0 {
        return Vec2::ZERO;
    }
    axis_dir.perp() * (side.sign() * signed.abs() * strength)
}
