//! Layout tuning parameters
//!
//! Loaded as the `[layout]` section of the wikirace config file; every field
//! falls back to its default.

use crate::geometry::Vec2;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Pinned position of the start node.
    pub start_anchor: Vec2,
    /// Pinned position of the target node; centre of every orbit.
    pub target_anchor: Vec2,
    /// Spawn position for nodes with no placed graph parent.
    pub fallback_spawn: Vec2,
    /// Distance from the parent at which a new node spawns.
    pub spawn_step: f64,

    /// Pull toward the node's orbit, per pixel of radius error.
    pub orbital_strength: f64,
    /// Link rest length as a multiple of the orbit spacing.
    pub link_distance_factor: f64,
    /// Spring strength for moves that kept the distance (`distance_change == 0`).
    pub lateral_link_strength: f64,
    /// Spring strength for moves that changed the distance.
    pub progress_link_strength: f64,
    /// Spring strength for path-hint edges.
    pub hint_link_strength: f64,
    /// Multiplier applied when either end of a link is multi-visit.
    pub multi_visit_link_factor: f64,

    /// Push strength per pixel of overlap.
    pub collision_strength: f64,
    /// Gap kept between node rims.
    pub collision_padding: f64,
    pub base_radius: f64,
    pub radius_per_visit: f64,
    pub max_radius: f64,

    /// Push back toward the agent's half-plane, per pixel on the wrong side.
    pub side_strength: f64,

    /// Fraction of velocity removed each tick.
    pub velocity_decay: f64,
    pub alpha_start: f64,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    pub alpha_target: f64,
    /// Energy re-injected on topology change or anchor move.
    pub reheat_alpha: f64,
    /// Per-component cap on a single tick's force.
    pub max_force: f64,

    /// Runner tick period.
    pub tick_interval_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            start_anchor: Vec2::new(-400.0, 0.0),
            target_anchor: Vec2::new(0.0, 0.0),
            fallback_spawn: Vec2::new(-400.0, -300.0),
            spawn_step: 40.0,

            orbital_strength: 0.1,
            link_distance_factor: 1.0,
            lateral_link_strength: 0.3,
            progress_link_strength: 0.02,
            hint_link_strength: 0.01,
            multi_visit_link_factor: 0.25,

            collision_strength: 0.7,
            collision_padding: 6.0,
            base_radius: 8.0,
            radius_per_visit: 3.0,
            max_radius: 24.0,

            side_strength: 0.02,

            velocity_decay: 0.4,
            alpha_start: 1.0,
            alpha_min: 0.001,
            alpha_decay: 0.0228,
            alpha_target: 0.0,
            reheat_alpha: 0.3,
            max_force: 500.0,

            tick_interval_ms: 16,
        }
    }
}

impl LayoutConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Rendered radius for a node with `visits` arrivals.
    pub fn node_radius(&self, visits: usize) -> f64 {
        let extra = visits.saturating_sub(1) as f64 * self.radius_per_visit;
        (self.base_radius + extra).clamp(0.0, self.max_radius.max(self.base_radius))
    }
}
