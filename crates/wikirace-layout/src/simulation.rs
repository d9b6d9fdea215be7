//! Layout state machine: `Idle → Simulating → Converged`, `reset()` back to `Idle`.
//!
//! `update` diffs a new graph against the placed nodes, spawning only what is
//! new; `tick` runs one integration step of the force field.

use crate::config::LayoutConfig;
use crate::forces::{self, Body, OrbitField};
use crate::geometry::{fallback_direction, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;
use wikirace_core::{AgentId, Error, GraphData, PageNode, PageNodeKind, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutState {
    Idle,
    Simulating,
    Converged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Start,
    Target,
}

/// One placed node.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub key: String,
    pub pos: Vec2,
    pub vel: Vec2,
    pub pinned: Option<AnchorKind>,
    pub distance: Option<u32>,
    pub radius: f64,
    pub side: Option<Side>,
    pub visit_count: usize,
    pub multi_visit: bool,
    /// Nodes spawned off this one so far; drives fan-out.
    children: usize,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    source: usize,
    target: usize,
    strength: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub added: usize,
    pub removed: usize,
    pub links: usize,
}

impl UpdateSummary {
    pub fn topology_changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Node positions after a tick, keyed by page title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFrame {
    pub tick: u64,
    pub state: LayoutState,
    pub positions: BTreeMap<String, Vec2>,
}

pub struct LayoutEngine {
    config: LayoutConfig,
    nodes: Vec<LayoutNode>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
    edge_ids: BTreeSet<String>,
    start_anchor: Vec2,
    target_anchor: Vec2,
    spacing: f64,
    alpha: f64,
    state: LayoutState,
    ticks: u64,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        let start_anchor = config.start_anchor;
        let target_anchor = config.target_anchor;
        let spacing = forces::orbit_spacing(start_anchor, target_anchor, None, config.spawn_step);
        Self {
            config,
            nodes: Vec::new(),
            index: HashMap::new(),
            links: Vec::new(),
            edge_ids: BTreeSet::new(),
            start_anchor,
            target_anchor,
            spacing,
            alpha: 0.0,
            state: LayoutState::Idle,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current pixel distance per hop.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: &str) -> Option<&LayoutNode> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter()
    }

    /// Spring strength of the link `source → target`, if both are placed.
    pub fn link_strength(&self, source: &str, target: &str) -> Option<f64> {
        let (s, t) = (*self.index.get(source)?, *self.index.get(target)?);
        self.links
            .iter()
            .find(|l| l.source == s && l.target == t)
            .map(|l| l.strength)
    }

    pub fn anchor(&self, kind: AnchorKind) -> Vec2 {
        match kind {
            AnchorKind::Start => self.start_anchor,
            AnchorKind::Target => self.target_anchor,
        }
    }

    /// Merge a freshly materialized graph into the layout.
    ///
    /// Placed nodes keep position and velocity; vanished nodes are dropped;
    /// new nodes spawn beside their graph parent.
    pub fn update(&mut self, graph: &GraphData) -> UpdateSummary {
        let keep = graph.node_keys();
        let before = self.nodes.len();
        self.nodes.retain(|n| keep.contains(n.key.as_str()));
        let removed = before - self.nodes.len();
        self.reindex();

        let owners: HashMap<(AgentId, usize), &str> = graph
            .nodes
            .iter()
            .flat_map(|n| {
                n.visits
                    .iter()
                    .map(move |v| ((v.agent_id.clone(), v.move_index), n.page_title.as_str()))
            })
            .collect();

        let mut added = 0;
        let mut refreshed = false;
        for page in &graph.nodes {
            let side = page.visits.first().and_then(|v| graph.side_of(&v.agent_id));
            let pinned = match page.kind {
                PageNodeKind::Start => Some(AnchorKind::Start),
                PageNodeKind::Target => Some(AnchorKind::Target),
                PageNodeKind::Visited | PageNodeKind::PathHint => None,
            };
            let radius = self.config.node_radius(page.visit_count());
            let multi_visit = page.is_multi_visit();

            if let Some(&i) = self.index.get(&page.page_title) {
                let anchor = pinned.map(|a| self.anchor(a));
                let node = &mut self.nodes[i];
                refreshed |= node.distance != page.distance_to_target;
                node.distance = page.distance_to_target;
                node.radius = radius;
                node.side = side;
                node.visit_count = page.visit_count();
                node.multi_visit = multi_visit;
                node.pinned = pinned;
                if let Some(pos) = anchor {
                    node.pos = pos;
                    node.vel = Vec2::ZERO;
                }
                continue;
            }

            let pos = match pinned {
                Some(anchor) => self.anchor(anchor),
                None => self.spawn_position(graph, page, side, &owners),
            };
            self.index.insert(page.page_title.clone(), self.nodes.len());
            self.nodes.push(LayoutNode {
                key: page.page_title.clone(),
                pos,
                vel: Vec2::ZERO,
                pinned,
                distance: page.distance_to_target,
                radius,
                side,
                visit_count: page.visit_count(),
                multi_visit,
                children: 0,
            });
            added += 1;
        }

        let links_changed = self.rebuild_links(graph);
        let spacing_changed = self.recompute_spacing();

        let summary = UpdateSummary { added, removed, links: self.links.len() };
        if summary.topology_changed() || links_changed || spacing_changed || refreshed {
            self.reheat();
        }
        if self.nodes.is_empty() {
            self.state = LayoutState::Idle;
            self.alpha = 0.0;
        }
        debug!(added, removed, links = summary.links, state = ?self.state, "layout updated");
        summary
    }

    /// One integration step. Returns false when there is nothing to simulate.
    pub fn tick(&mut self) -> bool {
        if self.state != LayoutState::Simulating {
            return false;
        }

        let totals = self.accumulate_forces();
        let cfg = &self.config;
        let damping = (1.0 - cfg.velocity_decay).clamp(0.0, 1.0);
        for (node, force) in self.nodes.iter_mut().zip(totals) {
            if node.pinned.is_some() {
                node.vel = Vec2::ZERO;
                continue;
            }
            let force = if force.is_finite() { force.clamp_components(cfg.max_force) } else { Vec2::ZERO };
            let vel = (node.vel + force * self.alpha) * damping;
            let pos = node.pos + vel;
            if vel.is_finite() && pos.is_finite() {
                node.vel = vel;
                node.pos = pos;
            } else {
                node.vel = Vec2::ZERO;
            }
        }

        self.alpha += (cfg.alpha_target - self.alpha) * cfg.alpha_decay;
        self.ticks += 1;
        if self.alpha < cfg.alpha_min {
            self.state = LayoutState::Converged;
            debug!(ticks = self.ticks, "layout converged");
        }
        true
    }

    pub fn positions(&self) -> PositionFrame {
        PositionFrame {
            tick: self.ticks,
            state: self.state,
            positions: self.nodes.iter().map(|n| (n.key.clone(), n.pos)).collect(),
        }
    }

    /// Move a pinned anchor; orbit spacing follows and the layout reheats.
    pub fn move_anchor(&mut self, kind: AnchorKind, pos: Vec2) {
        if !pos.is_finite() {
            return;
        }
        match kind {
            AnchorKind::Start => self.start_anchor = pos,
            AnchorKind::Target => self.target_anchor = pos,
        }
        for node in self.nodes.iter_mut().filter(|n| n.pinned == Some(kind)) {
            node.pos = pos;
            node.vel = Vec2::ZERO;
        }
        self.recompute_spacing();
        self.reheat();
    }

    /// Forget every node and return to `Idle` with the configured anchors.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.links.clear();
        self.edge_ids.clear();
        self.start_anchor = self.config.start_anchor;
        self.target_anchor = self.config.target_anchor;
        self.spacing = forces::orbit_spacing(self.start_anchor, self.target_anchor, None, self.config.spawn_step);
        self.alpha = 0.0;
        self.state = LayoutState::Idle;
        self.ticks = 0;
    }

    fn reindex(&mut self) {
        self.index = self.nodes.iter().enumerate().map(|(i, n)| (n.key.clone(), i)).collect();
    }

    fn reheat(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        self.alpha = match self.state {
            LayoutState::Idle => self.config.alpha_start,
            LayoutState::Simulating | LayoutState::Converged => self.alpha.max(self.config.reheat_alpha),
        };
        self.state = LayoutState::Simulating;
    }

    /// Parent is the node holding the same agent's previous visit, else the
    /// source of any placed incoming edge.
    fn find_parent(&self, graph: &GraphData, page: &PageNode, owners: &HashMap<(AgentId, usize), &str>) -> Option<usize> {
        let by_visit = page
            .visits
            .iter()
            .filter(|v| v.move_index > 0)
            .filter_map(|v| owners.get(&(v.agent_id.clone(), v.move_index - 1)).copied());
        let by_edge = graph
            .edges
            .iter()
            .filter(|e| e.target_title == page.page_title)
            .map(|e| e.source_title.as_str());
        by_visit
            .chain(by_edge)
            .filter(|title| *title != page.page_title)
            .find_map(|title| self.index.get(title).copied())
    }

    fn spawn_position(
        &mut self,
        graph: &GraphData,
        page: &PageNode,
        side: Option<Side>,
        owners: &HashMap<(AgentId, usize), &str>,
    ) -> Vec2 {
        let Some(parent) = self.find_parent(graph, page, owners) else {
            let err = Error::MissingParentNode(page.page_title.clone());
            debug!(error = %err, "spawning at fallback position");
            return self.config.fallback_spawn;
        };

        let parent_pos = self.nodes[parent].pos;
        let fan = self.nodes[parent].children;
        self.nodes[parent].children += 1;

        let radial = (parent_pos - self.target_anchor)
            .normalized()
            .unwrap_or_else(|| fallback_direction(self.nodes.len()));
        let sign = side.map_or(1.0, Side::sign);
        let step = self.config.spawn_step;
        let pos = parent_pos + radial.perp() * (sign * step) + radial * (fan as f64 * step * 0.5);
        if pos.is_finite() {
            pos
        } else {
            self.config.fallback_spawn
        }
    }

    /// Returns true when the set of edges changed.
    fn rebuild_links(&mut self, graph: &GraphData) -> bool {
        self.links = graph
            .edges
            .iter()
            .filter_map(|edge| {
                let source = *self.index.get(&edge.source_title)?;
                let target = *self.index.get(&edge.target_title)?;
                if source == target {
                    return None;
                }
                let multi = self.nodes[source].multi_visit || self.nodes[target].multi_visit;
                Some(Link {
                    source,
                    target,
                    strength: forces::link_strength(edge.kind, edge.distance_change, multi, &self.config),
                })
            })
            .collect();

        let ids: BTreeSet<String> = graph.edges.iter().map(|e| e.id.clone()).collect();
        let changed = ids != self.edge_ids;
        self.edge_ids = ids;
        changed
    }

    /// Returns true when the spacing moved.
    fn recompute_spacing(&mut self) -> bool {
        let shortest = self
            .nodes
            .iter()
            .find(|n| n.pinned == Some(AnchorKind::Start))
            .and_then(|n| n.distance);
        let spacing = forces::orbit_spacing(self.start_anchor, self.target_anchor, shortest, self.config.spawn_step);
        let changed = (spacing - self.spacing).abs() > f64::EPSILON;
        self.spacing = spacing;
        changed
    }

    fn accumulate_forces(&self) -> Vec<Vec2> {
        let cfg = &self.config;
        let bodies: Vec<Body> = self
            .nodes
            .iter()
            .map(|n| Body { pos: n.pos, radius: n.radius, distance: n.distance, side: n.side })
            .collect();
        let mut acc = vec![Vec2::ZERO; bodies.len()];

        let field = OrbitField { center: self.target_anchor, spacing: self.spacing, strength: cfg.orbital_strength };
        let axis = (self.start_anchor - self.target_anchor).normalized();
        for (i, body) in bodies.iter().enumerate() {
            if self.nodes[i].pinned.is_some() {
                continue;
            }
            acc[i] += forces::orbital_force(body, &field, fallback_direction(i));
            if let Some(axis) = axis {
                acc[i] += forces::side_force(body, self.target_anchor, axis, cfg.side_strength);
            }
        }

        let rest = self.spacing * cfg.link_distance_factor;
        for link in &self.links {
            let f = forces::spring_force(bodies[link.source].pos, bodies[link.target].pos, rest, link.strength);
            acc[link.source] += f;
            acc[link.target] += -f;
        }

        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let f = forces::collision_force(
                    &bodies[i],
                    &bodies[j],
                    cfg.collision_padding,
                    cfg.collision_strength,
                    fallback_direction(i + j),
                );
                acc[i] += f;
                acc[j] += -f;
            }
        }
        acc
    }
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("state", &self.state)
            .field("alpha", &self.alpha)
            .finish()
    }
}
