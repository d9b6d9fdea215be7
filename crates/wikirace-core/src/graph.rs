//! Materialized graph shape shared by the materializer and the layout engine

use crate::types::{AgentId, Side};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageNodeKind {
    Start,
    Target,
    Visited,
    PathHint,
}

impl PageNodeKind {
    /// Start and target anchor the layout and are never downgraded.
    pub fn is_anchor(self) -> bool {
        matches!(self, Self::Start | Self::Target)
    }
}

/// One agent's arrival on a node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeVisit {
    pub agent_id: AgentId,
    pub move_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_change: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    pub page_title: String,
    pub kind: PageNodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_target: Option<u32>,
    #[serde(default)]
    pub visits: Vec<NodeVisit>,
}

impl PageNode {
    pub fn new(page_title: impl Into<String>, kind: PageNodeKind, distance_to_target: Option<u32>) -> Self {
        Self {
            page_title: page_title.into(),
            kind,
            distance_to_target,
            visits: Vec::new(),
        }
    }

    pub fn visit_count(&self) -> usize {
        self.visits.len()
    }

    pub fn distinct_agents(&self) -> usize {
        self.visits.iter().map(|v| &v.agent_id).collect::<HashSet<_>>().len()
    }

    /// Visited by two or more distinct agents.
    pub fn is_multi_visit(&self) -> bool {
        self.distinct_agents() >= 2
    }

    /// Widen toward `visited` unless this is an anchor.
    pub fn mark_visited(&mut self) {
        if !self.kind.is_anchor() {
            self.kind = PageNodeKind::Visited;
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Move,
    PathHint,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEdge {
    pub id: String,
    pub source_title: String,
    pub target_title: String,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_change: Option<i64>,
}

/// Deduplicated nodes and edges for one view of a task.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    pub nodes: Vec<PageNode>,
    pub edges: Vec<NavigationEdge>,
    #[serde(default)]
    pub agent_sides: BTreeMap<AgentId, Side>,
}

impl GraphData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, title: &str) -> Option<&PageNode> {
        self.nodes.iter().find(|n| n.page_title == title)
    }

    pub fn node_keys(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(|n| n.page_title.as_str()).collect()
    }

    pub fn edge_ids(&self) -> BTreeSet<&str> {
        self.edges.iter().map(|e| e.id.as_str()).collect()
    }

    /// Key-based equality: same node titles and edge ids, order ignored.
    pub fn same_keys(&self, other: &GraphData) -> bool {
        self.node_keys() == other.node_keys() && self.edge_ids() == other.edge_ids()
    }

    pub fn side_of(&self, agent: &AgentId) -> Option<Side> {
        self.agent_sides.get(agent).copied()
    }
}
