//! Core types for Wikirace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Agent identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AgentId(Arc<str>);

impl AgentId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for AgentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// Task identifier, fresh per `create_task`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which half-plane of the start–target axis an agent's path fans out to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// +1 for left (counter-clockwise), -1 for right.
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }
}

/// Side for the agent that joined at `join_index`, alternating from the left.
pub fn assign_side(join_index: usize) -> Side {
    if join_index % 2 == 0 {
        Side::Left
    } else {
        Side::Right
    }
}

/// Navigation status of one agent.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    NotStarted,
    InProgress,
    Won,
    Lost,
    Error,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Error)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One page arrival of one agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    pub agent_id: AgentId,
    pub page_title: String,
    pub move_index: usize,
    pub is_start_page: bool,
    pub is_target_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_from_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_target: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_change: Option<i64>,
    #[serde(default)]
    pub optimal_paths: Vec<Vec<String>>,
}

/// Ordered, append-only visits of one agent.
///
/// `visits[0]` is the start page. Move indices are strictly increasing, so a
/// visit is addressed by binary search on `move_index`; `by_title` maps a page
/// title to every position it occupies for targeted backfill.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSequence {
    visits: Vec<PageVisit>,
    pub status: AgentStatus,
    #[serde(skip)]
    by_title: HashMap<String, Vec<usize>>,
}

impl AgentSequence {
    pub fn new(agent_id: &AgentId, start_page: &str, target_page: &str) -> Self {
        let start = PageVisit {
            agent_id: agent_id.clone(),
            page_title: start_page.to_string(),
            move_index: 0,
            is_start_page: true,
            is_target_page: start_page == target_page,
            visited_from_page: None,
            distance_to_target: None,
            distance_change: None,
            optimal_paths: Vec::new(),
        };
        let mut by_title = HashMap::new();
        by_title.insert(start_page.to_string(), vec![0]);
        Self {
            visits: vec![start],
            status: AgentStatus::NotStarted,
            by_title,
        }
    }

    pub fn visits(&self) -> &[PageVisit] {
        &self.visits
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Index of the furthest page this agent has reached.
    pub fn highest_index(&self) -> usize {
        self.visits.len().saturating_sub(1)
    }

    pub fn last(&self) -> Option<&PageVisit> {
        self.visits.last()
    }

    pub fn last_move_index(&self) -> usize {
        self.visits.last().map(|v| v.move_index).unwrap_or(0)
    }

    pub fn visit(&self, move_index: usize) -> Option<&PageVisit> {
        self.visits
            .binary_search_by_key(&move_index, |v| v.move_index)
            .ok()
            .map(|i| &self.visits[i])
    }

    pub fn visits_of<'a>(&'a self, title: &str) -> impl Iterator<Item = &'a PageVisit> + 'a {
        self.by_title
            .get(title)
            .into_iter()
            .flatten()
            .map(move |&i| &self.visits[i])
    }

    /// Append a move. Returns false (and appends nothing) when `move_index`
    /// does not advance past the last visit.
    pub fn push_move(
        &mut self,
        agent_id: &AgentId,
        move_index: usize,
        from_page: Option<String>,
        to_page: &str,
        target_page: &str,
    ) -> bool {
        if move_index <= self.last_move_index() {
            return false;
        }
        let position = self.visits.len();
        self.visits.push(PageVisit {
            agent_id: agent_id.clone(),
            page_title: to_page.to_string(),
            move_index,
            is_start_page: false,
            is_target_page: to_page == target_page,
            visited_from_page: from_page.filter(|p| !p.is_empty()),
            distance_to_target: None,
            distance_change: None,
            optimal_paths: Vec::new(),
        });
        self.by_title
            .entry(to_page.to_string())
            .or_default()
            .push(position);
        true
    }

    /// Backfill pathfinding data onto every visit of `title`. Returns how many
    /// visits were updated. Distance changes are not recomputed here.
    pub fn apply_path_result(&mut self, title: &str, paths: &[Vec<String>], length: u32) -> usize {
        let Some(positions) = self.by_title.get(title) else {
            return 0;
        };
        for &i in positions {
            let visit = &mut self.visits[i];
            visit.optimal_paths = paths.to_vec();
            visit.distance_to_target = Some(length);
        }
        positions.len()
    }

    /// Single pass: each visit's change is its predecessor's distance minus its own.
    pub fn recompute_distance_changes(&mut self) {
        let mut previous: Option<u32> = None;
        for visit in &mut self.visits {
            visit.distance_change = match (previous, visit.distance_to_target) {
                (Some(prev), Some(cur)) if !visit.is_start_page => Some(prev as i64 - cur as i64),
                _ => None,
            };
            previous = visit.distance_to_target;
        }
    }
}

/// Display metadata for an agent. Opaque to the engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentDisplay {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Agent registration for `create_task`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    #[serde(flatten)]
    pub display: AgentDisplay,
}

impl AgentSpec {
    pub fn new(id: impl Into<AgentId>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display: AgentDisplay {
                model: model.into(),
                icon: None,
            },
        }
    }
}

/// Final outcome reported by an agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub status: AgentStatus,
    pub steps: u32,
    #[serde(flatten)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

/// One racer and its navigation history.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub display: AgentDisplay,
    pub side: Side,
    pub sequence: AgentSequence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AgentResult>,
}

impl Agent {
    pub fn is_finished(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.status.is_terminal())
    }
}

/// Whether the viewed index follows the newest data.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Live,
    Stepping,
}

/// Task-wide race state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub created_at: DateTime<Utc>,
    pub start_page: String,
    pub target_page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortest_path_length: Option<u32>,
    pub agents: Vec<Agent>,
    pub view_mode: ViewMode,
    pub current_page_index: usize,
    pub viewing_page_index: usize,
}

/// Immutable copy of a task handed to subscribers.
pub type TaskSnapshot = Arc<Task>;

impl Task {
    /// Build a fresh task. Sides follow join order. Validation is the caller's job.
    pub fn new(agents: Vec<AgentSpec>, start_page: &str, target_page: &str) -> Self {
        let agents = agents
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Agent {
                sequence: AgentSequence::new(&spec.id, start_page, target_page),
                id: spec.id,
                display: spec.display,
                side: assign_side(i),
                result: None,
            })
            .collect();
        Self {
            id: TaskId::new(),
            created_at: Utc::now(),
            start_page: start_page.to_string(),
            target_page: target_page.to_string(),
            shortest_path_length: None,
            agents,
            view_mode: ViewMode::Live,
            current_page_index: 0,
            viewing_page_index: 0,
        }
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| &a.id == id)
    }

    pub fn agent_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| &a.id == id)
    }

    pub fn agent_sides(&self) -> BTreeMap<AgentId, Side> {
        self.agents.iter().map(|a| (a.id.clone(), a.side)).collect()
    }

    /// Every agent has reported a terminal result.
    pub fn is_complete(&self) -> bool {
        !self.agents.is_empty() && self.agents.iter().all(Agent::is_finished)
    }

    /// Highest move index the materializer should include; `None` means everything.
    pub fn cutoff(&self) -> Option<usize> {
        match self.view_mode {
            ViewMode::Live => None,
            ViewMode::Stepping => Some(self.viewing_page_index),
        }
    }

    /// Recompute `current_page_index` from the sequences. Never moves backwards.
    pub fn recompute_progress(&mut self) {
        let furthest = self
            .agents
            .iter()
            .map(|a| a.sequence.highest_index())
            .max()
            .unwrap_or(0);
        self.current_page_index = self.current_page_index.max(furthest);
        if self.view_mode == ViewMode::Live {
            self.viewing_page_index = self.current_page_index;
        }
        self.viewing_page_index = self.viewing_page_index.min(self.current_page_index);
    }

    pub fn can_step_forward(&self) -> bool {
        self.viewing_page_index < self.current_page_index
    }

    pub fn can_step_backward(&self) -> bool {
        self.viewing_page_index > 0
    }

    pub fn step_forward(&mut self) -> bool {
        if !self.can_step_forward() {
            return false;
        }
        self.viewing_page_index += 1;
        self.view_mode = ViewMode::Stepping;
        true
    }

    pub fn step_backward(&mut self) -> bool {
        if !self.can_step_backward() {
            return false;
        }
        self.viewing_page_index -= 1;
        self.view_mode = ViewMode::Stepping;
        true
    }

    pub fn set_viewing_index(&mut self, index: usize) {
        self.viewing_page_index = index.min(self.current_page_index);
        self.view_mode = ViewMode::Stepping;
    }

    pub fn enter_live_mode(&mut self) {
        self.viewing_page_index = self.current_page_index;
        self.view_mode = ViewMode::Live;
    }
}
