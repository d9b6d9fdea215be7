//! Inbound race events — the shapes the transport delivers per agent
//!
//! Wire format (camelCase, `type` tag):
//!
//!   { "type": "bootstrap", "replay": { "moves": [...], "pathResults": [...] },
//!     "config": { "startPage": "A", "targetPage": "D" } }
//!   { "type": "move", "step": 1, "fromPage": "A", "toPage": "B", "status": "in_progress" }
//!   { "type": "path_result", "fromPage": "B", "optimalPaths": [["B","C","D"]], "optimalPathLength": 2 }
//!   { "type": "agent_finished", "result": { "status": "won", "steps": 3 } }
//!   { "type": "task_finished" }
//!
//! Replay files wrap each event in an envelope carrying the agent:
//!   { "agentId": "gpt", "type": "move", ... }

use crate::error::{Error, Result};
use crate::types::{AgentId, AgentResult, AgentStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// One historical move inside a bootstrap replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub step: usize,
    #[serde(default)]
    pub from_page: Option<String>,
    pub to_page: String,
}

/// Pathfinding data for one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub from_page: String,
    pub optimal_paths: Vec<Vec<String>>,
    /// Hops from `from_page` to the target.
    pub optimal_path_length: u32,
}

/// History handed to an agent that connected late.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPayload {
    pub moves: Vec<MoveRecord>,
    #[serde(default)]
    pub path_results: Vec<PathResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaceConfig {
    pub start_page: String,
    pub target_page: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapEvent {
    pub replay: ReplayPayload,
    pub config: RaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveEvent {
    pub step: usize,
    pub from_page: String,
    pub to_page: String,
    pub status: AgentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentFinishedEvent {
    pub result: AgentResult,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Every event an agent stream can carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceEvent {
    /// Connection established, possibly with a full history replay.
    Bootstrap(BootstrapEvent),
    /// The agent arrived on a new page.
    Move(MoveEvent),
    /// Pathfinding finished for a page the agent visited.
    PathResult(PathResult),
    /// The agent reached a terminal state.
    AgentFinished(AgentFinishedEvent),
    /// Advisory end-of-task marker.
    TaskFinished,
}

impl RaceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RaceEvent::Bootstrap(_) => "bootstrap",
            RaceEvent::Move(_) => "move",
            RaceEvent::PathResult(_) => "path_result",
            RaceEvent::AgentFinished(_) => "agent_finished",
            RaceEvent::TaskFinished => "task_finished",
        }
    }

    /// Parse a wire event. Deserialization and validation failures both
    /// surface as `MalformedEvent`.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();
        let event: RaceEvent =
            serde_json::from_value(value).map_err(|e| Error::malformed(kind, e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Check the fields serde cannot: non-empty titles, terminal results.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        match self {
            RaceEvent::Bootstrap(b) => {
                if b.config.start_page.trim().is_empty() || b.config.target_page.trim().is_empty() {
                    return Err(Error::malformed(kind, "config requires startPage and targetPage"));
                }
                for m in &b.replay.moves {
                    if m.to_page.trim().is_empty() {
                        return Err(Error::malformed(kind, format!("replay move {} has no toPage", m.step)));
                    }
                }
                for r in &b.replay.path_results {
                    validate_path_result(kind, r)?;
                }
            }
            RaceEvent::Move(m) => {
                if m.from_page.trim().is_empty() {
                    return Err(Error::malformed(kind, "fromPage is required"));
                }
                if m.to_page.trim().is_empty() {
                    return Err(Error::malformed(kind, "toPage is required"));
                }
                if m.step == 0 {
                    return Err(Error::malformed(kind, "step 0 is reserved for the start page"));
                }
            }
            RaceEvent::PathResult(r) => validate_path_result(kind, r)?,
            RaceEvent::AgentFinished(f) => {
                if !f.result.status.is_terminal() {
                    return Err(Error::malformed(
                        kind,
                        format!("result status {} is not terminal", f.result.status),
                    ));
                }
            }
            RaceEvent::TaskFinished => {}
        }
        Ok(())
    }
}

fn validate_path_result(kind: &str, r: &PathResult) -> Result<()> {
    if r.from_page.trim().is_empty() {
        return Err(Error::malformed(kind, "fromPage is required"));
    }
    if r.optimal_paths.iter().any(|p| p.is_empty()) {
        return Err(Error::malformed(kind, format!("empty optimal path for {}", r.from_page)));
    }
    Ok(())
}

/// Envelope used by replay files: an event tagged with its agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub event: RaceEvent,
}

impl AgentEvent {
    pub fn new(agent_id: impl Into<AgentId>, event: RaceEvent) -> Self {
        Self {
            agent_id: agent_id.into(),
            event,
        }
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let agent_id = value
            .get("agentId")
            .and_then(|a| a.as_str())
            .map(AgentId::from)
            .ok_or_else(|| Error::malformed("envelope", "agentId is required"))?;
        let event = RaceEvent::from_value(value)?;
        Ok(Self { agent_id, event })
    }
}
