//! JSONL race replay
//!
//! A replay file holds one task header line followed by agent-tagged events:
//!
//! ```text
//! {"type":"task","startPage":"A","targetPage":"D","agents":[{"id":"a1","model":"m"}]}
//! {"agentId":"a1","type":"move","step":1,"fromPage":"A","toPage":"B","status":"in_progress"}
//! ```
//!
//! Events are fed through the task engine; after each applied event the view
//! is re-materialized and handed to the layout.

use crate::config::WikiraceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};
use wikirace_core::{AgentEvent, AgentId, AgentSpec, AgentStatus, Error, GraphData, Result, Side, TaskSnapshot};
use wikirace_engine::{build_for_view, EventOutcome, MaterializeOptions, TaskEngine};
use wikirace_layout::{LayoutEngine, LayoutRunner, LayoutState, PositionFrame};

/// First line of a replay file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHeader {
    #[serde(rename = "type")]
    pub kind: String,
    pub start_page: String,
    pub target_page: String,
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ReplayFile {
    pub header: TaskHeader,
    pub events: Vec<AgentEvent>,
    pub errors: Vec<ParseError>,
}

pub fn parse_replay(path: &Path) -> Result<ReplayFile> {
    let content = fs::read_to_string(path)?;
    parse_lines(&content)
}

/// Parse replay text. A missing or invalid header fails the whole file; bad
/// event lines are collected in `errors` and skipped.
pub fn parse_lines(content: &str) -> Result<ReplayFile> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (_, first) = lines
        .next()
        .ok_or_else(|| Error::config("replay file has no task header"))?;
    let header: TaskHeader = serde_json::from_str(first)?;
    if header.kind != "task" {
        return Err(Error::config(format!("expected a task header, found type {:?}", header.kind)));
    }

    let mut events = Vec::new();
    let mut errors = Vec::new();
    for (line, text) in lines {
        let parsed = serde_json::from_str::<serde_json::Value>(text)
            .map_err(Error::from)
            .and_then(AgentEvent::from_value);
        match parsed {
            Ok(event) => events.push(event),
            Err(e) => errors.push(ParseError {
                line,
                message: e.to_string(),
            }),
        }
    }

    Ok(ReplayFile { header, events, errors })
}

/// Event counts by outcome.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Tally {
    pub applied: usize,
    pub dropped: usize,
    pub advisory: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: AgentId,
    pub side: Side,
    pub status: AgentStatus,
    pub moves: usize,
    pub last_page: Option<String>,
    pub distance_to_target: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub multi_visit: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub task_id: String,
    pub start_page: String,
    pub target_page: String,
    pub shortest_path_length: Option<u32>,
    pub current_page_index: usize,
    pub complete: bool,
    pub events: Tally,
    pub parse_errors: usize,
    pub agents: Vec<AgentSummary>,
    pub graph: GraphStats,
    pub layout: PositionFrame,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<PositionFrame>>,
}

/// Apply one event, logging rejects. Returns true when task state changed.
fn apply(engine: &mut TaskEngine, event: &AgentEvent, tally: &mut Tally) -> Result<bool> {
    match engine.handle_event(&event.agent_id, event.event.clone()) {
        Ok(EventOutcome::Applied) => {
            tally.applied += 1;
            Ok(true)
        }
        Ok(EventOutcome::Dropped(reason)) => {
            debug!(agent = %event.agent_id, ?reason, "event dropped");
            tally.dropped += 1;
            Ok(false)
        }
        Ok(EventOutcome::Advisory) => {
            tally.advisory += 1;
            Ok(false)
        }
        Err(e) if e.is_rejected_event() => {
            warn!(agent = %event.agent_id, error = %e, "event rejected");
            tally.rejected += 1;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn start_engine(file: &ReplayFile) -> Result<(TaskEngine, TaskSnapshot)> {
    let mut engine = TaskEngine::new();
    let snapshot = engine.create_task(
        file.header.agents.clone(),
        &file.header.start_page,
        &file.header.target_page,
    )?;
    for err in &file.errors {
        warn!(line = err.line, "skipping replay line: {}", err.message);
    }
    Ok((engine, snapshot))
}

fn view(engine: &TaskEngine, options: MaterializeOptions) -> Result<GraphData> {
    let task = engine.task().ok_or(Error::NoActiveTask)?;
    Ok(build_for_view(task, options))
}

/// Replay synchronously, driving layout ticks inline.
pub fn run_replay(file: &ReplayFile, config: &WikiraceConfig, record_frames: bool) -> Result<ReplaySummary> {
    let options = MaterializeOptions { path_hints: config.graph.path_hints };
    let (mut engine, _) = start_engine(file)?;
    let mut layout = LayoutEngine::new(config.layout.clone());
    let mut tally = Tally::default();
    let mut frames = record_frames.then(Vec::new);

    let mut graph = view(&engine, options)?;
    layout.update(&graph);

    for event in &file.events {
        if !apply(&mut engine, event, &mut tally)? {
            continue;
        }
        graph = view(&engine, options)?;
        layout.update(&graph);
        for _ in 0..config.replay.ticks_per_event {
            layout.tick();
        }
        if let Some(frames) = frames.as_mut() {
            frames.push(layout.positions());
        }
    }

    let mut settled = 0;
    while settled < config.replay.settle_ticks && layout.tick() {
        settled += 1;
    }
    info!(
        applied = tally.applied,
        settle_ticks = settled,
        state = ?layout.state(),
        "replay finished"
    );

    let snapshot = engine.snapshot().ok_or(Error::NoActiveTask)?;
    Ok(summarize(&snapshot, &graph, layout.positions(), tally, file.errors.len(), frames))
}

/// Replay against a background layout runner, pacing events by the tick
/// interval.
pub async fn run_live(file: &ReplayFile, config: &WikiraceConfig, record_frames: bool) -> Result<ReplaySummary> {
    let options = MaterializeOptions { path_hints: config.graph.path_hints };
    let (mut engine, _) = start_engine(file)?;
    let mut updates = engine.watch();
    let handle = LayoutRunner::start(config.layout.clone());
    let mut frame_rx = handle.subscribe();
    let mut tally = Tally::default();
    let mut frames = record_frames.then(Vec::new);

    let pace = live_pace(config);
    let mut graph = Arc::new(view(&engine, options)?);
    handle.submit(graph.clone());

    for event in &file.events {
        if !apply(&mut engine, event, &mut tally)? {
            continue;
        }
        let snapshot = match latest_snapshot(&mut updates) {
            Some(snapshot) => snapshot,
            None => engine.snapshot().ok_or(Error::NoActiveTask)?,
        };
        graph = Arc::new(build_for_view(&snapshot, options));
        handle.submit(graph.clone());
        tokio::time::sleep(pace).await;
        collect_frames(&mut frame_rx, frames.as_mut());
    }

    let settle = config.layout.tick_interval() * config.replay.settle_ticks;
    let deadline = tokio::time::Instant::now() + settle;
    loop {
        match tokio::time::timeout_at(deadline, frame_rx.recv()).await {
            Ok(Ok(frame)) => {
                let done = frame.state == LayoutState::Converged && frame.positions.len() == graph.nodes.len();
                if let Some(frames) = frames.as_mut() {
                    frames.push(frame);
                }
                if done {
                    break;
                }
            }
            Ok(Err(RecvError::Lagged(skipped))) => {
                debug!(skipped, "frame receiver lagged");
            }
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }

    handle.stop();
    let last = handle.join().await.ok_or_else(|| Error::config("layout runner did not shut down cleanly"))?;
    info!(applied = tally.applied, state = ?last.state, "live replay finished");

    let snapshot = engine.snapshot().ok_or(Error::NoActiveTask)?;
    Ok(summarize(&snapshot, &graph, last, tally, file.errors.len(), frames))
}

/// Newest snapshot the engine has published since the last call.
fn latest_snapshot(rx: &mut broadcast::Receiver<TaskSnapshot>) -> Option<TaskSnapshot> {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(snapshot) => latest = Some(snapshot),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return latest,
        }
    }
}

fn collect_frames(rx: &mut broadcast::Receiver<PositionFrame>, sink: Option<&mut Vec<PositionFrame>>) {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(frame) => latest = Some(frame),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    if let (Some(sink), Some(frame)) = (sink, latest) {
        sink.push(frame);
    }
}

fn summarize(
    task: &TaskSnapshot,
    graph: &GraphData,
    layout: PositionFrame,
    events: Tally,
    parse_errors: usize,
    frames: Option<Vec<PositionFrame>>,
) -> ReplaySummary {
    let agents = task
        .agents
        .iter()
        .map(|agent| {
            let last = agent.sequence.last();
            AgentSummary {
                id: agent.id.clone(),
                side: agent.side,
                status: agent.sequence.status,
                moves: agent.sequence.len().saturating_sub(1),
                last_page: last.map(|v| v.page_title.clone()),
                distance_to_target: last.and_then(|v| v.distance_to_target),
            }
        })
        .collect();

    ReplaySummary {
        task_id: task.id.to_string(),
        start_page: task.start_page.clone(),
        target_page: task.target_page.clone(),
        shortest_path_length: task.shortest_path_length,
        current_page_index: task.current_page_index,
        complete: task.is_complete(),
        events,
        parse_errors,
        agents,
        graph: GraphStats {
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
            multi_visit: graph.nodes.iter().filter(|n| n.is_multi_visit()).count(),
        },
        layout,
        frames,
    }
}

/// Pause between live events; exposed for callers that pace their own feeds.
pub fn live_pace(config: &WikiraceConfig) -> Duration {
    config.layout.tick_interval() * config.replay.ticks_per_event.max(1)
}
