//! Task engine — merges per-agent event streams into one task model
//!
//! Every mutator runs to completion before returning and then publishes an
//! immutable snapshot: synchronously to registered callbacks and through a
//! broadcast channel for async consumers.
//!
//! Event handling order:
//!   1. validate the event (malformed → `Err`, nothing mutated)
//!   2. resolve task and agent (missing → logged, `Dropped`)
//!   3. mutate the agent's sequence
//!   4. recompute progress, publish

use crate::subscribers::{SubscriberList, SubscriptionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use wikirace_core::{
    AgentFinishedEvent, AgentId, AgentSequence, AgentSpec, AgentStatus, BootstrapEvent, Error,
    MoveEvent, PathResult, RaceEvent, Result, Task, TaskSnapshot,
};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

/// What happened to an event that was not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// State changed and subscribers were notified.
    Applied,
    /// Event was well-formed but could not be applied.
    Dropped(DropReason),
    /// Informational event; nothing changed.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NoActiveTask,
    UnknownAgent(AgentId),
    /// Duplicate or late delivery of a move the sequence already passed.
    StaleMove { step: usize, last: usize },
    /// A move past `last + 1`; the missing steps never arrived.
    StepGap { step: usize, expected: usize },
}

pub struct TaskEngine {
    task: Option<Task>,
    /// Pathfinding results per agent and page, kept so a move that arrives
    /// after its page's result still picks up the distance.
    path_cache: HashMap<AgentId, HashMap<String, PathResult>>,
    subscribers: SubscriberList,
    snapshot_tx: broadcast::Sender<TaskSnapshot>,
}

impl Default for TaskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskEngine {
    pub fn new() -> Self {
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            task: None,
            path_cache: HashMap::new(),
            subscribers: SubscriberList::new(),
            snapshot_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Async view of the same snapshots callbacks receive.
    pub fn watch(&self) -> broadcast::Receiver<TaskSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn snapshot(&self) -> Option<TaskSnapshot> {
        self.task.as_ref().map(|t| Arc::new(t.clone()))
    }

    pub fn is_complete(&self) -> bool {
        self.task.as_ref().is_some_and(Task::is_complete)
    }

    pub fn can_step_forward(&self) -> bool {
        self.task.as_ref().is_some_and(Task::can_step_forward)
    }

    pub fn can_step_backward(&self) -> bool {
        self.task.as_ref().is_some_and(Task::can_step_backward)
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Replace any current task with a fresh one. On error the previous task
    /// is left untouched.
    pub fn create_task(
        &mut self,
        agents: Vec<AgentSpec>,
        start_page: &str,
        target_page: &str,
    ) -> Result<TaskSnapshot> {
        if agents.is_empty() {
            return Err(Error::config("a task needs at least one agent"));
        }
        if start_page.trim().is_empty() || target_page.trim().is_empty() {
            return Err(Error::config("start and target pages are required"));
        }
        let mut seen = std::collections::HashSet::new();
        for spec in &agents {
            if !seen.insert(spec.id.clone()) {
                return Err(Error::config(format!("duplicate agent id: {}", spec.id)));
            }
        }

        let task = Task::new(agents, start_page, target_page);
        info!(
            "Task {} created: {} → {} with {} agents",
            task.id,
            start_page,
            target_page,
            task.agents.len()
        );
        let snapshot = Arc::new(task.clone());
        self.task = Some(task);
        self.path_cache.clear();
        self.publish(&snapshot);
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Parse a raw wire event and apply it.
    pub fn handle_json(&mut self, agent_id: &AgentId, value: serde_json::Value) -> Result<EventOutcome> {
        let event = RaceEvent::from_value(value)?;
        self.handle_event(agent_id, event)
    }

    pub fn handle_event(&mut self, agent_id: &AgentId, event: RaceEvent) -> Result<EventOutcome> {
        event.validate()?;

        let Some(task) = self.task.as_mut() else {
            warn!("Dropping {} event for {}: no active task", event.kind(), agent_id);
            return Ok(EventOutcome::Dropped(DropReason::NoActiveTask));
        };
        if task.agent(agent_id).is_none() {
            warn!("Dropping {} event: {}", event.kind(), Error::UnknownAgent(agent_id.clone()));
            return Ok(EventOutcome::Dropped(DropReason::UnknownAgent(agent_id.clone())));
        }

        debug!("Applying {} event for {}", event.kind(), agent_id);
        let cache = self.path_cache.entry(agent_id.clone()).or_default();
        let outcome = match event {
            RaceEvent::Bootstrap(b) => apply_bootstrap(task, cache, agent_id, b),
            RaceEvent::Move(m) => apply_move(task, cache, agent_id, m),
            RaceEvent::PathResult(r) => apply_path_result(task, cache, agent_id, r),
            RaceEvent::AgentFinished(f) => apply_agent_finished(task, agent_id, f),
            RaceEvent::TaskFinished => {
                info!(
                    "Task {} reported finished by {} (complete: {})",
                    task.id,
                    agent_id,
                    task.is_complete()
                );
                EventOutcome::Advisory
            }
        };

        if outcome == EventOutcome::Applied {
            task.recompute_progress();
            self.publish_current();
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn step_forward(&mut self) -> bool {
        self.navigate(Task::step_forward)
    }

    pub fn step_backward(&mut self) -> bool {
        self.navigate(Task::step_backward)
    }

    pub fn set_viewing_index(&mut self, index: usize) {
        self.navigate(|t| {
            t.set_viewing_index(index);
            true
        });
    }

    pub fn enter_live_mode(&mut self) {
        self.navigate(|t| {
            t.enter_live_mode();
            true
        });
    }

    fn navigate(&mut self, op: impl FnOnce(&mut Task) -> bool) -> bool {
        let Some(task) = self.task.as_mut() else {
            return false;
        };
        if !op(task) {
            return false;
        }
        self.publish_current();
        true
    }

    fn publish_current(&self) {
        if let Some(snapshot) = self.snapshot() {
            self.publish(&snapshot);
        }
    }

    fn publish(&self, snapshot: &TaskSnapshot) {
        let failed = self.subscribers.notify(snapshot);
        if failed > 0 {
            warn!("{} of {} subscribers failed", failed, self.subscribers.len());
        }
        // No receivers is fine.
        let _ = self.snapshot_tx.send(snapshot.clone());
    }
}

// ---------------------------------------------------------------------------
// Event handlers
// ---------------------------------------------------------------------------

fn record_shortest_path(task: &mut Task, result: &PathResult) {
    if task.shortest_path_length.is_none() && result.from_page == task.start_page {
        task.shortest_path_length = Some(result.optimal_path_length);
        info!("Shortest path {} → {}: {} hops", task.start_page, task.target_page, result.optimal_path_length);
    }
}

fn apply_bootstrap(
    task: &mut Task,
    cache: &mut HashMap<String, PathResult>,
    agent_id: &AgentId,
    bootstrap: BootstrapEvent,
) -> EventOutcome {
    if bootstrap.config.start_page != task.start_page || bootstrap.config.target_page != task.target_page {
        warn!(
            "Bootstrap for {} names {} → {}, task is {} → {}; keeping task pages",
            agent_id,
            bootstrap.config.start_page,
            bootstrap.config.target_page,
            task.start_page,
            task.target_page
        );
    }
    let start_page = task.start_page.clone();
    let target_page = task.target_page.clone();
    let replay = bootstrap.replay;
    for result in &replay.path_results {
        cache.insert(result.from_page.clone(), result.clone());
    }

    let Some(agent) = task.agent_mut(agent_id) else {
        return EventOutcome::Dropped(DropReason::UnknownAgent(agent_id.clone()));
    };

    let mut moves = replay.moves;
    moves.sort_by_key(|m| m.step);
    let mut rebuilt = AgentSequence::new(agent_id, &start_page, &target_page);
    for m in moves {
        let step = m.step;
        let expected = rebuilt.last_move_index() + 1;
        if step > expected {
            warn!("Replay for {} jumps to step {} (expected {}); truncating", agent_id, step, expected);
            break;
        }
        if !rebuilt.push_move(agent_id, step, m.from_page, &m.to_page, &target_page) {
            debug!("Replay for {} skips non-increasing step {}", agent_id, step);
        }
    }

    // Sequences are append-only: a replay shorter than what we already hold
    // only contributes its path results.
    if rebuilt.len() >= agent.sequence.len() {
        rebuilt.status = agent.sequence.status;
        agent.sequence = rebuilt;
    } else {
        warn!(
            "Replay for {} has {} visits, already holding {}; keeping live sequence",
            agent_id,
            rebuilt.len(),
            agent.sequence.len()
        );
    }

    let sequence = &mut agent.sequence;
    for result in cache.values() {
        sequence.apply_path_result(&result.from_page, &result.optimal_paths, result.optimal_path_length);
    }
    sequence.recompute_distance_changes();
    if sequence.len() > 1 && sequence.status == AgentStatus::NotStarted {
        sequence.status = AgentStatus::InProgress;
    }
    info!("Rebuilt {} from replay: {} visits", agent_id, sequence.len());

    for result in &replay.path_results {
        record_shortest_path(task, result);
    }
    EventOutcome::Applied
}

fn apply_move(
    task: &mut Task,
    cache: &HashMap<String, PathResult>,
    agent_id: &AgentId,
    m: MoveEvent,
) -> EventOutcome {
    let target_page = task.target_page.clone();
    let Some(agent) = task.agent_mut(agent_id) else {
        return EventOutcome::Dropped(DropReason::UnknownAgent(agent_id.clone()));
    };
    let sequence = &mut agent.sequence;
    let last = sequence.last_move_index();
    if m.step > last + 1 {
        warn!("Dropping move {} for {}: expected step {}", m.step, agent_id, last + 1);
        return EventOutcome::Dropped(DropReason::StepGap { step: m.step, expected: last + 1 });
    }
    if !sequence.push_move(agent_id, m.step, Some(m.from_page), &m.to_page, &target_page) {
        warn!("Dropping stale move {} for {} (last {})", m.step, agent_id, last);
        return EventOutcome::Dropped(DropReason::StaleMove { step: m.step, last });
    }
    if let Some(known) = cache.get(&m.to_page) {
        sequence.apply_path_result(&known.from_page, &known.optimal_paths, known.optimal_path_length);
        sequence.recompute_distance_changes();
    }
    if !sequence.status.is_terminal() {
        sequence.status = m.status;
    }
    debug!("{} moved to {} (step {})", agent_id, m.to_page, m.step);
    EventOutcome::Applied
}

fn apply_path_result(
    task: &mut Task,
    cache: &mut HashMap<String, PathResult>,
    agent_id: &AgentId,
    result: PathResult,
) -> EventOutcome {
    let Some(agent) = task.agent_mut(agent_id) else {
        return EventOutcome::Dropped(DropReason::UnknownAgent(agent_id.clone()));
    };
    let updated = agent
        .sequence
        .apply_path_result(&result.from_page, &result.optimal_paths, result.optimal_path_length);
    if updated > 0 {
        agent.sequence.recompute_distance_changes();
    } else {
        debug!("Path result for {} arrived before {} visited it", result.from_page, agent_id);
    }
    record_shortest_path(task, &result);
    cache.insert(result.from_page.clone(), result);
    EventOutcome::Applied
}

fn apply_agent_finished(task: &mut Task, agent_id: &AgentId, finished: AgentFinishedEvent) -> EventOutcome {
    let Some(agent) = task.agent_mut(agent_id) else {
        return EventOutcome::Dropped(DropReason::UnknownAgent(agent_id.clone()));
    };
    if agent.result.is_some() {
        warn!("{} reported a second result; keeping the latest", agent_id);
    }
    agent.sequence.status = finished.result.status;
    info!("{} finished: {} in {} steps", agent_id, finished.result.status, finished.result.steps);
    agent.result = Some(finished.result);
    EventOutcome::Applied
}
