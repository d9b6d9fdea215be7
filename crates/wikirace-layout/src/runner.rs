//! Background tick loop driving a [`LayoutEngine`] on a tokio interval.

use crate::config::LayoutConfig;
use crate::simulation::{LayoutEngine, PositionFrame};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wikirace_core::GraphData;

const FRAME_CAPACITY: usize = 64;

pub struct LayoutRunner;

impl LayoutRunner {
    /// Spawn the tick loop. Must be called inside a tokio runtime.
    pub fn start(config: LayoutConfig) -> LayoutHandle {
        let (graph_tx, graph_rx) = watch::channel(None);
        let (frame_tx, _) = broadcast::channel(FRAME_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(LayoutEngine::new(config), graph_rx, frame_tx.clone(), cancel.clone()));
        LayoutHandle { graph_tx, frame_tx, cancel, task }
    }
}

/// Owner-side handle to a running layout loop.
pub struct LayoutHandle {
    graph_tx: watch::Sender<Option<Arc<GraphData>>>,
    frame_tx: broadcast::Sender<PositionFrame>,
    cancel: CancellationToken,
    task: JoinHandle<PositionFrame>,
}

impl LayoutHandle {
    /// Replace the pending graph; applied at the start of the next tick.
    pub fn submit(&self, graph: Arc<GraphData>) {
        self.graph_tx.send_replace(Some(graph));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PositionFrame> {
        self.frame_tx.subscribe()
    }

    /// Ask the loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the loop to exit and return its last frame.
    pub async fn join(self) -> Option<PositionFrame> {
        match self.task.await {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "layout runner task failed");
                None
            }
        }
    }
}

async fn run(
    mut engine: LayoutEngine,
    mut graphs: watch::Receiver<Option<Arc<GraphData>>>,
    frames: broadcast::Sender<PositionFrame>,
    cancel: CancellationToken,
) -> PositionFrame {
    let mut interval = tokio::time::interval(engine.config().tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = engine.config().tick_interval_ms, "layout runner started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let mut updated = false;
                // Handle dropped without stop()
                let Ok(changed) = graphs.has_changed() else { break };
                if changed {
                    let latest = graphs.borrow_and_update().clone();
                    if let Some(graph) = latest {
                        let summary = engine.update(&graph);
                        debug!(added = summary.added, removed = summary.removed, "graph applied");
                        updated = true;
                    }
                }
                if engine.tick() || updated {
                    // No receivers is fine
                    let _ = frames.send(engine.positions());
                }
            }
        }
    }

    info!(ticks = engine.tick_count(), state = ?engine.state(), "layout runner stopped");
    engine.positions()
}
