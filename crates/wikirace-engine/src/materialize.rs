//! Graph materializer: task snapshot + cutoff → deduplicated nodes and edges
//!
//! Pure: the same task and cutoff always give key-equal output.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use wikirace_core::{
    Agent, EdgeKind, GraphData, NavigationEdge, NodeVisit, PageNode, PageNodeKind, PageVisit, Task,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaterializeOptions {
    /// Project each agent's most recent optimal path as hint nodes/edges.
    pub path_hints: bool,
}

/// Materialize what the task's current view shows: everything in live mode,
/// up to `viewing_page_index` while stepping.
pub fn build_for_view(task: &Task, options: MaterializeOptions) -> GraphData {
    build(task, task.cutoff(), options)
}

/// Materialize every visit with `move_index <= cutoff` (all visits for `None`).
pub fn build(task: &Task, cutoff: Option<usize>, options: MaterializeOptions) -> GraphData {
    let mut builder = GraphBuilder::default();
    builder.upsert(PageNode::new(&task.start_page, PageNodeKind::Start, task.shortest_path_length));
    builder.upsert(PageNode::new(&task.target_page, PageNodeKind::Target, Some(0)));

    for agent in &task.agents {
        for visit in agent.sequence.visits().iter().filter(|v| within(cutoff, v.move_index)) {
            builder.add_visit(visit);
        }
    }

    if options.path_hints {
        for agent in &task.agents {
            builder.add_path_hint(agent, cutoff);
        }
    }

    GraphData {
        nodes: builder.nodes,
        edges: builder.edges,
        agent_sides: task.agent_sides(),
    }
}

fn within(cutoff: Option<usize>, move_index: usize) -> bool {
    cutoff.map_or(true, |c| move_index <= c)
}

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<PageNode>,
    index: HashMap<String, usize>,
    edges: Vec<NavigationEdge>,
    edge_ids: HashSet<String>,
}

impl GraphBuilder {
    /// Insert `node` if its title is new. Returns the node's position and
    /// whether it was inserted.
    fn upsert(&mut self, node: PageNode) -> (usize, bool) {
        if let Some(&i) = self.index.get(&node.page_title) {
            return (i, false);
        }
        let i = self.nodes.len();
        self.index.insert(node.page_title.clone(), i);
        self.nodes.push(node);
        (i, true)
    }

    fn add_visit(&mut self, visit: &PageVisit) {
        let (i, inserted) = self.upsert(PageNode::new(
            &visit.page_title,
            PageNodeKind::Visited,
            visit.distance_to_target,
        ));
        let node = &mut self.nodes[i];
        if !inserted {
            node.mark_visited();
            if node.distance_to_target.is_none() {
                node.distance_to_target = visit.distance_to_target;
            }
        }
        node.visits.push(NodeVisit {
            agent_id: visit.agent_id.clone(),
            move_index: visit.move_index,
            distance_change: visit.distance_change,
        });

        if let Some(from) = visit.visited_from_page.as_deref().filter(|f| !f.is_empty()) {
            self.add_edge(NavigationEdge {
                id: format!("move:{}:{}", visit.agent_id, visit.move_index),
                source_title: from.to_string(),
                target_title: visit.page_title.clone(),
                kind: EdgeKind::Move,
                agent_id: Some(visit.agent_id.clone()),
                move_index: Some(visit.move_index),
                distance_change: visit.distance_change,
            });
        }
    }

    fn add_path_hint(&mut self, agent: &Agent, cutoff: Option<usize>) {
        let latest = agent
            .sequence
            .visits()
            .iter()
            .rev()
            .filter(|v| within(cutoff, v.move_index))
            .find(|v| v.optimal_paths.first().is_some_and(|p| !p.is_empty()));
        let Some(path) = latest.and_then(|v| v.optimal_paths.first()) else {
            return;
        };

        let path_len = path.len();
        for (i, page) in path.iter().enumerate() {
            let remaining = (path_len - 1 - i) as u32;
            let (pos, _) = self.upsert(PageNode::new(page, PageNodeKind::PathHint, Some(remaining)));
            if i == 0 || self.nodes[pos].kind != PageNodeKind::PathHint {
                continue;
            }
            let from = &path[i - 1];
            self.add_edge(NavigationEdge {
                id: format!("hint:{}->{}", from, page),
                source_title: from.clone(),
                target_title: page.clone(),
                kind: EdgeKind::PathHint,
                agent_id: None,
                move_index: None,
                distance_change: Some(1),
            });
        }
    }

    fn add_edge(&mut self, edge: NavigationEdge) {
        if self.edge_ids.insert(edge.id.clone()) {
            self.edges.push(edge);
        }
    }
}
