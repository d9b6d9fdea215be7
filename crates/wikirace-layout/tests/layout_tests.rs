//! Tests for wikirace-layout: incremental updates, force integration, tick runner

use std::sync::Arc;
use std::time::Duration;
use wikirace_core::*;
use wikirace_layout::*;

fn page(title: &str, kind: PageNodeKind, distance: Option<u32>, visits: &[(&str, usize)]) -> PageNode {
    let mut node = PageNode::new(title, kind, distance);
    node.visits = visits
        .iter()
        .map(|(agent, index)| NodeVisit { agent_id: (*agent).into(), move_index: *index, distance_change: None })
        .collect();
    node
}

fn edge(agent: &str, index: usize, from: &str, to: &str, change: Option<i64>) -> NavigationEdge {
    NavigationEdge {
        id: format!("move:{agent}:{index}"),
        source_title: from.to_string(),
        target_title: to.to_string(),
        kind: EdgeKind::Move,
        agent_id: Some(agent.into()),
        move_index: Some(index),
        distance_change: change,
    }
}

fn graph(nodes: Vec<PageNode>, edges: Vec<NavigationEdge>, sides: &[(&str, Side)]) -> GraphData {
    GraphData {
        nodes,
        edges,
        agent_sides: sides.iter().map(|(a, s)| ((*a).into(), *s)).collect(),
    }
}

fn anchors(shortest: Option<u32>) -> Vec<PageNode> {
    vec![
        page("A", PageNodeKind::Start, shortest, &[("a1", 0)]),
        page("D", PageNodeKind::Target, Some(0), &[]),
    ]
}

/// A → B, shortest path 2.
fn one_move() -> GraphData {
    let mut nodes = anchors(Some(2));
    nodes.push(page("B", PageNodeKind::Visited, Some(1), &[("a1", 1)]));
    graph(nodes, vec![edge("a1", 1, "A", "B", Some(1))], &[("a1", Side::Left)])
}

fn run_to_rest(engine: &mut LayoutEngine) -> usize {
    let mut ticks = 0;
    while engine.tick() {
        ticks += 1;
        assert!(ticks < 5_000, "layout never converged");
    }
    ticks
}

fn side_of_axis(engine: &LayoutEngine, key: &str) -> f64 {
    let start = engine.anchor(AnchorKind::Start);
    let target = engine.anchor(AnchorKind::Target);
    let pos = engine.node(key).unwrap().pos;
    let axis = start - target;
    axis.x * (pos.y - target.y) - axis.y * (pos.x - target.x)
}

// ===========================================================================
// Degenerate graphs
// ===========================================================================

#[test]
fn empty_graph_stays_idle() {
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    let summary = engine.update(&GraphData::default());
    assert_eq!(summary, UpdateSummary::default());
    assert_eq!(engine.state(), LayoutState::Idle);
    assert!(!engine.tick());
    assert!(engine.positions().positions.is_empty());
}

#[test]
fn anchors_only_graph_is_pinned() {
    let config = LayoutConfig::default();
    let mut engine = LayoutEngine::new(config.clone());
    let summary = engine.update(&graph(anchors(None), vec![], &[("a1", Side::Left)]));
    assert_eq!(summary.added, 2);
    assert_eq!(engine.state(), LayoutState::Simulating);

    run_to_rest(&mut engine);
    assert_eq!(engine.state(), LayoutState::Converged);
    let frame = engine.positions();
    assert_eq!(frame.positions["A"], config.start_anchor);
    assert_eq!(frame.positions["D"], config.target_anchor);
}

#[test]
fn zero_shortest_path_stays_finite() {
    let mut nodes = anchors(Some(0));
    nodes.push(page("B", PageNodeKind::Visited, Some(1), &[("a1", 1)]));
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    engine.update(&graph(nodes, vec![edge("a1", 1, "A", "B", Some(-1))], &[("a1", Side::Left)]));

    assert!(engine.spacing().is_finite() && engine.spacing() > 0.0);
    for _ in 0..500 {
        engine.tick();
    }
    assert!(engine.nodes().all(|n| n.pos.is_finite() && n.vel.is_finite()));
}

#[test]
fn coincident_anchors_stay_finite() {
    let config = LayoutConfig { start_anchor: Vec2::ZERO, target_anchor: Vec2::ZERO, ..LayoutConfig::default() };
    let mut engine = LayoutEngine::new(config);
    engine.update(&one_move());
    assert!(engine.spacing() > 0.0);
    for _ in 0..200 {
        engine.tick();
    }
    assert!(engine.nodes().all(|n| n.pos.is_finite()));
}

// ===========================================================================
// Incremental updates
// ===========================================================================

#[test]
fn existing_nodes_keep_position_and_velocity() {
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    let first = one_move();
    engine.update(&first);
    for _ in 0..20 {
        engine.tick();
    }
    let before = engine.node("B").unwrap().clone();

    let mut grown = first.clone();
    grown.nodes.push(page("C", PageNodeKind::Visited, Some(1), &[("a1", 2)]));
    grown.edges.push(edge("a1", 2, "B", "C", Some(0)));
    let summary = engine.update(&grown);

    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 0);
    assert_eq!(summary.links, 2);
    let after = engine.node("B").unwrap();
    assert_eq!(after.pos, before.pos);
    assert_eq!(after.vel, before.vel);
}

#[test]
fn new_node_spawns_beside_parent() {
    let config = LayoutConfig::default();
    let mut engine = LayoutEngine::new(config.clone());
    engine.update(&one_move());
    let b = engine.node("B").unwrap().pos;
    assert!((b.distance(config.start_anchor) - config.spawn_step).abs() < 1e-9);
}

#[test]
fn agents_fan_out_to_opposite_sides() {
    let nodes = vec![
        page("A", PageNodeKind::Start, Some(2), &[("a1", 0), ("a2", 0)]),
        page("D", PageNodeKind::Target, Some(0), &[]),
        page("L", PageNodeKind::Visited, None, &[("a1", 1)]),
        page("R", PageNodeKind::Visited, None, &[("a2", 1)]),
    ];
    let edges = vec![edge("a1", 1, "A", "L", None), edge("a2", 1, "A", "R", None)];
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    engine.update(&graph(nodes, edges, &[("a1", Side::Left), ("a2", Side::Right)]));

    assert!(side_of_axis(&engine, "L") > 0.0);
    assert!(side_of_axis(&engine, "R") < 0.0);
    assert_ne!(engine.node("L").unwrap().pos, engine.node("R").unwrap().pos);
}

#[test]
fn vanished_nodes_are_dropped() {
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    engine.update(&one_move());
    let summary = engine.update(&graph(anchors(Some(2)), vec![], &[("a1", Side::Left)]));
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.links, 0);
    assert!(engine.node("B").is_none());
    assert!(engine.node("A").is_some());
}

#[test]
fn orphan_spawns_at_fallback_and_ignores_orbit() {
    let config = LayoutConfig::default();
    let mut nodes = anchors(Some(2));
    nodes.push(page("Lost", PageNodeKind::PathHint, None, &[]));
    let mut engine = LayoutEngine::new(config.clone());
    engine.update(&graph(nodes, vec![], &[]));

    assert_eq!(engine.node("Lost").unwrap().pos, config.fallback_spawn);
    run_to_rest(&mut engine);
    assert_eq!(engine.node("Lost").unwrap().pos, config.fallback_spawn);
}

// ===========================================================================
// Convergence
// ===========================================================================

#[test]
fn layout_converges_onto_orbit() {
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    engine.update(&one_move());
    assert!((engine.spacing() - 200.0).abs() < 1e-9);

    let ticks = run_to_rest(&mut engine);
    assert!(ticks > 0);
    assert_eq!(engine.state(), LayoutState::Converged);
    let radius = engine.node("B").unwrap().pos.distance(engine.anchor(AnchorKind::Target));
    assert!((radius - 200.0).abs() < 20.0, "radius {radius}");
}

#[test]
fn unchanged_graph_does_not_reheat() {
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    let g = one_move();
    engine.update(&g);
    run_to_rest(&mut engine);

    engine.update(&g);
    assert_eq!(engine.state(), LayoutState::Converged);
    assert!(!engine.tick());
}

#[test]
fn new_node_reheats_converged_layout() {
    let config = LayoutConfig::default();
    let mut engine = LayoutEngine::new(config.clone());
    let mut g = one_move();
    engine.update(&g);
    run_to_rest(&mut engine);

    g.nodes.push(page("C", PageNodeKind::Visited, Some(1), &[("a1", 2)]));
    g.edges.push(edge("a1", 2, "B", "C", Some(0)));
    engine.update(&g);
    assert_eq!(engine.state(), LayoutState::Simulating);
    assert!(engine.alpha() >= config.reheat_alpha);
}

#[test]
fn distance_arriving_later_pulls_node_onto_its_orbit() {
    let config = LayoutConfig::default();
    let mut engine = LayoutEngine::new(config.clone());
    let mut g = one_move();
    g.nodes[2].distance_to_target = None;
    engine.update(&g);
    run_to_rest(&mut engine);

    let target = engine.anchor(AnchorKind::Target);
    // One hop from the target.
    let desired = engine.spacing();
    let before = engine.node("B").unwrap().clone();
    let error_before = (before.pos.distance(target) - desired).abs();
    assert!(error_before > 100.0, "B already near its orbit: {error_before}");

    // Same nodes and edges; only the distance is filled in.
    g.nodes[2].distance_to_target = Some(1);
    let summary = engine.update(&g);
    assert!(!summary.topology_changed());
    assert_eq!(engine.state(), LayoutState::Simulating);
    assert!(engine.alpha() >= config.reheat_alpha);
    let alpha = engine.alpha();

    // The first tick is an ordinary force step: no jump to the orbit.
    assert!(engine.tick());
    let moved = engine.node("B").unwrap().pos.distance(before.pos);
    let damping = 1.0 - config.velocity_decay;
    let max_step = (before.vel.length() + config.max_force * 2f64.sqrt() * alpha) * damping;
    let orbital_step = (before.vel.length() + 2.0 * error_before * config.orbital_strength * alpha) * damping;
    assert!(moved > 0.0);
    assert!(moved <= max_step, "moved {moved}, max {max_step}");
    assert!(moved <= orbital_step, "moved {moved}, orbital {orbital_step}");

    run_to_rest(&mut engine);
    let error_after = (engine.node("B").unwrap().pos.distance(target) - desired).abs();
    assert!(error_after < error_before / 4.0, "error {error_before} -> {error_after}");
}

#[test]
fn radius_grows_with_visits_up_to_cap() {
    let config = LayoutConfig::default();
    let mut nodes = anchors(Some(2));
    nodes.push(page("Once", PageNodeKind::Visited, Some(1), &[("a1", 1)]));
    nodes.push(page("Thrice", PageNodeKind::Visited, Some(1), &[("a1", 2), ("a2", 1), ("a1", 4)]));
    let many: Vec<(&str, usize)> = (1..=12).map(|i| ("a1", i)).collect();
    nodes.push(page("Hub", PageNodeKind::Visited, Some(1), &many));
    let mut engine = LayoutEngine::new(config.clone());
    engine.update(&graph(nodes, vec![], &[("a1", Side::Left), ("a2", Side::Right)]));

    let once = engine.node("Once").unwrap().radius;
    let thrice = engine.node("Thrice").unwrap().radius;
    let hub = engine.node("Hub").unwrap().radius;
    assert_eq!(once, config.base_radius);
    assert!(thrice > once);
    assert!(thrice <= config.max_radius);
    assert_eq!(hub, config.max_radius);
}

#[test]
fn multi_visit_endpoint_weakens_link() {
    let mut nodes = anchors(Some(2));
    nodes.push(page("Solo", PageNodeKind::Visited, Some(1), &[("a1", 1)]));
    nodes.push(page("Shared", PageNodeKind::Visited, Some(1), &[("a1", 2), ("a2", 1)]));
    let edges = vec![
        edge("a1", 1, "A", "Solo", Some(1)),
        edge("a1", 2, "Solo", "Shared", Some(0)),
        edge("a2", 1, "A", "Shared", Some(1)),
    ];
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    engine.update(&graph(nodes, edges, &[("a1", Side::Left), ("a2", Side::Right)]));

    let solo = engine.link_strength("A", "Solo").unwrap();
    let shared = engine.link_strength("A", "Shared").unwrap();
    assert!(shared < solo, "shared {shared} vs solo {solo}");
    // A lateral move into a shared page is weakened too.
    let lateral = engine.link_strength("Solo", "Shared").unwrap();
    assert!(lateral < LayoutConfig::default().lateral_link_strength);
    assert!(engine.link_strength("Shared", "A").is_none());
}

#[test]
fn moving_an_anchor_rescales_orbits() {
    let mut engine = LayoutEngine::new(LayoutConfig::default());
    engine.update(&one_move());
    run_to_rest(&mut engine);

    engine.move_anchor(AnchorKind::Start, Vec2::new(-800.0, 0.0));
    assert_eq!(engine.state(), LayoutState::Simulating);
    assert!((engine.spacing() - 400.0).abs() < 1e-9);
    assert_eq!(engine.node("A").unwrap().pos, Vec2::new(-800.0, 0.0));
}

#[test]
fn reset_returns_to_idle() {
    let config = LayoutConfig::default();
    let mut engine = LayoutEngine::new(config.clone());
    engine.update(&one_move());
    engine.move_anchor(AnchorKind::Target, Vec2::new(50.0, 50.0));
    engine.tick();

    engine.reset();
    assert_eq!(engine.state(), LayoutState::Idle);
    assert!(engine.is_empty());
    assert_eq!(engine.tick_count(), 0);
    assert_eq!(engine.anchor(AnchorKind::Target), config.target_anchor);
}

// ===========================================================================
// Materializer → layout
// ===========================================================================

#[test]
fn race_graph_flows_into_layout() {
    use wikirace_engine::{build_for_view, MaterializeOptions, TaskEngine};

    let mut tasks = TaskEngine::new();
    tasks
        .create_task(vec![AgentSpec::new("a1", "m"), AgentSpec::new("a2", "m")], "Start", "Goal")
        .unwrap();
    let mv = |step: usize, from: &str, to: &str| {
        RaceEvent::Move(MoveEvent {
            step,
            from_page: from.to_string(),
            to_page: to.to_string(),
            status: AgentStatus::InProgress,
        })
    };
    tasks.handle_event(&"a1".into(), mv(1, "Start", "B")).unwrap();
    tasks.handle_event(&"a2".into(), mv(1, "Start", "P")).unwrap();

    let mut layout = LayoutEngine::new(LayoutConfig::default());
    let graph = build_for_view(tasks.task().unwrap(), MaterializeOptions::default());
    assert_eq!(layout.update(&graph).added, 4);
    for _ in 0..30 {
        layout.tick();
    }
    let b = layout.node("B").unwrap().pos;

    tasks.handle_event(&"a1".into(), mv(2, "B", "Science")).unwrap();
    let graph = build_for_view(tasks.task().unwrap(), MaterializeOptions::default());
    let summary = layout.update(&graph);
    assert_eq!(summary.added, 1);
    assert_eq!(layout.node("B").unwrap().pos, b);
    assert_eq!(layout.positions().positions.len(), 5);
}

// ===========================================================================
// Runner
// ===========================================================================

fn fast_config() -> LayoutConfig {
    LayoutConfig { tick_interval_ms: 1, ..LayoutConfig::default() }
}

#[tokio::test]
async fn runner_publishes_frames_for_submitted_graph() {
    let handle = LayoutRunner::start(fast_config());
    let mut frames = handle.subscribe();
    handle.submit(Arc::new(one_move()));

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("no frame in time")
        .expect("channel closed");
    assert!(frame.positions.contains_key("B"));

    handle.stop();
    let last = handle.join().await.unwrap();
    assert_eq!(last.positions.len(), 3);
}

#[tokio::test]
async fn runner_stop_is_idempotent() {
    let handle = LayoutRunner::start(fast_config());
    handle.stop();
    handle.stop();
    assert!(handle.is_stopped());
    let last = handle.join().await.unwrap();
    assert!(last.positions.is_empty());
    assert_eq!(last.state, LayoutState::Idle);

    // A fresh runner starts from the configured anchors again.
    let handle = LayoutRunner::start(fast_config());
    handle.submit(Arc::new(one_move()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();
    let last = handle.join().await.unwrap();
    assert_eq!(last.positions["A"], LayoutConfig::default().start_anchor);
}
