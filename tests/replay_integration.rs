//! Integration tests: replay JSONL race files through engine, materializer and layout.

use std::io::Write;
use wikirace::config::WikiraceConfig;
use wikirace::replay::{self, Tally};
use wikirace_core::{AgentStatus, Side};
use wikirace_layout::LayoutState;

fn load_fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {name}: {e}"))
}

// ===========================================================================
// Parsing
// ===========================================================================

#[test]
fn fixture_parses_with_line_errors() {
    let file = replay::parse_lines(&load_fixture("science-race.jsonl")).unwrap();
    assert_eq!(file.header.start_page, "Start");
    assert_eq!(file.header.target_page, "Goal");
    assert_eq!(file.header.agents.len(), 2);
    assert_eq!(file.header.agents[0].display.icon.as_deref(), Some("a.png"));
    assert_eq!(file.events.len(), 18);

    let lines: Vec<usize> = file.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![11, 21]);
    assert!(file.errors[1].message.contains("move"));
}

#[test]
fn missing_header_is_an_error() {
    assert!(replay::parse_lines("").is_err());
    assert!(replay::parse_lines("\n\n").is_err());
    let err = replay::parse_lines(r#"{"type":"move","startPage":"A","targetPage":"B","agents":[]}"#).unwrap_err();
    assert!(err.to_string().contains("task header"));
}

#[test]
fn parse_replay_reads_from_disk() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    writeln!(tmp, r#"{{"type":"task","startPage":"A","targetPage":"D","agents":[{{"id":"a1","model":"m"}}]}}"#).unwrap();
    writeln!(tmp, r#"{{"agentId":"a1","type":"move","step":1,"fromPage":"A","toPage":"D","status":"won"}}"#).unwrap();
    let file = replay::parse_replay(tmp.path()).unwrap();
    assert_eq!(file.events.len(), 1);
    assert!(file.errors.is_empty());

    assert!(replay::parse_replay(&tmp.path().with_extension("missing")).is_err());
}

// ===========================================================================
// Synchronous replay
// ===========================================================================

#[test]
fn science_race_replays_to_completion() {
    let file = replay::parse_lines(&load_fixture("science-race.jsonl")).unwrap();
    let summary = replay::run_replay(&file, &WikiraceConfig::default(), false).unwrap();

    assert!(summary.complete);
    assert_eq!(summary.shortest_path_length, Some(3));
    assert_eq!(summary.current_page_index, 6);
    assert_eq!(
        summary.events,
        Tally {
            applied: 15,
            dropped: 2,
            advisory: 1,
            rejected: 0
        }
    );
    assert_eq!(summary.parse_errors, 2);

    let a1 = &summary.agents[0];
    assert_eq!(a1.side, Side::Left);
    assert_eq!(a1.status, AgentStatus::Won);
    assert_eq!(a1.moves, 3);
    assert_eq!(a1.last_page.as_deref(), Some("Goal"));
    assert_eq!(summary.agents[1].side, Side::Right);
    assert_eq!(summary.agents[1].moves, 6);

    assert_eq!(summary.graph.nodes, 8);
    assert_eq!(summary.graph.edges, 9);
    assert_eq!(summary.graph.multi_visit, 3);

    assert_eq!(summary.layout.state, LayoutState::Converged);
    assert_eq!(summary.layout.positions.len(), 8);
    assert!(summary.layout.positions.values().all(|p| p.is_finite()));
    assert!(summary.frames.is_none());
}

#[test]
fn frames_are_recorded_per_applied_event() {
    let file = replay::parse_lines(&load_fixture("science-race.jsonl")).unwrap();
    let summary = replay::run_replay(&file, &WikiraceConfig::default(), true).unwrap();
    let frames = summary.frames.unwrap();
    assert_eq!(frames.len(), 15);
    assert!(frames.windows(2).all(|w| w[0].tick <= w[1].tick));
}

#[test]
fn path_hints_add_hint_nodes() {
    let mut config = WikiraceConfig::default();
    config.graph.path_hints = true;
    let content = [
        r#"{"type":"task","startPage":"A","targetPage":"D","agents":[{"id":"a1","model":"m"}]}"#,
        r#"{"agentId":"a1","type":"move","step":1,"fromPage":"A","toPage":"B","status":"in_progress"}"#,
        r#"{"agentId":"a1","type":"path_result","fromPage":"B","optimalPaths":[["B","H","D"]],"optimalPathLength":2}"#,
    ]
    .join("\n");
    let file = replay::parse_lines(&content).unwrap();
    let summary = replay::run_replay(&file, &config, false).unwrap();
    assert!(!summary.complete);
    assert_eq!(summary.graph.nodes, 4);
    assert!(summary.layout.positions.contains_key("H"));
}

#[test]
fn summary_serializes_camel_case() {
    let file = replay::parse_lines(&load_fixture("science-race.jsonl")).unwrap();
    let summary = replay::run_replay(&file, &WikiraceConfig::default(), false).unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["currentPageIndex"], 6);
    assert_eq!(json["agents"][0]["lastPage"], "Goal");
    assert_eq!(json["agents"][1]["side"], "right");
    assert!(json.get("frames").is_none());
}

// ===========================================================================
// Live replay
// ===========================================================================

#[tokio::test]
async fn live_replay_settles_all_nodes() {
    let mut config = WikiraceConfig::default();
    config.layout.tick_interval_ms = 1;
    config.replay.ticks_per_event = 1;
    config.replay.settle_ticks = 3_000;

    let file = replay::parse_lines(&load_fixture("science-race.jsonl")).unwrap();
    let summary = replay::run_live(&file, &config, false).await.unwrap();
    assert!(summary.complete);
    assert_eq!(summary.events.applied, 15);
    assert_eq!(summary.layout.positions.len(), 8);
    assert!(summary.layout.positions.values().all(|p| p.is_finite()));
}

// ===========================================================================
// Config file
// ===========================================================================

#[test]
fn config_file_overrides_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    write!(tmp, "[replay]\nticks_per_event = 2\n\n[layout]\norbital_strength = 0.5\n").unwrap();
    let config = WikiraceConfig::load(tmp.path());
    assert_eq!(config.replay.ticks_per_event, 2);
    assert_eq!(config.replay.settle_ticks, 600);
    assert_eq!(config.layout.orbital_strength, 0.5);
}

#[test]
fn broken_config_file_falls_back() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    write!(tmp, "[layout\norbital_strength = ").unwrap();
    assert_eq!(WikiraceConfig::load(tmp.path()), WikiraceConfig::default());
}
