//! Wikirace - replay and lay out multi-agent wiki races
//!
//! Glue between the task engine, the graph materializer and the orbital
//! layout: config loading and the JSONL replay driver used by the CLI.

pub mod config;
pub mod replay;

pub use config::{GraphConfig, ReplayConfig, WikiraceConfig};
pub use replay::{parse_lines, parse_replay, run_live, run_replay, ReplayFile, ReplaySummary, TaskHeader};
