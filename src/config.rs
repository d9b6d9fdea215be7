//! Wikirace configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists or it fails to parse.

use serde::{Deserialize, Serialize};
use std::path::Path;
use wikirace_layout::LayoutConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WikiraceConfig {
    /// Force-layout tuning.
    pub layout: LayoutConfig,
    /// Graph materialization options.
    pub graph: GraphConfig,
    /// Replay pacing.
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Overlay each agent's latest optimal path as hint nodes.
    pub path_hints: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Layout ticks run after each applied event.
    pub ticks_per_event: u32,
    /// Upper bound on ticks spent settling after the last event.
    pub settle_ticks: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            ticks_per_event: 5,
            settle_ticks: 600,
        }
    }
}

impl WikiraceConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
