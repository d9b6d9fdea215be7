//! Wikirace Layout - Incremental orbital force layout for race graphs
//!
//! Nodes settle on concentric bands around the target, one band per hop of
//! remaining distance. Nodes already placed keep their position and velocity
//! when the graph grows; new nodes spawn beside their graph parent on the
//! side assigned to their agent.

pub mod config;
pub mod forces;
pub mod geometry;
pub mod runner;
pub mod simulation;

pub use config::LayoutConfig;
pub use geometry::Vec2;
pub use runner::{LayoutHandle, LayoutRunner};
pub use simulation::{AnchorKind, LayoutEngine, LayoutNode, LayoutState, PositionFrame, UpdateSummary};
