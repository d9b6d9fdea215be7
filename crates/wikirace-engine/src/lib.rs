//! Wikirace Engine - Merges per-agent event streams into one task model
//! and materializes the graph a renderer draws.

pub mod engine;
pub mod materialize;
pub mod subscribers;

pub use engine::{DropReason, EventOutcome, TaskEngine};
pub use materialize::{build, build_for_view, MaterializeOptions};
pub use subscribers::{SubscriberList, SubscriptionId};
