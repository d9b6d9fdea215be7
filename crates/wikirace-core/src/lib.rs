//! Wikirace Core - Race data model, wire events, and error handling

pub mod error;
pub mod graph;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use graph::*;
pub use protocol::*;
pub use types::*;
