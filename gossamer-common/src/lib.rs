//! Shared error types and core newtypes for the gossamer assembly engine.

pub mod error;
pub mod position;

pub use error::{Error, Result};
pub use position::{Edge, Node, Position, RankType, MAX_K};
