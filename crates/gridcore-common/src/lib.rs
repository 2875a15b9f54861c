//! Core value, id, and error types shared across the gridcore document engine.
//!
//! This crate has no engine state of its own — it is the "what a cell can hold and what an id
//! looks like" layer, kept dependency-light so tools and bindings can use it without pulling in
//! `gridcore-engine`.

pub mod encoding;
pub mod error;
pub mod ids;
pub mod value;

pub use error::{GridError, GridErrorKind};
pub use ids::{ColId, Node, RowId, TableId};
pub use value::{ColumnType, Value, convert};
