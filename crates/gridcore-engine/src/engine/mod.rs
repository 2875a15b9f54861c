//! Dependency graph, relations and the recompute scheduler (spec 4.3, 4.4, 4.5).

pub mod graph;
pub mod key;
pub mod lookup;
pub mod recompute;
pub mod relation;
pub mod rowset;

#[cfg(test)]
mod tests;

pub use graph::{DependencyGraph, Edge};
pub use key::{HashKey, KeyAtom};
pub use lookup::{lookup_node_id, LookupIndex};
pub use recompute::RecomputeEngine;
pub use relation::{Composition, IdentityRelation, LookupRelation, RefRelation, Relation, SingleRowIdentityRelation};
pub use rowset::RowSet;
