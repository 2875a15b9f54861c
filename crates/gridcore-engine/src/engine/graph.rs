//! The dependency graph: a set of edges `(out_node, in_node, relation)` (spec 3, 4.3).
//!
//! `out_node` is the dependent column; `in_node` is the column it reads from. Edges are stored
//! twice — indexed by `out_node` (to answer "what does this node depend on", needed by
//! `reset_dependencies`/`clear_dependencies`) and by `in_node` (to answer "what depends on this
//! node", needed by `invalidate_deps`) — sharing the same `Rc<Edge>` allocation so there is a
//! single relation object per edge regardless of which index it's found through.

use std::rc::Rc;

use gridcore_common::Node;
use rustc_hash::FxHashMap;

use super::relation::Relation;
use super::rowset::RowSet;

pub struct Edge {
    pub out_node: Node,
    pub in_node: Node,
    pub relation: Rc<dyn Relation>,
}

#[derive(Default)]
pub struct DependencyGraph {
    by_out: FxHashMap<Node, Vec<Rc<Edge>>>,
    by_in: FxHashMap<Node, Vec<Rc<Edge>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the edge once (spec 4.4 `use_node`: "record the edge ... in the graph once").
    /// A later call for the same `(out_node, in_node)` pair replaces the relation — this can
    /// happen when a lookup's key columns change and the formula re-resolves which index it
    /// reads.
    pub fn add_edge(&mut self, out_node: Node, in_node: Node, relation: Rc<dyn Relation>) {
        if let Some(existing) = self
            .by_out
            .get(&out_node)
            .into_iter()
            .flatten()
            .find(|e| e.in_node == in_node)
        {
            if Rc::ptr_eq(&existing.relation, &relation) {
                return;
            }
        }
        let edge = Rc::new(Edge {
            out_node: out_node.clone(),
            in_node: in_node.clone(),
            relation,
        });
        self.by_out.entry(out_node).or_default().push(edge.clone());
        self.by_in.entry(in_node).or_default().push(edge);
    }

    /// Outgoing edges of `node` — i.e. what `node` itself depends on.
    pub fn dependencies_of(&self, node: &Node) -> &[Rc<Edge>] {
        self.by_out.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Edges where `node` is the dependency side — i.e. what depends on `node`.
    pub fn dependents_of(&self, node: &Node) -> &[Rc<Edge>] {
        self.by_in.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Drop every edge where `node` is the dependent side (spec 4.3: "When all rows of a node
    /// are invalidated, that node's incoming edges are dropped entirely ... the *only* way
    /// edges shrink.")
    pub fn clear_dependencies(&mut self, node: &Node) {
        if let Some(edges) = self.by_out.remove(node) {
            for edge in &edges {
                if let Some(v) = self.by_in.get_mut(&edge.in_node) {
                    v.retain(|e| !Rc::ptr_eq(e, edge));
                    if v.is_empty() {
                        self.by_in.remove(&edge.in_node);
                    }
                }
            }
        }
    }

    /// Called just before `node`'s dirty rows are recomputed: reset every dependency relation
    /// of `node` for `dirty_rows`, so stateful relations (lookups) discard mappings that
    /// concern only those rows (spec 4.3).
    pub fn reset_dependencies(&self, node: &Node, dirty_rows: &RowSet) {
        for edge in self.dependencies_of(node) {
            edge.relation.reset_rows(dirty_rows);
        }
    }

    /// Walk outward from `in_node`: for each edge depending on it, union the affected dependent
    /// rows into `recompute_map`, and recurse into those dependents' own dependents. `ALL_ROWS`
    /// is absorbing. A visited-set prevents exponential blowup on diamond-shaped graphs
    /// (spec 4.3).
    pub fn invalidate_deps(
        &self,
        in_node: &Node,
        rows: &RowSet,
        recompute_map: &mut FxHashMap<Node, RowSet>,
        include_self: bool,
    ) {
        let mut visited = rustc_hash::FxHashSet::default();
        if include_self {
            Self::merge(recompute_map, in_node, rows);
        }
        self.invalidate_deps_inner(in_node, rows, recompute_map, &mut visited);
    }

    fn invalidate_deps_inner(
        &self,
        in_node: &Node,
        rows: &RowSet,
        recompute_map: &mut FxHashMap<Node, RowSet>,
        visited: &mut rustc_hash::FxHashSet<(Node, Node)>,
    ) {
        for edge in self.dependents_of(in_node) {
            let key = (edge.out_node.clone(), edge.in_node.clone());
            if !visited.insert(key) {
                continue;
            }
            let affected = edge.relation.affected_dependents(rows);
            if affected.is_empty() {
                continue;
            }
            Self::merge(recompute_map, &edge.out_node, &affected);
            self.invalidate_deps_inner(&edge.out_node, &affected, recompute_map, visited);
        }
    }

    fn merge(recompute_map: &mut FxHashMap<Node, RowSet>, node: &Node, rows: &RowSet) {
        recompute_map
            .entry(node.clone())
            .and_modify(|existing| existing.union_with(rows))
            .or_insert_with(|| rows.clone());
    }

    /// True if `node` has no remaining dependents (last relation dropped, spec 4.5: "Unused
    /// lookup indices ... are marked and deleted").
    pub fn remove_node_if_unused(&mut self, node: &Node) -> bool {
        let unused = self.by_in.get(node).map(|v| v.is_empty()).unwrap_or(true);
        if unused {
            self.clear_dependencies(node);
            self.by_in.remove(node);
        }
        unused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::relation::IdentityRelation;
    use gridcore_common::RowId;

    fn node(t: &str, c: &str) -> Node {
        Node::new(t, c)
    }

    #[test]
    fn invalidate_deps_walks_multiple_hops() {
        let mut g = DependencyGraph::new();
        let a = node("T", "A");
        let b = node("T", "B");
        let c = node("T", "C");
        g.add_edge(b.clone(), a.clone(), Rc::new(IdentityRelation));
        g.add_edge(c.clone(), b.clone(), Rc::new(IdentityRelation));

        let mut recompute_map = FxHashMap::default();
        g.invalidate_deps(&a, &RowSet::single(RowId(1)), &mut recompute_map, false);

        assert!(recompute_map.contains_key(&b));
        assert!(recompute_map.contains_key(&c));
    }

    #[test]
    fn clear_dependencies_is_only_way_edges_shrink() {
        let mut g = DependencyGraph::new();
        let a = node("T", "A");
        let b = node("T", "B");
        g.add_edge(b.clone(), a.clone(), Rc::new(IdentityRelation));
        assert_eq!(g.dependents_of(&a).len(), 1);
        g.clear_dependencies(&b);
        assert_eq!(g.dependents_of(&a).len(), 0);
    }
}
