//! Bookkeeping for the recompute loop: the dirty-node queue, the in-progress lock set used for
//! cycle detection, and the peek-nesting counter (spec 4.4, 4.4 step 5, 7).
//!
//! The loop itself lives on [`crate::document::Document::recompute`], since driving it needs
//! mutable access to the store, the graph and the lookup registry together. This type only
//! holds the state that survives across individual cell evaluations within one `recompute` call.

use gridcore_common::{ColId, Node, RowId};
use rustc_hash::{FxHashMap, FxHashSet};

use super::rowset::RowSet;

#[derive(Default)]
pub struct RecomputeEngine {
    recompute_map: FxHashMap<Node, RowSet>,
    /// Insertion order of `recompute_map` keys, for a deterministic (if arbitrary) pop order.
    /// May contain nodes already drained from the map; `next_node` skips those.
    order: Vec<Node>,
    /// Rows whose value actually changed this `recompute` call (spec 4.4: consumed by the
    /// action pipeline to build `calc` doc actions, and by the summary layer to find which
    /// derived rows to refresh).
    changes_map: FxHashMap<Node, RowSet>,
    /// `(node, row)` pairs currently being evaluated — a re-entrant call onto one of these is
    /// a circular reference (spec 4.4 step 5, 7).
    locked: FxHashSet<(Node, RowId)>,
    /// Cells a trigger formula is about to overwrite directly; recalculation must not clobber
    /// them this step (spec 4.4, `ManualUpdates`/`ExplicitDeps` trigger columns).
    prevent_recompute: FxHashSet<(Node, RowId)>,
    /// >0 while inside a `peek` evaluation (spec 4.4, "PEEK"): resolved as a depth counter
    /// rather than a single flag so a peek formula that itself triggers a nested peek (e.g. two
    /// lookups chained through `ORDER_BY`) does not clear peek mode early on the inner return.
    peek_depth: u32,
}

impl RecomputeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self, node: &Node, rows: &RowSet) {
        if rows.is_empty() {
            return;
        }
        match self.recompute_map.get_mut(node) {
            Some(existing) => existing.union_with(rows),
            None => {
                self.recompute_map.insert(node.clone(), rows.clone());
                self.order.push(node.clone());
            }
        }
    }

    pub fn invalidate_many(&mut self, map: FxHashMap<Node, RowSet>) {
        for (node, rows) in map {
            self.invalidate(&node, &rows);
        }
    }

    pub fn mark_changed(&mut self, node: &Node, rows: &RowSet) {
        match self.changes_map.get_mut(node) {
            Some(existing) => existing.union_with(rows),
            None => {
                self.changes_map.insert(node.clone(), rows.clone());
            }
        }
    }

    pub fn take_changes(&mut self) -> FxHashMap<Node, RowSet> {
        std::mem::take(&mut self.changes_map)
    }

    pub fn is_dirty(&self) -> bool {
        !self.recompute_map.is_empty()
    }

    pub fn dirty_rows_of(&self, node: &Node) -> Option<&RowSet> {
        self.recompute_map.get(node)
    }

    /// Next node to process: lookup-index nodes before ordinary ones (spec 4.4 step 4), so an
    /// index is never read by a dependent formula before it has absorbed the current batch of
    /// row changes.
    pub fn next_node(&self) -> Option<Node> {
        let mut fallback = None;
        for node in &self.order {
            if !self.recompute_map.contains_key(node) {
                continue;
            }
            if is_lookup_col(&node.col_id) {
                return Some(node.clone());
            }
            if fallback.is_none() {
                fallback = Some(node.clone());
            }
        }
        fallback
    }

    /// Remove `rows` from `node`'s dirty set, returning whatever remains dirty for it. Called
    /// once a batch of rows for `node` has been evaluated (successfully or suspended elsewhere).
    pub fn finish_rows(&mut self, node: &Node, rows: &FxHashSet<RowId>, all_known_rows: &[RowId]) {
        if let Some(remaining) = self.recompute_map.get_mut(node) {
            remaining.subtract_rows(rows, all_known_rows);
            if remaining.is_empty() {
                self.recompute_map.remove(node);
            }
        }
    }

    pub fn remove_node(&mut self, node: &Node) {
        self.recompute_map.remove(node);
    }

    pub fn lock(&mut self, node: &Node, row: RowId) -> bool {
        self.locked.insert((node.clone(), row))
    }

    pub fn unlock(&mut self, node: &Node, row: RowId) {
        self.locked.remove(&(node.clone(), row));
    }

    pub fn is_locked(&self, node: &Node, row: RowId) -> bool {
        self.locked.contains(&(node.clone(), row))
    }

    pub fn prevent(&mut self, node: &Node, row: RowId) {
        self.prevent_recompute.insert((node.clone(), row));
    }

    pub fn unprevent(&mut self, node: &Node, row: RowId) {
        self.prevent_recompute.remove(&(node.clone(), row));
    }

    pub fn is_prevented(&self, node: &Node, row: RowId) -> bool {
        self.prevent_recompute.contains(&(node.clone(), row))
    }

    /// Clear every prevention flag, called once a `recompute` pass fully drains (spec 4.4: the
    /// suppression only needs to last for the batch of recalcs triggered by the action that set
    /// the cell directly).
    pub fn clear_prevented(&mut self) {
        self.prevent_recompute.clear();
    }

    pub fn push_peek(&mut self) {
        self.peek_depth += 1;
    }

    pub fn pop_peek(&mut self) {
        self.peek_depth = self.peek_depth.saturating_sub(1);
    }

    pub fn is_peeking(&self) -> bool {
        self.peek_depth > 0
    }
}

/// True for the synthetic column ids the scheduler must process before ordinary formula
/// columns (spec 4.4 step 4).
pub fn is_lookup_col(col_id: &ColId) -> bool {
    col_id.is_lookup_index()
}
