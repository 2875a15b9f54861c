//! The document facade: owns the store, dependency graph, lookup registry and recompute state,
//! and is the only thing formulas talk to (spec 4.4, 4.6).

use std::rc::Rc;

use gridcore_common::{ColId, GridError, GridErrorKind, Node, RowId, TableId, Value};
use rustc_hash::FxHashMap;
use tracing::{instrument, warn};

use crate::config::EngineConfig;
use crate::engine::{
    lookup_node_id, Composition, DependencyGraph, HashKey, IdentityRelation, LookupIndex, RecomputeEngine,
    RefRelation, RowSet, SingleRowIdentityRelation,
};
use crate::formula::{Formula, FormulaOutcome, Suspend};
use crate::store::{Column, RecalcPolicy, Store, Table};
use crate::summary::SummaryInfo;

/// Observes recompute activity without participating in it (spec 4.10). Used by hosts that want
/// to surface formula errors live rather than waiting for `apply_user_actions` to return.
pub trait RecomputeObserver {
    fn formula_error(&self, _node: &Node, _row: RowId, _error: &GridError) {}
    fn cell_recomputed(&self, _node: &Node, _row: RowId) {}
}

pub struct Document {
    pub store: Store,
    pub graph: DependencyGraph,
    pub config: EngineConfig,
    recompute: RecomputeEngine,
    lookups: FxHashMap<Node, Rc<LookupIndex>>,
    observer: Option<Rc<dyn RecomputeObserver>>,
    summaries: FxHashMap<TableId, SummaryInfo>,
    /// One [`RefRelation`] per `(referring_node, target_node)` pair, shared across every row
    /// `EvalContext::get_field` resolves for that pair (spec 9, "$X.Y" nested reference reads).
    ref_relations: FxHashMap<(Node, Node), Rc<RefRelation>>,
}

impl Document {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: Store::new(),
            graph: DependencyGraph::new(),
            config,
            recompute: RecomputeEngine::new(),
            lookups: FxHashMap::default(),
            observer: None,
            summaries: FxHashMap::default(),
            ref_relations: FxHashMap::default(),
        }
    }

    fn ensure_ref_relation(&mut self, referrer: Node, target: Node) -> Rc<RefRelation> {
        self.ref_relations
            .entry((referrer, target))
            .or_insert_with(RefRelation::new)
            .clone()
    }

    /// Record that `summary_table` is the canonical derived table for `info.source` grouped by
    /// `info.groupby_cols` (spec 4.7).
    pub fn register_summary(&mut self, summary_table: TableId, info: SummaryInfo) {
        self.summaries.insert(summary_table, info);
    }

    pub fn summary_info(&self, summary_table: &TableId) -> Option<&SummaryInfo> {
        self.summaries.get(summary_table)
    }

    pub fn unregister_summary(&mut self, summary_table: &TableId) {
        self.summaries.remove(summary_table);
    }

    /// Every summary table currently derived from `source` (spec 4.7: formula-column edits
    /// broadcast to every sister, and groupby updates must find siblings to GC).
    pub fn summaries_of_source(&self, source: &TableId) -> Vec<TableId> {
        self.summaries
            .iter()
            .filter(|(_, info)| &info.source == source)
            .map(|(table, _)| table.clone())
            .collect()
    }

    pub fn allocate_row_id(&mut self, table_id: &TableId) -> RowId {
        self.store
            .table_mut(table_id)
            .map(|t| t.allocate_row_id())
            .unwrap_or(RowId(1))
    }

    pub fn set_observer(&mut self, observer: Rc<dyn RecomputeObserver>) {
        self.observer = Some(observer);
    }

    pub fn add_table(&mut self, table: Table) {
        self.store.add_table(table);
    }

    pub fn remove_table(&mut self, table_id: &TableId) {
        if let Some(table) = self.store.remove_table(table_id) {
            for col_id in table.column_ids() {
                self.reset_node(&Node::new(table_id.clone(), col_id.clone()));
            }
        }
    }

    pub fn rename_table(&mut self, old: &TableId, new: TableId) {
        self.store.rename_table(old, new);
    }

    /// Nodes of every lookup index currently maintained over `table_id` (spec 4.5).
    fn lookups_over_table(&self, table_id: &TableId) -> Vec<Node> {
        self.lookups
            .values()
            .filter(|idx| &idx.target_table == table_id)
            .map(|idx| idx.node.clone())
            .collect()
    }

    /// Install a column. True formula columns, and trigger-formula data columns with any policy
    /// but `Never`, start with every existing row dirty; `ExplicitDeps` additionally gets an
    /// edge from the trigger column to each listed sibling so an ordinary dependent-row change
    /// on that sibling dirties the trigger column through the generic graph walk rather than a
    /// special case in `recompute` (spec 3, `RecalcPolicy`).
    pub fn add_column(&mut self, table_id: &TableId, column: Column) {
        let node = Node::new(table_id.clone(), column.col_id.clone());
        let has_formula = column.has_formula();
        let policy = column.recalc_policy.clone();
        let ref_table = column.ref_table.clone();
        if let Some(table) = self.store.table_mut(table_id) {
            table.add_column(column);
        }
        if let Some(target) = ref_table {
            if let Some(target_table) = self.store.table_mut(&target) {
                target_table.add_back_reference(node.clone());
            }
        }
        if !has_formula {
            return;
        }
        if let RecalcPolicy::ExplicitDeps(deps) = &policy {
            for dep in deps {
                let dep_node = Node::new(table_id.clone(), dep.clone());
                self.graph
                    .add_edge(node.clone(), dep_node, Rc::new(SingleRowIdentityRelation));
            }
        }
        if policy != RecalcPolicy::Never {
            self.invalidate(&node, &RowSet::All);
        }
    }

    /// Column ids in `table_id` whose trigger formula uses `policy` (spec 4.4: `ManualUpdates`
    /// columns recalc whenever the row is touched by a direct user action, independent of which
    /// column was written — the action pipeline drives that, not the dependency graph).
    pub fn trigger_cols_with_policy(&self, table_id: &TableId, policy: &RecalcPolicy) -> Vec<ColId> {
        self.store
            .table(table_id)
            .map(|t| {
                t.column_ids()
                    .filter(|c| {
                        t.get_column(c)
                            .map(|col| col.has_formula() && &col.recalc_policy == policy)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn remove_column(&mut self, table_id: &TableId, col_id: &ColId) {
        let node = Node::new(table_id.clone(), col_id.clone());
        self.reset_node(&node);
        // Drop any same-bundle "just set directly" protection this node's rows were carrying
        // (`set_cell`'s `prevent`): `Node` equality is by `(table_id, col_id)`, so a same-bundle
        // `ModifyColumn` that removes and re-adds this colId would otherwise inherit a stale
        // prevent flag from before the retype and have its first formula-computed write silently
        // dropped.
        if let Some(table) = self.store.table(table_id) {
            for row in table.iter_row_ids() {
                self.recompute.unprevent(&node, row);
            }
        }
        let ref_table = self.store.table(table_id).and_then(|t| t.get_column(col_id)).and_then(|c| c.ref_table.clone());
        if let Some(target) = ref_table {
            if let Some(target_table) = self.store.table_mut(&target) {
                target_table.remove_back_reference(&node);
            }
        }
        if let Some(table) = self.store.table_mut(table_id) {
            table.remove_column(col_id);
        }
    }

    pub fn rename_column(&mut self, table_id: &TableId, old: &ColId, new: ColId) {
        if let Some(table) = self.store.table_mut(table_id) {
            table.rename_column(old, new);
        }
    }

    /// Replace a column's formula body in place, keeping its position and other schema fields
    /// (spec 4.7: sister-column formula edits must stay in sync across every summary derived
    /// from the same source — this is what `summary::broadcast_formula_edit` calls on each
    /// sister, instead of a remove-then-add that would lose `col_order`).
    pub fn set_column_formula(&mut self, table_id: &TableId, col_id: &ColId, formula: Rc<dyn Formula>) {
        let node = Node::new(table_id.clone(), col_id.clone());
        if let Some(table) = self.store.table_mut(table_id) {
            if let Some(col) = table.get_column_mut(col_id) {
                col.formula = Some(formula);
                col.is_formula = true;
            }
        }
        self.reset_node(&node);
    }

    /// Append rows to a table and dirty every formula/trigger column not set to `Never` (plus
    /// any lookup index over the table) for the new rows (spec 4.2, 4.4: a freshly inserted
    /// row's formula cells start dirty until the next `recompute`; "recalc only on new-record
    /// insertion" is `RecalcPolicy::Default`'s defining behavior, but nothing stops
    /// `ExplicitDeps`/`ManualUpdates` columns from also wanting an initial value).
    pub fn add_rows(&mut self, table_id: &TableId, row_ids: &[RowId], col_values: &FxHashMap<ColId, Vec<Value>>) {
        let formula_cols: Vec<ColId> = self
            .store
            .table(table_id)
            .map(|t| {
                t.column_ids()
                    .filter(|c| {
                        t.get_column(c)
                            .map(|col| col.has_formula() && col.recalc_policy != RecalcPolicy::Never)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(table) = self.store.table_mut(table_id) {
            table.add_rows(row_ids, col_values);
        }

        let rows = RowSet::from_rows(row_ids.iter().copied());
        for col_id in formula_cols {
            self.invalidate(&Node::new(table_id.clone(), col_id), &rows);
        }
        for lookup_node in self.lookups_over_table(table_id) {
            self.invalidate(&lookup_node, &rows);
        }
    }

    pub fn remove_rows(&mut self, table_id: &TableId, row_ids: &[RowId]) {
        let mut affected: Vec<(Node, RowSet)> = Vec::new();
        for lookup_node in self.lookups_over_table(table_id) {
            if let Some(idx) = self.lookups.get(&lookup_node) {
                for row in row_ids {
                    for (node, rows) in idx.unset_row_and_affected(*row) {
                        affected.push((node, RowSet::from_rows(rows.into_iter())));
                    }
                }
            }
        }
        for (node, rows) in affected {
            self.invalidate(&node, &rows);
        }
        let back_refs: Vec<Node> =
            self.store.table(table_id).map(|t| t.back_references().to_vec()).unwrap_or_default();
        if let Some(table) = self.store.table_mut(table_id) {
            table.remove_rows(row_ids);
        }
        self.fix_dangling_refs(table_id, row_ids, &back_refs);
    }

    /// Resolve any `Ref`/`RefList` cell elsewhere in the store that pointed at one of
    /// `removed_rows` in `target_table` to the sentinel `Ref(target_table, RowId::NONE)` (spec 8
    /// invariant 8). Walks only the back-references recorded when the referencing column was
    /// added, not the whole store, and goes through `write_value` so dependents still invalidate.
    /// Formula-backed reference columns (lookup indices, summary `group`/helper columns) are
    /// skipped: those already self-maintain through the lookup invalidation path above.
    fn fix_dangling_refs(&mut self, target_table: &TableId, removed_rows: &[RowId], back_refs: &[Node]) {
        for node in back_refs {
            let is_formula = self
                .store
                .table(&node.table_id)
                .and_then(|t| t.get_column(&node.col_id))
                .map(|c| c.has_formula())
                .unwrap_or(true);
            if is_formula {
                continue;
            }
            let rows: Vec<RowId> = match self.store.table(&node.table_id) {
                Some(t) => t.iter_row_ids().collect(),
                None => continue,
            };
            for row in rows {
                let fixed = match self.get_cell(&node.table_id, &node.col_id, row) {
                    Value::Ref(t, r) if t == *target_table && removed_rows.contains(&r) => {
                        Some(Value::Ref(target_table.clone(), RowId::NONE))
                    }
                    Value::RefList(t, rs) if t == *target_table && rs.iter().any(|r| removed_rows.contains(r)) => {
                        Some(Value::RefList(
                            target_table.clone(),
                            rs.into_iter().filter(|r| !removed_rows.contains(r)).collect(),
                        ))
                    }
                    _ => None,
                };
                if let Some(value) = fixed {
                    self.write_value(node, row, value);
                }
            }
        }
    }

    /// Apply a direct user write to a cell whose column has a trigger formula (spec 4.4:
    /// `ManualUpdates`/`ExplicitDeps` columns set directly by a user action should not be
    /// clobbered by the column's own recalc before the current batch finishes draining).
    pub fn set_cell(&mut self, table_id: &TableId, col_id: &ColId, row: RowId, value: Value) {
        let node = Node::new(table_id.clone(), col_id.clone());
        self.write_value(&node, row, value);
        self.recompute.prevent(&node, row);
    }

    pub fn get_cell(&self, table_id: &TableId, col_id: &ColId, row: RowId) -> Value {
        self.store
            .table(table_id)
            .map(|t| t.raw_get(row, col_id))
            .unwrap_or(Value::Blank)
    }

    pub fn take_changes(&mut self) -> FxHashMap<Node, RowSet> {
        self.recompute.take_changes()
    }

    /// Mark `node` (and, if `include_self`, any row not yet dirty of `node`) and every
    /// transitive dependent dirty (spec 4.3 `invalidate_deps`), then immediately `recompute`.
    /// The entry point `apply_user_actions` calls after every direct cell write.
    #[instrument(skip(self))]
    pub fn invalidate(&mut self, node: &Node, rows: &RowSet) {
        let mut map = FxHashMap::default();
        self.graph.invalidate_deps(node, rows, &mut map, true);
        self.recompute.invalidate_many(map);
    }

    /// Reset a node's own formula state across all rows (spec 4.3: column removed/edited,
    /// schema change). Drops this node's outgoing edges and any lookup relation it is the
    /// referring side of, then invalidates all of its dependents.
    pub fn reset_node(&mut self, node: &Node) {
        self.graph.clear_dependencies(node);
        for lookup in self.lookups.values() {
            lookup.delete_relation(node);
        }
        self.invalidate(node, &RowSet::All);
    }

    /// Force one cell to (re)evaluate synchronously, independent of the recompute queue
    /// (spec 6, `get_formula_error`). Any `NeedsRow` suspension is resolved inline by evaluating
    /// the needed cell first, then retrying; a `NeedsRequest` suspension is left as-is (no
    /// synchronous way to answer it) and the cell keeps whatever value it last held.
    pub fn reevaluate_cell(&mut self, table_id: &TableId, col_id: &ColId, row: RowId) -> Value {
        let node = Node::new(table_id.clone(), col_id.clone());
        match self.eval_node(&node, row) {
            Ok(()) => {}
            Err(Suspend::NeedsRow(needed_node, needed_row)) => {
                let _ = self.eval_node(&needed_node, needed_row);
                let _ = self.eval_node(&node, row);
            }
            Err(Suspend::NeedsRequest(..)) => {}
        }
        self.get_cell(table_id, col_id, row)
    }

    fn get_formula(&self, node: &Node) -> Option<Rc<dyn Formula>> {
        let table = self.store.table(&node.table_id)?;
        let col = table.get_column(&node.col_id)?;
        col.formula.clone()
    }

    /// Whether `node`'s column is a true formula column, as opposed to a plain data column or a
    /// non-formula trigger column (default-value / `RecalcPolicy`-driven). Used to decide whether
    /// a read through that node should record a dependency edge at all (spec 4.4's `use_node`
    /// contract: a non-formula column's reads of other cells never make it a dependent of them).
    fn is_formula_column(&self, node: &Node) -> bool {
        self.store
            .table(&node.table_id)
            .and_then(|t| t.get_column(&node.col_id))
            .map(|c| c.is_formula)
            .unwrap_or(false)
    }

    fn resolve_lookup_formula(&self, node: &Node) -> Option<Rc<LookupIndex>> {
        self.lookups.get(node).cloned()
    }

    fn all_known_rows(&self, table_id: &TableId) -> Vec<RowId> {
        self.store
            .table(table_id)
            .map(|t| t.iter_row_ids().collect())
            .unwrap_or_default()
    }

    /// True once `recompute_map` has no dirty nodes left (spec 8 invariant 3: `∀ node ∈
    /// recompute_map` at quiescence: `recompute_map[node] = ∅`).
    pub fn is_quiescent(&self) -> bool {
        !self.recompute.is_dirty()
    }

    /// Drain `recompute_map` until empty (spec 4.4 step 4, the `_update_loop`/`_recompute_step`
    /// equivalent).
    ///
    /// A formula that needs a cell that isn't ready yet does not unwind via an exception:
    /// `EvalContext::get` recurses directly into evaluating the needed cell (locking it first),
    /// and only the lock set is used to detect genuine cycles (spec 9, "Coroutines & exceptions
    /// for control flow -> explicit result enum").
    #[instrument(skip(self))]
    pub fn recompute(&mut self) -> Result<(), GridError> {
        let mut iterations_without_progress = 0usize;
        while let Some(node) = self.recompute.next_node() {
            let dirty = match self.recompute.dirty_rows_of(&node) {
                Some(rows) => rows.clone(),
                None => continue,
            };
            let all_rows = self.all_known_rows(&node.table_id);
            let rows: Vec<RowId> = dirty.iter_concrete(&all_rows).collect();

            if rows.is_empty() {
                self.recompute.remove_node(&node);
                continue;
            }

            self.graph.reset_dependencies(&node, &dirty);

            let mut done = rustc_hash::FxHashSet::default();
            let mut progressed = false;
            for row in rows {
                match self.eval_node(&node, row) {
                    Ok(()) => {
                        done.insert(row);
                        progressed = true;
                    }
                    Err(Suspend::NeedsRow(needed_node, needed_row)) => {
                        // Recurse to satisfy the dependency first, then retry this cell next
                        // pass; do not mark it done so it stays dirty.
                        self.invalidate(&needed_node, &RowSet::single(needed_row));
                    }
                    Err(Suspend::NeedsRequest(..)) => {
                        // Async requests surface to the caller; leave the cell dirty so a
                        // resumed recompute can retry it once the answer arrives.
                        done.insert(row);
                        progressed = true;
                    }
                }
            }
            self.recompute.finish_rows(&node, &done, &all_rows);

            if progressed {
                iterations_without_progress = 0;
            } else {
                iterations_without_progress += 1;
                if iterations_without_progress > 1 {
                    let err = GridError::new(GridErrorKind::EngineProgress)
                        .with_message("engine not making progress");
                    if self.config.progress_guard_panics {
                        panic!("{err}");
                    }
                    return Err(err);
                }
            }
        }
        self.recompute.clear_prevented();
        Ok(())
    }

    fn eval_node(&mut self, node: &Node, row: RowId) -> Result<(), Suspend> {
        let formula = self.get_formula(node).or_else(|| {
            self.resolve_lookup_formula(node)
                .map(|idx| idx as Rc<dyn Formula>)
        });
        let Some(formula) = formula else {
            return Ok(());
        };

        if !self.recompute.lock(node, row) {
            return Err(Suspend::NeedsRow(node.clone(), row));
        }
        let mut ctx = EvalContext {
            doc: self,
            current_node: node.clone(),
            current_row: row,
        };
        let outcome = FormulaOutcome::from(formula.eval(row, &mut ctx));
        self.recompute.unlock(node, row);

        match outcome {
            FormulaOutcome::Value(value) => {
                if !self.recompute.is_peeking() {
                    self.write_value(node, row, value);
                    if let Some(observer) = &self.observer {
                        observer.cell_recomputed(node, row);
                    }
                }
                Ok(())
            }
            FormulaOutcome::NeedsRow(n, r) => Err(Suspend::NeedsRow(n, r)),
            FormulaOutcome::NeedsRequest(key, arg) => Err(Suspend::NeedsRequest(key, arg)),
        }
    }

    fn write_value(&mut self, node: &Node, row: RowId, value: Value) {
        if self.recompute.is_prevented(node, row) {
            return;
        }
        let changed = {
            let table = match self.store.table_mut(&node.table_id) {
                Some(t) => t,
                None => return,
            };
            let Some(col) = table.get_column_mut(&node.col_id) else {
                return;
            };
            let old = col.raw_get(row);
            let is_new = !old.strict_equal(&value);
            if let Value::Error(e) = &value {
                warn!(node = %node, row = %row.0, error = %e, "formula raised");
                if let Some(observer) = &self.observer {
                    observer.formula_error(node, row, e);
                }
            }
            col.set(row, value);
            is_new
        };
        if changed {
            self.recompute.mark_changed(node, &RowSet::single(row));
            let mut map = FxHashMap::default();
            self.graph.invalidate_deps(node, &RowSet::single(row), &mut map, false);
            self.recompute.invalidate_many(map);
            crate::summary::drop_row_if_group_emptied(self, node, row);
        }
    }

    /// Install/fetch the lookup index for `(table, key_cols, contains)` and register that
    /// `referring_node` depends on it (spec 4.5 steps 1-2).
    fn ensure_lookup(
        &mut self,
        table_id: &TableId,
        key_cols: &[ColId],
        contains: &[bool],
        referring_node: &Node,
    ) -> Rc<LookupIndex> {
        let node = lookup_node_id(self.config.lookup_node_prefix, table_id, key_cols, contains);
        let is_new = !self.lookups.contains_key(&node);
        let index = self
            .lookups
            .entry(node.clone())
            .or_insert_with(|| LookupIndex::new(node.clone(), table_id.clone(), key_cols.to_vec(), contains.to_vec()))
            .clone();

        // Lookup index nodes live outside `Table::columns` (private, synthetic); the edge from
        // the referring node to the index is enough for invalidation walks to reach it — the
        // index's own dirty rows are tracked in `recompute_map` directly.
        let relation = index.get_or_create_relation(referring_node);
        self.graph.add_edge(referring_node.clone(), node.clone(), relation);
        if is_new {
            // A freshly created index has absorbed no rows yet; dirty the whole target table so
            // the next recompute (or the immediate catch-up below) builds its key map.
            self.recompute.invalidate(&node, &RowSet::All);
        }
        index
    }
}

/// The interface a [`crate::formula::Formula`] sees while evaluating one cell.
///
/// Every read goes through `get`, which both returns the value *and* records a dependency edge
/// (spec 3's core invariant) — there is no way for a formula to read a cell without the engine
/// knowing about it.
pub struct EvalContext<'a> {
    doc: &'a mut Document,
    current_node: Node,
    current_row: RowId,
}

impl<'a> EvalContext<'a> {
    /// Read `node[row]`, recording `(current_node, node)` as a dependency edge (identity
    /// relation unless `node` is a lookup index, handled separately by `lookup_records`). If
    /// `node[row]` is itself dirty, recurses to compute it first rather than raising — the
    /// caller only ever sees `Suspend::NeedsRow` when that would form a cycle. A re-entrant read
    /// of a cell already being computed higher up this call stack (spec 4.4 step 5, 7) resolves
    /// to `Value::Error(CircularRef)` rather than suspending forever, matching how the
    /// originating implementation's `CircularRefError` propagates as an ordinary value once
    /// caught at the point it was raised.
    pub fn get(&mut self, node: &Node, row: RowId) -> Result<Value, Suspend> {
        // Only a true formula column's reads become dependency edges (spec 4.4's `use_node`
        // contract). A trigger/default column that reads another cell still gets the value, but
        // does not turn into that cell's dependent — a `Default`-policy trigger must only ever
        // recalc on row insertion, not whenever something it happened to read changes.
        if self.doc.is_formula_column(&self.current_node) {
            self.doc
                .graph
                .add_edge(self.current_node.clone(), node.clone(), Rc::new(IdentityRelation));
        }

        if self.doc.recompute.dirty_rows_of(node).map(|r| r.contains(row)).unwrap_or(false) {
            if self.doc.recompute.is_locked(node, row) {
                return Ok(Value::Error(GridError::circular_ref()));
            }
            self.doc.eval_node(node, row)?;
        }
        Ok(self
            .doc
            .store
            .table(&node.table_id)
            .map(|t| t.raw_get(row, &node.col_id))
            .unwrap_or(Value::Blank))
    }

    /// Evaluate `node[row]` without recording a dependency and without persisting any formula
    /// side effects it causes (spec 4.4, "PEEK"): used by summary/group formulas that need to
    /// read a would-be value to decide which group a record belongs to, before that grouping
    /// decision itself becomes a dependency.
    pub fn peek(&mut self, node: &Node, row: RowId) -> Result<Value, Suspend> {
        self.doc.recompute.push_peek();
        let result = (|| {
            if self.doc.recompute.dirty_rows_of(node).map(|r| r.contains(row)).unwrap_or(false) {
                self.doc.eval_node(node, row)?;
            }
            Ok(self
                .doc
                .store
                .table(&node.table_id)
                .map(|t| t.raw_get(row, &node.col_id))
                .unwrap_or(Value::Blank))
        })();
        self.doc.recompute.pop_peek();
        result
    }

    /// `lookupRecords`/`lookupOne`-equivalent (spec 4.5 steps 1-4): find every row of `table`
    /// whose `key_cols` match `key_values`, recording the calling formula's dependency on the
    /// shared lookup index rather than on `table` directly.
    pub fn lookup_records(
        &mut self,
        table: &TableId,
        key_cols: &[ColId],
        contains: &[bool],
        key_values: &[Value],
    ) -> Result<Vec<RowId>, Suspend> {
        let index = self
            .doc
            .ensure_lookup(table, key_cols, contains, &self.current_node);
        let relation = index.get_or_create_relation(&self.current_node);
        let key = HashKey::from_values(key_values);
        relation.record(self.current_row, key.clone());

        // Bring the index up to date for the rows it still owes a recompute, exactly as any
        // other dependency read would (step 2: "as if it were any other formula column").
        let index_node = index.node.clone();
        if self
            .doc
            .recompute
            .dirty_rows_of(&index_node)
            .map(|r| !r.is_empty())
            .unwrap_or(false)
        {
            self.doc.recompute_index(&index_node)?;
        }

        let mut rows: Vec<RowId> = index.rows_for_key(&key).into_iter().collect();
        rows.sort_unstable();
        Ok(rows)
    }

    /// `lookupOrAddDerived`-equivalent (spec 4.7): find the row of `table` whose `key_cols`
    /// equal `key_values`, creating one with those values set if none matches. Used by a
    /// summary source table's `#summary#{...}` helper column to materialize a group's row on
    /// first demand.
    pub fn lookup_or_add_derived(
        &mut self,
        table: &TableId,
        key_cols: &[ColId],
        key_values: &[Value],
    ) -> Result<RowId, Suspend> {
        let contains = vec![false; key_cols.len()];
        let existing = self.lookup_records(table, key_cols, &contains, key_values)?;
        if let Some(row) = existing.first() {
            return Ok(*row);
        }
        let row = self.doc.allocate_row_id(table);
        let mut columns: FxHashMap<ColId, Vec<Value>> = FxHashMap::default();
        for (col, val) in key_cols.iter().zip(key_values.iter()) {
            columns.insert(col.clone(), vec![val.clone()]);
        }
        self.doc.add_rows(table, &[row], &columns);
        Ok(row)
    }

    /// Called by [`crate::engine::lookup::LookupIndex`] when a key it owns changed, to push a
    /// targeted invalidation straight into the recompute map (spec 4.5: row-level precision is
    /// the index's own responsibility, not the generic graph walk — see `DESIGN.md`).
    pub(crate) fn invalidate_rows(&mut self, node: &Node, rows: RowSet) {
        let mut map = FxHashMap::default();
        self.doc.graph.invalidate_deps(node, &rows, &mut map, true);
        self.doc.recompute.invalidate_many(map);
    }

    /// `$X.Y`-style nested reference read (spec 9): reads `ref_col` on the current row (expected
    /// to hold a `Ref` into another table), then `target_col` on the row it points to, the two
    /// hops composed into a single dependency edge via [`Composition`] rather than two separate
    /// ones. Blank/unset references read as `Value::Blank` instead of erroring, matching `get`'s
    /// own "missing resolves to blank" treatment of an absent table/column.
    pub fn get_field(&mut self, ref_col: &ColId, target_col: &ColId) -> Result<Value, Suspend> {
        let row = self.current_row;
        let ref_node = Node::new(self.current_node.table_id.clone(), ref_col.clone());
        let ref_value = self.get(&ref_node, row)?;
        let (target_table, target_row) = match ref_value {
            Value::Ref(t, r) if r != RowId::NONE => (t, r),
            _ => return Ok(Value::Blank),
        };

        let target_node = Node::new(target_table, target_col.clone());
        if self.doc.is_formula_column(&self.current_node) {
            let relation = self.doc.ensure_ref_relation(self.current_node.clone(), target_node.clone());
            relation.record(row, target_row);
            self.doc.graph.add_edge(
                self.current_node.clone(),
                target_node.clone(),
                Rc::new(Composition { first: relation, second: Rc::new(IdentityRelation) }),
            );
        }

        if self
            .doc
            .recompute
            .dirty_rows_of(&target_node)
            .map(|r| r.contains(target_row))
            .unwrap_or(false)
        {
            if self.doc.recompute.is_locked(&target_node, target_row) {
                return Ok(Value::Error(GridError::circular_ref()));
            }
            self.doc.eval_node(&target_node, target_row)?;
        }
        Ok(self
            .doc
            .store
            .table(&target_node.table_id)
            .map(|t| t.raw_get(target_row, &target_node.col_id))
            .unwrap_or(Value::Blank))
    }

    pub fn current_node(&self) -> &Node {
        &self.current_node
    }

    pub fn current_row(&self) -> RowId {
        self.current_row
    }
}

impl Document {
    /// Drain every dirty row of one lookup index node in place, used by `lookup_records` to
    /// bring the index current before reading it (spec 4.5 step 2).
    fn recompute_index(&mut self, index_node: &Node) -> Result<(), Suspend> {
        let dirty = match self.recompute.dirty_rows_of(index_node) {
            Some(rows) => rows.clone(),
            None => return Ok(()),
        };
        let all_rows = self.all_known_rows(&index_node.table_id);
        let rows: Vec<RowId> = dirty.iter_concrete(&all_rows).collect();
        let mut done = rustc_hash::FxHashSet::default();
        for row in rows {
            self.eval_node(index_node, row)?;
            done.insert(row);
        }
        self.recompute.finish_rows(index_node, &done, &all_rows);
        Ok(())
    }
}
