//! Applies a batch of [`UserAction`]s to a [`Document`], producing an [`ActionGroup`] (spec 4.6).

use gridcore_common::{convert, ColId, GridError, GridErrorKind, RowId, TableId, Value};
use rustc_hash::FxHashMap;
use tracing::instrument;

use super::action_group::ActionGroup;
use super::doc_action::DocAction;
use super::user_action::{ColumnSpec, UserAction};
use crate::document::Document;
use crate::store::{Column, RecalcPolicy};

pub struct ActionPipeline<'a> {
    doc: &'a mut Document,
}

impl<'a> ActionPipeline<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    /// Spec 4.6's per-bundle entry point. `RowId`s in `values`/`columns` that are negative are
    /// placeholders: the first action that creates the row resolves it to a real id, and every
    /// later reference within the same bundle resolves through `neg_ids` (spec 5: "Two user
    /// actions in the same bundle may reference each other's newly-created rows via negative
    /// row ids").
    #[instrument(skip(self, actions))]
    pub fn apply_user_actions(&mut self, actions: &[UserAction]) -> Result<ActionGroup, GridError> {
        let mut group = ActionGroup::new();
        let mut neg_ids: FxHashMap<RowId, RowId> = FxHashMap::default();

        for action in actions {
            let checkpoint = group.checkpoint();
            match self.dispatch(action, &mut group, &mut neg_ids) {
                Ok(ret) => group.ret_values.push(ret),
                Err(err) => {
                    let undo_actions = group.undo_since(checkpoint);
                    self.apply_doc_actions(&undo_actions, true);
                    group.truncate_to(checkpoint);
                    return Err(err);
                }
            }
        }

        crate::docmodel::resync_metadata(self.doc);
        self.doc.recompute()?;
        self.flush_calc(&mut group);
        Ok(group)
    }

    fn resolve_row(&self, table: &TableId, requested: Option<RowId>, neg_ids: &mut FxHashMap<RowId, RowId>) -> RowId {
        match requested {
            Some(row) if row.is_placeholder() => *neg_ids
                .entry(row)
                .or_insert_with(|| self.allocate_row(table)),
            Some(row) => row,
            None => self.allocate_row(table),
        }
    }

    fn allocate_row(&self, table: &TableId) -> RowId {
        // `Table::allocate_row_id` takes `&mut Table`; the pipeline only has `&self` here since
        // resolution must happen before any other mutation this action makes. Route through the
        // same counter `Document::add_rows` will use by peeking the table's next free id.
        self.doc
            .store
            .table(table)
            .map(|t| {
                let mut max = RowId(0);
                for r in t.iter_row_ids() {
                    if r.0 >= max.0 {
                        max = RowId(r.0 + 1);
                    }
                }
                if max.0 == 0 {
                    RowId(1)
                } else {
                    max
                }
            })
            .unwrap_or(RowId(1))
    }

    fn resolve_value(&self, value: &Value, neg_ids: &FxHashMap<RowId, RowId>) -> Value {
        match value {
            Value::Ref(t, r) if r.is_placeholder() => {
                Value::Ref(t.clone(), neg_ids.get(r).copied().unwrap_or(*r))
            }
            other => other.clone(),
        }
    }

    /// Conversion step (spec 4.6): run every incoming value through the target column's
    /// `convert`, falling back to `AltText` rather than rejecting it.
    fn convert_for_column(&self, table: &TableId, col_id: &ColId, value: Value) -> Value {
        let Some(t) = self.doc.store.table(table) else {
            return value;
        };
        let Some(col) = t.get_column(col_id) else {
            return value;
        };
        convert(value, col.col_type, col.ref_table.as_ref())
    }

    fn dispatch(
        &mut self,
        action: &UserAction,
        group: &mut ActionGroup,
        neg_ids: &mut FxHashMap<RowId, RowId>,
    ) -> Result<Value, GridError> {
        match action {
            UserAction::AddRecord { table, row_id, values } => {
                let row = self.resolve_row(table, *row_id, neg_ids);
                let columns = self.convert_row_values(table, values, neg_ids);
                self.doc.add_rows(table, &[row], &columns);
                group.push_direct(
                    DocAction::BulkAddRecord { table: table.clone(), row_ids: vec![row], columns },
                    DocAction::BulkRemoveRecord { table: table.clone(), row_ids: vec![row] },
                );
                Ok(Value::Ref(table.clone(), row))
            }
            UserAction::BulkAddRecord { table, row_ids, columns } => {
                let rows: Vec<RowId> = match row_ids {
                    Some(ids) => ids.iter().map(|r| self.resolve_row(table, Some(*r), neg_ids)).collect(),
                    None => {
                        let n = columns.values().next().map(|v| v.len()).unwrap_or(0);
                        (0..n).map(|_| self.resolve_row(table, None, neg_ids)).collect()
                    }
                };
                let converted = self.convert_bulk_values(table, columns, neg_ids);
                self.doc.add_rows(table, &rows, &converted);
                group.push_direct(
                    DocAction::BulkAddRecord { table: table.clone(), row_ids: rows.clone(), columns: converted },
                    DocAction::BulkRemoveRecord { table: table.clone(), row_ids: rows.clone() },
                );
                Ok(Value::RefList(table.clone(), rows))
            }
            UserAction::ReplaceTableData { table, row_ids, columns } => {
                let old_rows = self.existing_rows(table);
                let old_columns = self.snapshot_columns(table, &old_rows);
                self.doc.remove_rows(table, &old_rows);
                let converted = self.convert_bulk_values(table, columns, neg_ids);
                self.doc.add_rows(table, row_ids, &converted);
                group.push_direct(
                    DocAction::BulkAddRecord { table: table.clone(), row_ids: row_ids.clone(), columns: converted },
                    if old_rows.is_empty() {
                        DocAction::BulkRemoveRecord { table: table.clone(), row_ids: row_ids.clone() }
                    } else {
                        DocAction::BulkAddRecord { table: table.clone(), row_ids: old_rows, columns: old_columns }
                    },
                );
                Ok(Value::RefList(table.clone(), row_ids.clone()))
            }
            UserAction::UpdateRecord { table, row_id, values } => {
                let old = self.snapshot_values(table, *row_id, values.keys());
                let converted = self.convert_row_values(table, values, neg_ids);
                self.apply_update(table, &[*row_id], &converted);
                group.push_direct(
                    DocAction::BulkUpdateRecord { table: table.clone(), row_ids: vec![*row_id], columns: converted },
                    DocAction::BulkUpdateRecord { table: table.clone(), row_ids: vec![*row_id], columns: old },
                );
                Ok(Value::Blank)
            }
            UserAction::BulkUpdateRecord { table, row_ids, columns } => {
                let old = self.snapshot_bulk(table, row_ids, columns.keys());
                let converted = self.convert_bulk_values(table, columns, neg_ids);
                self.apply_update(table, row_ids, &converted);
                group.push_direct(
                    DocAction::BulkUpdateRecord { table: table.clone(), row_ids: row_ids.clone(), columns: converted },
                    DocAction::BulkUpdateRecord { table: table.clone(), row_ids: row_ids.clone(), columns: old },
                );
                Ok(Value::Blank)
            }
            UserAction::RemoveRecord { table, row_id } => {
                if crate::summary::is_summary_table(self.doc, table) {
                    return Err(GridError::new(GridErrorKind::InvalidInput)
                        .with_message("summary rows cannot be removed directly"));
                }
                let old = self.snapshot_full_row(table, *row_id);
                self.doc.remove_rows(table, &[*row_id]);
                group.push_direct(
                    DocAction::BulkRemoveRecord { table: table.clone(), row_ids: vec![*row_id] },
                    DocAction::BulkAddRecord { table: table.clone(), row_ids: vec![*row_id], columns: old },
                );
                Ok(Value::Blank)
            }
            UserAction::BulkRemoveRecord { table, row_ids } => {
                if crate::summary::is_summary_table(self.doc, table) {
                    return Err(GridError::new(GridErrorKind::InvalidInput)
                        .with_message("summary rows cannot be removed directly"));
                }
                let old = self.snapshot_columns(table, row_ids);
                self.doc.remove_rows(table, row_ids);
                group.push_direct(
                    DocAction::BulkRemoveRecord { table: table.clone(), row_ids: row_ids.clone() },
                    DocAction::BulkAddRecord { table: table.clone(), row_ids: row_ids.clone(), columns: old },
                );
                Ok(Value::Blank)
            }
            UserAction::AddColumn { table, col_id, spec } => {
                let col_id = col_id.clone().unwrap_or_else(|| self.sanitize_col_id(table, &spec_label(spec)));
                let column = build_column(col_id.clone(), spec);
                self.doc.add_column(table, column);
                group.push_direct(
                    DocAction::AddColumn { table: table.clone(), col_id: col_id.clone(), spec: spec.clone() },
                    DocAction::RemoveColumn { table: table.clone(), col_id },
                );
                Ok(Value::Blank)
            }
            UserAction::ModifyColumn { table, col_id, spec } => {
                if crate::summary::is_groupby_column(self.doc, table, col_id) {
                    return Err(GridError::new(GridErrorKind::InvalidInput)
                        .with_message("a summary groupby column cannot be retyped or converted to/from formula"));
                }
                let prior_spec = self.column_spec_of(table, col_id);
                let rows = self.existing_rows(table);
                let old_cells: Vec<Value> = {
                    let t = self.doc.store.table(table);
                    rows.iter()
                        .map(|r| t.map(|t| t.raw_get(*r, col_id)).unwrap_or(Value::Blank))
                        .collect()
                };
                let column = build_column(col_id.clone(), spec);
                let formula = column.formula.clone();
                self.doc.remove_column(table, col_id);
                self.doc.add_column(table, column);
                if !spec.is_formula {
                    // Re-run every surviving cell through the new column's conversion instead of
                    // discarding it: `remove_column` + `add_column` drops values, so restore them
                    // here the same way `convert_for_column` handles incoming user values.
                    for (row, old) in rows.iter().zip(old_cells.into_iter()) {
                        let converted = self.convert_for_column(table, col_id, old);
                        self.doc.set_cell(table, col_id, *row, converted);
                    }
                }
                if let Some(formula) = formula {
                    crate::summary::broadcast_formula_edit(self.doc, table, col_id, formula);
                }
                let undo_spec = prior_spec.unwrap_or_else(|| spec.clone());
                group.push_direct(
                    DocAction::ModifyColumn { table: table.clone(), col_id: col_id.clone(), spec: spec.clone() },
                    DocAction::ModifyColumn { table: table.clone(), col_id: col_id.clone(), spec: undo_spec },
                );
                Ok(Value::Blank)
            }
            UserAction::RenameColumn { table, old, new } => {
                if crate::summary::is_groupby_column(self.doc, table, old) {
                    return Err(GridError::new(GridErrorKind::InvalidInput)
                        .with_message("a summary groupby column cannot be renamed"));
                }
                self.doc.rename_column(table, old, new.clone());
                group.push_direct(
                    DocAction::RenameColumn { table: table.clone(), old: old.clone(), new: new.clone() },
                    DocAction::RenameColumn { table: table.clone(), old: new.clone(), new: old.clone() },
                );
                Ok(Value::Blank)
            }
            UserAction::RemoveColumn { table, col_id } => {
                if crate::summary::is_groupby_column(self.doc, table, col_id) {
                    return Err(GridError::new(GridErrorKind::InvalidInput)
                        .with_message("a summary groupby column cannot be removed"));
                }
                self.doc.remove_column(table, col_id);
                group.push_direct(
                    DocAction::RemoveColumn { table: table.clone(), col_id: col_id.clone() },
                    DocAction::RemoveColumn { table: table.clone(), col_id: col_id.clone() },
                );
                Ok(Value::Blank)
            }
            UserAction::AddTable { table_id, columns } => {
                let table_id = table_id.clone().unwrap_or_else(|| self.sanitize_table_id("Table"));
                self.doc.add_table(crate::store::Table::new(table_id.clone()));
                for (col_id, spec) in columns {
                    self.doc.add_column(&table_id, build_column(col_id.clone(), spec));
                }
                group.push_direct(
                    DocAction::AddTable { table: table_id.clone(), columns: columns.clone() },
                    DocAction::RemoveTable { table: table_id.clone() },
                );
                Ok(Value::Text(table_id.as_str().to_string()))
            }
            UserAction::RenameTable { old, new } => {
                self.doc.rename_table(old, new.clone());
                group.push_direct(
                    DocAction::RenameTable { old: old.clone(), new: new.clone() },
                    DocAction::RenameTable { old: new.clone(), new: old.clone() },
                );
                Ok(Value::Blank)
            }
            UserAction::RemoveTable { table } => {
                self.doc.remove_table(table);
                group.push_direct(
                    DocAction::RemoveTable { table: table.clone() },
                    DocAction::RemoveTable { table: table.clone() },
                );
                Ok(Value::Blank)
            }
            UserAction::CreateViewSection { source, groupby_cols } => {
                let summary_table = crate::summary::ensure_summary_table(self.doc, source, groupby_cols)?;
                Ok(Value::Text(summary_table.as_str().to_string()))
            }
            UserAction::UpdateSummaryViewSection { summary_table, new_groupby_cols } => {
                let new_table = crate::summary::migrate_groupby(self.doc, summary_table, new_groupby_cols)?;
                Ok(Value::Text(new_table.as_str().to_string()))
            }
            UserAction::DetachSummaryViewSection { summary_table } => {
                crate::summary::detach(self.doc, summary_table);
                Ok(Value::Blank)
            }
            UserAction::ApplyUndoActions { actions } => {
                self.apply_doc_actions(actions, false);
                Ok(Value::Blank)
            }
        }
    }

    /// Applies updates via `Document::set_cell` and, for columns with `ManualUpdates`, also
    /// dirties every other `ManualUpdates` trigger column of the table for the touched rows —
    /// "recalc whenever the row is touched by a direct user action" (spec 4.4) is a pipeline
    /// concern, not something the dependency graph can express since it isn't keyed to any one
    /// column changing.
    fn apply_update(&mut self, table: &TableId, rows: &[RowId], columns: &FxHashMap<ColId, Vec<Value>>) {
        for (col_id, values) in columns {
            for (i, row) in rows.iter().enumerate() {
                if let Some(v) = values.get(i) {
                    self.doc.set_cell(table, col_id, *row, v.clone());
                }
            }
        }
        let manual = self.doc.trigger_cols_with_policy(table, &RecalcPolicy::ManualUpdates);
        if !manual.is_empty() {
            let row_set = crate::engine::RowSet::from_rows(rows.iter().copied());
            for col_id in manual {
                self.doc.invalidate(&gridcore_common::Node::new(table.clone(), col_id), &row_set);
            }
        }
    }

    /// Re-apply doc actions directly, bypassing user-action handlers entirely so trigger
    /// formulas cannot re-fire — undo's explicit values populate the prevent-recompute map by
    /// going through `Document::set_cell` (spec 4.6, "Undo actions").
    fn apply_doc_actions(&mut self, actions: &[DocAction], _is_undo: bool) {
        for action in actions {
            match action {
                DocAction::BulkAddRecord { table, row_ids, columns } => {
                    self.doc.add_rows(table, row_ids, columns);
                }
                DocAction::BulkUpdateRecord { table, row_ids, columns } => {
                    for (col_id, values) in columns {
                        for (i, row) in row_ids.iter().enumerate() {
                            if let Some(v) = values.get(i) {
                                self.doc.set_cell(table, col_id, *row, v.clone());
                            }
                        }
                    }
                }
                DocAction::BulkRemoveRecord { table, row_ids } => {
                    self.doc.remove_rows(table, row_ids);
                }
                DocAction::AddColumn { table, col_id, spec } => {
                    self.doc.add_column(table, build_column(col_id.clone(), spec));
                }
                DocAction::RemoveColumn { table, col_id } => {
                    self.doc.remove_column(table, col_id);
                }
                DocAction::RenameColumn { table, old, new } => {
                    self.doc.rename_column(table, old, new.clone());
                }
                DocAction::ModifyColumn { table, col_id, spec } => {
                    self.doc.remove_column(table, col_id);
                    self.doc.add_column(table, build_column(col_id.clone(), spec));
                }
                DocAction::AddTable { table, columns } => {
                    self.doc.add_table(crate::store::Table::new(table.clone()));
                    for (col_id, spec) in columns {
                        self.doc.add_column(table, build_column(col_id.clone(), spec));
                    }
                }
                DocAction::RemoveTable { table } => {
                    self.doc.remove_table(table);
                }
                DocAction::RenameTable { old, new } => {
                    self.doc.rename_table(old, new.clone());
                }
            }
        }
    }

    /// Step 4 (spec 4.6): drain the recompute engine (already done by the caller before this
    /// runs) and flush its accumulated changes as `BulkUpdateRecord` doc actions, one per
    /// changed node — already trimmed to exactly the rows that changed since `write_value` only
    /// records a change on a `strict_equal` mismatch (spec 4.6, "Trim step").
    fn flush_calc(&mut self, group: &mut ActionGroup) {
        let changes = self.doc.take_changes();
        let all_rows_cache: FxHashMap<TableId, Vec<RowId>> = FxHashMap::default();
        let _ = all_rows_cache;
        for (node, rows) in changes {
            let all_rows: Vec<RowId> = self
                .doc
                .store
                .table(&node.table_id)
                .map(|t| t.iter_row_ids().collect())
                .unwrap_or_default();
            let row_ids: Vec<RowId> = rows.iter_concrete(&all_rows).collect();
            let values: Vec<Value> = row_ids
                .iter()
                .map(|r| self.doc.get_cell(&node.table_id, &node.col_id, *r))
                .collect();
            let mut columns = FxHashMap::default();
            columns.insert(node.col_id.clone(), values);
            group.push_calc(DocAction::BulkUpdateRecord { table: node.table_id, row_ids, columns });
        }
    }

    /// Reconstructs the [`ColumnSpec`] a live column was built from, so `ModifyColumn`'s undo can
    /// restore the prior shape instead of re-emitting the forward spec (spec 4.6 invariant 7).
    fn column_spec_of(&self, table: &TableId, col_id: &ColId) -> Option<ColumnSpec> {
        let col = self.doc.store.table(table)?.get_column(col_id)?;
        Some(ColumnSpec {
            col_type: col.col_type,
            ref_table: col.ref_table.clone(),
            is_formula: col.is_formula,
            formula: col.formula.clone(),
            recalc_policy: col.recalc_policy.clone(),
            default_value: col.default_value.clone(),
        })
    }

    fn existing_rows(&self, table: &TableId) -> Vec<RowId> {
        self.doc.store.table(table).map(|t| t.iter_row_ids().collect()).unwrap_or_default()
    }

    fn snapshot_columns(&self, table: &TableId, rows: &[RowId]) -> FxHashMap<ColId, Vec<Value>> {
        let Some(t) = self.doc.store.table(table) else {
            return FxHashMap::default();
        };
        t.column_ids()
            .map(|c| (c.clone(), rows.iter().map(|r| t.raw_get(*r, c)).collect()))
            .collect()
    }

    fn snapshot_full_row(&self, table: &TableId, row: RowId) -> FxHashMap<ColId, Vec<Value>> {
        self.snapshot_columns(table, &[row])
    }

    fn snapshot_values<'b>(
        &self,
        table: &TableId,
        row: RowId,
        col_ids: impl Iterator<Item = &'b ColId>,
    ) -> FxHashMap<ColId, Vec<Value>> {
        let Some(t) = self.doc.store.table(table) else {
            return FxHashMap::default();
        };
        col_ids.map(|c| (c.clone(), vec![t.raw_get(row, c)])).collect()
    }

    fn snapshot_bulk<'b>(
        &self,
        table: &TableId,
        rows: &[RowId],
        col_ids: impl Iterator<Item = &'b ColId>,
    ) -> FxHashMap<ColId, Vec<Value>> {
        let Some(t) = self.doc.store.table(table) else {
            return FxHashMap::default();
        };
        col_ids
            .map(|c| (c.clone(), rows.iter().map(|r| t.raw_get(*r, c)).collect()))
            .collect()
    }

    fn convert_row_values(
        &self,
        table: &TableId,
        values: &FxHashMap<ColId, Value>,
        neg_ids: &FxHashMap<RowId, RowId>,
    ) -> FxHashMap<ColId, Vec<Value>> {
        values
            .iter()
            .map(|(c, v)| {
                let resolved = self.resolve_value(v, neg_ids);
                (c.clone(), vec![self.convert_for_column(table, c, resolved)])
            })
            .collect()
    }

    fn convert_bulk_values(
        &self,
        table: &TableId,
        columns: &FxHashMap<ColId, Vec<Value>>,
        neg_ids: &FxHashMap<RowId, RowId>,
    ) -> FxHashMap<ColId, Vec<Value>> {
        columns
            .iter()
            .map(|(c, vs)| {
                let converted = vs
                    .iter()
                    .map(|v| self.convert_for_column(table, c, self.resolve_value(v, neg_ids)))
                    .collect();
                (c.clone(), converted)
            })
            .collect()
    }

    fn sanitize_col_id(&self, table: &TableId, label: &str) -> ColId {
        let base: String = label.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
        let base = if base.is_empty() { "col".to_string() } else { base };
        let existing: Vec<ColId> = self.doc.store.table(table).map(|t| t.column_ids().cloned().collect()).unwrap_or_default();
        if !existing.iter().any(|c| c.as_str() == base) {
            return ColId::new(base);
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}{n}");
            if !existing.iter().any(|c| c.as_str() == candidate) {
                return ColId::new(candidate);
            }
            n += 1;
        }
    }

    fn sanitize_table_id(&self, base: &str) -> TableId {
        let mut n = 1;
        loop {
            let candidate = if n == 1 { base.to_string() } else { format!("{base}{n}") };
            if self.doc.store.table(&TableId::new(candidate.clone())).is_none() {
                return TableId::new(candidate);
            }
            n += 1;
        }
    }
}

fn spec_label(spec: &ColumnSpec) -> String {
    match spec.col_type {
        gridcore_common::ColumnType::Ref => "Ref".to_string(),
        _ => "Column".to_string(),
    }
}

fn build_column(col_id: ColId, spec: &ColumnSpec) -> Column {
    let mut column = Column::new(col_id, spec.col_type);
    column.default_value = spec.default_value.clone();
    column.recalc_policy = spec.recalc_policy.clone();
    if let Some(table) = &spec.ref_table {
        column = column.with_ref_table(table.clone());
    }
    if let Some(formula) = &spec.formula {
        column = column.with_formula(formula.clone());
        column.is_formula = spec.is_formula;
    }
    column
}
