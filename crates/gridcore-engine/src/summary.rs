//! Summary (group-by) tables (spec 4.7).
//!
//! A summary table's rows are the distinct groupby tuples of a source table. It is built once
//! from two formula-column mechanisms the engine already has, rather than any bespoke
//! maintenance code:
//!
//! - a private helper column on the *source*, `#summary#{summary_table_id}`, whose formula
//!   calls [`crate::document::EvalContext::lookup_or_add_derived`] on the summary table;
//! - a `group: RefList` column on the *summary*, whose formula is the inverse lookup back into
//!   the source via [`crate::document::EvalContext::lookup_records`].
//!
//! Because both are ordinary dependency-graph formulas, summary rows stay current across
//! incremental source edits for free.

use std::rc::Rc;

use gridcore_common::{ColId, GridError, GridErrorKind, Node, RowId, TableId, Value};

use crate::document::{Document, EvalContext};
use crate::formula::{Formula, FormulaResult};
use crate::store::{Column, Table};

/// Which source table and groupby columns a summary table was derived from.
#[derive(Clone)]
pub struct SummaryInfo {
    pub source: TableId,
    pub groupby_cols: Vec<ColId>,
}

/// `source_tableId + "_summary_" + sorted(groupby_colIds)` (spec 4.7). Sorting the column ids
/// means two `CreateViewSection` calls naming the same groupby set in a different order land on
/// the same canonical table.
pub fn canonical_table_id(source: &TableId, groupby_cols: &[ColId]) -> TableId {
    let mut sorted: Vec<&ColId> = groupby_cols.iter().collect();
    sorted.sort();
    let cols_part = sorted.iter().map(|c| c.as_str()).collect::<Vec<_>>().join("_");
    TableId::new(format!("{}_summary_{cols_part}", source.as_str()))
}

pub fn source_of(doc: &Document, summary_table: &TableId) -> Option<TableId> {
    doc.summary_info(summary_table).map(|info| info.source.clone())
}

fn helper_col_id(summary_table: &TableId) -> ColId {
    ColId::new(format!("#summary#{}", summary_table.as_str()))
}

/// Colid every summary table's group-membership column is stored under (spec §3/4.7's `group`
/// field), and the derived row count alongside it.
const GROUP_COL: &str = "group";
const COUNT_COL: &str = "count";

/// Build (or reuse) the canonical summary table for `source` grouped by `groupby_cols`
/// (spec 4.7, `CreateViewSection`/`UpdateSummaryViewSection`).
pub fn ensure_summary_table(
    doc: &mut Document,
    source: &TableId,
    groupby_cols: &[ColId],
) -> Result<TableId, GridError> {
    let summary_table = canonical_table_id(source, groupby_cols);
    if doc.store.table(&summary_table).is_some() {
        return Ok(summary_table);
    }

    let source_table = doc
        .store
        .table(source)
        .ok_or_else(|| GridError::new(GridErrorKind::NotFound).with_message(format!("no such table: {source}")))?;

    let mut groupby_specs = Vec::with_capacity(groupby_cols.len());
    for col_id in groupby_cols {
        let col = source_table.get_column(col_id).ok_or_else(|| {
            GridError::new(GridErrorKind::NotFound).with_message(format!("no such column: {source}.{col_id}"))
        })?;
        groupby_specs.push((col_id.clone(), col.col_type, col.ref_table.clone()));
    }
    let sister_formulas: Vec<(ColId, gridcore_common::ColumnType, Rc<dyn Formula>)> = source_table
        .column_ids()
        .filter_map(|col_id| {
            let col = source_table.get_column(col_id)?;
            if col.is_formula && !col.private {
                col.formula.clone().map(|f| (col_id.clone(), col.col_type, f))
            } else {
                None
            }
        })
        .collect();

    doc.add_table(Table::new(summary_table.clone()));
    for (col_id, col_type, ref_table) in &groupby_specs {
        let mut column = Column::new(col_id.clone(), *col_type);
        if let Some(t) = ref_table {
            column = column.with_ref_table(t.clone());
        }
        doc.add_column(&summary_table, column);
    }
    for (col_id, col_type, formula) in sister_formulas {
        doc.add_column(&summary_table, Column::new(col_id, col_type).with_formula(formula));
    }
    doc.add_column(
        &summary_table,
        Column::new(ColId::new(GROUP_COL), gridcore_common::ColumnType::RefList)
            .with_ref_table(source.clone())
            .with_formula(Rc::new(GroupFormula {
                source: source.clone(),
                groupby_cols: groupby_cols.to_vec(),
            })),
    );
    doc.add_column(
        &summary_table,
        Column::new(ColId::new(COUNT_COL), gridcore_common::ColumnType::Int)
            .with_formula(Rc::new(CountFormula)),
    );

    doc.add_column(
        source,
        Column::new(helper_col_id(&summary_table), gridcore_common::ColumnType::Ref)
            .with_ref_table(summary_table.clone())
            .with_formula(Rc::new(HelperColumnFormula {
                summary_table: summary_table.clone(),
                groupby_cols: groupby_cols.to_vec(),
            }))
            .private(),
    );

    doc.register_summary(
        summary_table.clone(),
        SummaryInfo {
            source: source.clone(),
            groupby_cols: groupby_cols.to_vec(),
        },
    );

    Ok(summary_table)
}

/// `UpdateSummaryViewSection` (spec 4.7): point at the canonical table for `new_groupby_cols`,
/// garbage-collecting `old_summary` if nothing keeps it populated afterward. Field migration by
/// colId is implicit: a groupby/sister column that exists under the same colId in both tables
/// keeps working without any copy step since view sections address fields by colId, not by
/// table-local position.
pub fn migrate_groupby(
    doc: &mut Document,
    old_summary: &TableId,
    new_groupby_cols: &[ColId],
) -> Result<TableId, GridError> {
    let source = source_of(doc, old_summary)
        .ok_or_else(|| GridError::new(GridErrorKind::NotFound).with_message("not a summary table"))?;
    let new_table = ensure_summary_table(doc, &source, new_groupby_cols)?;
    if &new_table != old_summary {
        gc_if_unused(doc, old_summary);
    }
    Ok(new_table)
}

/// Detach a summary table from automatic maintenance (spec 4.7): stop the source from feeding
/// it new rows, but leave the table and its current rows in place as plain data.
pub fn detach(doc: &mut Document, summary_table: &TableId) {
    let info = doc.summary_info(summary_table).cloned();
    if let Some(info) = info {
        doc.remove_column(&info.source, &helper_col_id(summary_table));
    }
    doc.unregister_summary(summary_table);
}

/// Removes `summary_table` entirely if its source no longer feeds it any rows (spec 4.7:
/// "garbage-collects unused summaries"). A summary with outstanding rows is left alone — those
/// rows may still be referenced by saved views even without an active helper column.
fn gc_if_unused(doc: &mut Document, summary_table: &TableId) {
    let empty = doc.store.table(summary_table).map(|t| t.num_rows() == 0).unwrap_or(true);
    if empty {
        detach(doc, summary_table);
        doc.remove_table(summary_table);
    }
}

/// Broadcast a formula-column edit from `table`/`col_id` to every sister column that shares the
/// same source and colId (spec 4.7: "A formula column edit in any summary sister is broadcast
/// to all sisters with the same source table and colId"). `table` may be the source itself or
/// any one of its summaries; either way every other member of the family is updated in place.
pub fn broadcast_formula_edit(doc: &mut Document, table: &TableId, col_id: &ColId, formula: Rc<dyn Formula>) {
    let source = source_of(doc, table).unwrap_or_else(|| table.clone());
    let mut family = doc.summaries_of_source(&source);
    family.push(source.clone());
    for member in family {
        if doc.store.table(&member).and_then(|t| t.get_column(col_id)).is_some() {
            doc.set_column_formula(&member, col_id, formula.clone());
        }
    }
}

/// True if `col_id` is a groupby column of `table`, which editing handlers must reject changes
/// to (spec 4.7: "cannot be edited, renamed, retyped, or converted to/from formula").
pub fn is_groupby_column(doc: &Document, table: &TableId, col_id: &ColId) -> bool {
    doc.summary_info(table)
        .map(|info| info.groupby_cols.contains(col_id))
        .unwrap_or(false)
}

/// A row of a summary table is never removed directly; it disappears on its own once `group`
/// recomputes to empty. Editing handlers consult this before a direct remove (spec 4.7).
pub fn is_summary_table(doc: &Document, table: &TableId) -> bool {
    doc.summary_info(table).is_some()
}

/// Called right after any cell write lands (`Document::write_value`): a summary row's `group`
/// recomputing to an empty `RefList` means its last source member just left, so the row itself
/// disappears (spec 4.7, S4 "removing it if it becomes empty", S6 "both rows are gone"). The
/// source's own `#summary#{...}` helper column already drops its reference to the row the moment
/// the row stops existing, so no dangling `Ref` is left behind.
pub(crate) fn drop_row_if_group_emptied(doc: &mut Document, node: &Node, row: RowId) {
    if node.col_id.as_str() != GROUP_COL || !is_summary_table(doc, &node.table_id) {
        return;
    }
    let empty = match doc.get_cell(&node.table_id, &node.col_id, row) {
        Value::RefList(_, rows) => rows.is_empty(),
        _ => true,
    };
    if empty {
        let table = node.table_id.clone();
        doc.remove_rows(&table, &[row]);
    }
}

struct GroupFormula {
    source: TableId,
    groupby_cols: Vec<ColId>,
}

impl Formula for GroupFormula {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult {
        let summary_table = ctx.current_node().table_id.clone();
        let mut key_values = Vec::with_capacity(self.groupby_cols.len());
        for col_id in &self.groupby_cols {
            key_values.push(ctx.get(&Node::new(summary_table.clone(), col_id.clone()), row)?);
        }
        let contains = vec![false; self.groupby_cols.len()];
        let rows = ctx.lookup_records(&self.source, &self.groupby_cols, &contains, &key_values)?;
        Ok(Value::RefList(self.source.clone(), rows))
    }
}

/// `len($group)` (spec invariant 5: `row.count = |row.group|`).
struct CountFormula;

impl Formula for CountFormula {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult {
        let summary_table = ctx.current_node().table_id.clone();
        let group = ctx.get(&Node::new(summary_table, ColId::new(GROUP_COL)), row)?;
        let count = match group {
            Value::RefList(_, rows) => rows.len() as i64,
            _ => 0,
        };
        Ok(Value::Int(count))
    }
}

struct HelperColumnFormula {
    summary_table: TableId,
    groupby_cols: Vec<ColId>,
}

impl Formula for HelperColumnFormula {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult {
        let source = ctx.current_node().table_id.clone();
        let mut key_values = Vec::with_capacity(self.groupby_cols.len());
        for col_id in &self.groupby_cols {
            key_values.push(ctx.get(&Node::new(source.clone(), col_id.clone()), row)?);
        }
        let summary_row = ctx.lookup_or_add_derived(&self.summary_table, &self.groupby_cols, &key_values)?;
        Ok(Value::Ref(self.summary_table.clone(), summary_row))
    }
}
