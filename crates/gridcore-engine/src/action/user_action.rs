//! User actions: the inbound request shape (spec 4.6).

use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, RowId, TableId, Value};
use rustc_hash::FxHashMap;

use super::doc_action::DocAction;
use crate::formula::Formula;

/// A column's engine-visible schema, opaque formula body aside (spec 1: the engine never
/// parses formula text — `formula` is whatever compiled [`Formula`] impl a codegen collaborator
/// hands the engine; `AddColumn`/`ModifyColumn` carry it through rather than a source string).
#[derive(Clone)]
pub struct ColumnSpec {
    pub col_type: ColumnType,
    pub ref_table: Option<TableId>,
    pub is_formula: bool,
    pub formula: Option<Rc<dyn Formula>>,
    pub recalc_policy: crate::store::RecalcPolicy,
    pub default_value: Value,
}

impl ColumnSpec {
    pub fn data(col_type: ColumnType) -> Self {
        Self {
            col_type,
            ref_table: None,
            is_formula: false,
            formula: None,
            recalc_policy: crate::store::RecalcPolicy::Default,
            default_value: Value::Blank,
        }
    }

    pub fn formula(col_type: ColumnType, formula: Rc<dyn Formula>) -> Self {
        Self {
            col_type,
            ref_table: None,
            is_formula: true,
            formula: Some(formula),
            recalc_policy: crate::store::RecalcPolicy::Default,
            default_value: Value::Blank,
        }
    }
}

#[derive(Clone)]
pub enum UserAction {
    AddRecord {
        table: TableId,
        row_id: Option<RowId>,
        values: FxHashMap<ColId, Value>,
    },
    BulkAddRecord {
        table: TableId,
        row_ids: Option<Vec<RowId>>,
        columns: FxHashMap<ColId, Vec<Value>>,
    },
    ReplaceTableData {
        table: TableId,
        row_ids: Vec<RowId>,
        columns: FxHashMap<ColId, Vec<Value>>,
    },
    UpdateRecord {
        table: TableId,
        row_id: RowId,
        values: FxHashMap<ColId, Value>,
    },
    BulkUpdateRecord {
        table: TableId,
        row_ids: Vec<RowId>,
        columns: FxHashMap<ColId, Vec<Value>>,
    },
    RemoveRecord {
        table: TableId,
        row_id: RowId,
    },
    BulkRemoveRecord {
        table: TableId,
        row_ids: Vec<RowId>,
    },
    AddColumn {
        table: TableId,
        col_id: Option<ColId>,
        spec: ColumnSpec,
    },
    ModifyColumn {
        table: TableId,
        col_id: ColId,
        spec: ColumnSpec,
    },
    RenameColumn {
        table: TableId,
        old: ColId,
        new: ColId,
    },
    RemoveColumn {
        table: TableId,
        col_id: ColId,
    },
    AddTable {
        table_id: Option<TableId>,
        columns: Vec<(ColId, ColumnSpec)>,
    },
    RenameTable {
        old: TableId,
        new: TableId,
    },
    RemoveTable {
        table: TableId,
    },
    /// Create a summary table for `source` grouped by `groupby_cols`, reusing the canonical
    /// table if one already exists for that groupby set (spec 4.7).
    CreateViewSection {
        source: TableId,
        groupby_cols: Vec<ColId>,
    },
    /// Replace a summary view section's groupby set, migrating fields by colId and
    /// garbage-collecting the summary it leaves behind if unused (spec 4.7).
    UpdateSummaryViewSection {
        summary_table: TableId,
        new_groupby_cols: Vec<ColId>,
    },
    /// Detach a summary view section into a plain, no-longer-derived table (spec 4.7).
    DetachSummaryViewSection { summary_table: TableId },
    ApplyUndoActions { actions: Vec<DocAction> },
}
