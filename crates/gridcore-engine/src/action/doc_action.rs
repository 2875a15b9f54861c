//! Doc actions: the only operations that actually mutate the store (spec 4.6).

use gridcore_common::{ColId, RowId, TableId, Value};
use rustc_hash::FxHashMap;

use super::ColumnSpec;

#[derive(Clone)]
pub enum DocAction {
    BulkAddRecord {
        table: TableId,
        row_ids: Vec<RowId>,
        columns: FxHashMap<ColId, Vec<Value>>,
    },
    BulkUpdateRecord {
        table: TableId,
        row_ids: Vec<RowId>,
        columns: FxHashMap<ColId, Vec<Value>>,
    },
    BulkRemoveRecord {
        table: TableId,
        row_ids: Vec<RowId>,
    },
    AddColumn {
        table: TableId,
        col_id: ColId,
        spec: ColumnSpec,
    },
    RemoveColumn {
        table: TableId,
        col_id: ColId,
    },
    RenameColumn {
        table: TableId,
        old: ColId,
        new: ColId,
    },
    ModifyColumn {
        table: TableId,
        col_id: ColId,
        spec: ColumnSpec,
    },
    AddTable {
        table: TableId,
        columns: Vec<(ColId, ColumnSpec)>,
    },
    RemoveTable {
        table: TableId,
    },
    RenameTable {
        old: TableId,
        new: TableId,
    },
}

impl DocAction {
    /// The canonical doc-action name as it appears on the wire envelope (spec 6: "a list whose
    /// first element is the action name").
    pub fn name(&self) -> &'static str {
        match self {
            DocAction::BulkAddRecord { .. } => "BulkAddRecord",
            DocAction::BulkUpdateRecord { .. } => "BulkUpdateRecord",
            DocAction::BulkRemoveRecord { .. } => "BulkRemoveRecord",
            DocAction::AddColumn { .. } => "AddColumn",
            DocAction::RemoveColumn { .. } => "RemoveColumn",
            DocAction::RenameColumn { .. } => "RenameColumn",
            DocAction::ModifyColumn { .. } => "ModifyColumn",
            DocAction::AddTable { .. } => "AddTable",
            DocAction::RemoveTable { .. } => "RemoveTable",
            DocAction::RenameTable { .. } => "RenameTable",
        }
    }
}
