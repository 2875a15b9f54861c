//! A typed, possibly-computed sequence of cells keyed by row id (spec 3, "Column").

use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, RowId, TableId, Value};
use rustc_hash::FxHashMap;

use crate::formula::Formula;

/// How a non-formula column's trigger formula recalculates (spec 3, 4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcPolicy {
    /// Recalc only on new-record insertion.
    Default,
    /// Never recalc automatically.
    Never,
    /// Recalc whenever the row is touched by a direct user action.
    ManualUpdates,
    /// Recalc when any of the listed columns in the same row changes.
    ExplicitDeps(Vec<ColId>),
}

pub struct Column {
    pub col_id: ColId,
    pub col_type: ColumnType,
    /// Present for `Ref`/`RefList` columns: the table a reference points into.
    pub ref_table: Option<TableId>,
    pub is_formula: bool,
    pub formula: Option<Rc<dyn Formula>>,
    pub default_value: Value,
    pub visible: bool,
    pub recalc_policy: RecalcPolicy,
    /// Two-way ref partner column, if this column participates in a two-way reference pair.
    pub reverse_col: Option<ColId>,
    /// True for synthetic columns (lookup indices, internal helper columns) that should never
    /// be surfaced by `fetch_table` or emitted in doc actions — mirrors `col.is_private()`.
    pub private: bool,

    values: FxHashMap<RowId, Value>,
}

impl Column {
    pub fn new(col_id: impl Into<ColId>, col_type: ColumnType) -> Self {
        Self {
            col_id: col_id.into(),
            col_type,
            ref_table: None,
            is_formula: false,
            formula: None,
            default_value: Value::Blank,
            visible: true,
            recalc_policy: RecalcPolicy::Default,
            reverse_col: None,
            private: false,
            values: FxHashMap::default(),
        }
    }

    pub fn with_formula(mut self, formula: Rc<dyn Formula>) -> Self {
        self.is_formula = true;
        self.formula = Some(formula);
        self
    }

    pub fn with_ref_table(mut self, table: TableId) -> Self {
        self.ref_table = Some(table);
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self.visible = false;
        self
    }

    /// Whether this column's cells ever need a formula call: true formula columns, and data
    /// columns with a default-value formula for newly-added records (spec 4.4: "Only columns
    /// whose `.has_formula()` is true should ever have invalidated rows in recompute_map").
    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }

    pub fn raw_get(&self, row: RowId) -> Value {
        self.values.get(&row).cloned().unwrap_or_else(|| self.default_value.clone())
    }

    pub fn set(&mut self, row: RowId, value: Value) {
        self.values.insert(row, value);
    }

    pub fn unset(&mut self, row: RowId) {
        self.values.remove(&row);
    }
}
