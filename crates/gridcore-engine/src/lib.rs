//! gridcore-engine: the dependency graph, recompute loop, lookup indices, summary tables and
//! action pipeline that make up the document computation engine (spec 1).
//!
//! The engine never parses formula text and never picks a wire format on its own; both are
//! handed to it (compiled [`formula::Formula`] bodies, and [`gridcore_common::encoding`] at the
//! API boundary) by a collaborator. What lives here is purely the incremental-recompute core.

pub mod action;
pub mod config;
pub mod docmodel;
pub mod document;
pub mod engine;
pub mod formula;
pub mod store;
pub mod summary;

pub use action::{ActionGroup, ActionPipeline, ColumnSpec, DocAction, UserAction};
pub use config::EngineConfig;
pub use document::{Document, EvalContext, RecomputeObserver};
pub use formula::{Formula, FormulaOutcome, FormulaResult, Suspend};
pub use store::{Column, RecalcPolicy, Store, Table};

use gridcore_common::{ColId, GridError, RowId, TableId, Value};
use rustc_hash::FxHashMap;

/// `fetch_table`'s return shape (spec 6): every row id in table order, plus one value vector
/// per visible column, aligned by position with `row_ids`.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub row_ids: Vec<RowId>,
    pub columns: FxHashMap<ColId, Vec<Value>>,
}

impl Document {
    /// The engine's single inbound entry point besides loading (spec 6).
    pub fn apply_user_actions(&mut self, actions: &[UserAction]) -> Result<ActionGroup, GridError> {
        ActionPipeline::new(self).apply_user_actions(actions)
    }

    /// `fetch_table` (spec 6): every row and every non-private column's values, optionally
    /// narrowed by `query`'s `{col_id: accepted values}` equality constraints (a row must match
    /// every listed column to be included). Formula columns are included unless
    /// `include_formulas` is false.
    pub fn fetch_table(
        &self,
        table_id: &TableId,
        include_formulas: bool,
        query: Option<&FxHashMap<ColId, Vec<Value>>>,
    ) -> TableData {
        let Some(table) = self.store.table(table_id) else {
            return TableData::default();
        };
        let col_ids: Vec<ColId> = table
            .column_ids()
            .filter(|c| {
                table
                    .get_column(c)
                    .map(|col| !col.private && (include_formulas || !col.is_formula))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let row_ids: Vec<RowId> = table
            .iter_row_ids()
            .filter(|&row| match query {
                None => true,
                Some(q) => q.iter().all(|(col_id, accepted)| {
                    let v = table.raw_get(row, col_id);
                    accepted.iter().any(|a| a.strict_equal(&v))
                }),
            })
            .collect();

        let columns = col_ids
            .into_iter()
            .map(|c| {
                let values = row_ids.iter().map(|&r| table.raw_get(r, &c)).collect();
                (c, values)
            })
            .collect();

        TableData { row_ids, columns }
    }

    /// `fetch_table_schema` (spec 6): re-serialize the live schema as a JSON document, one
    /// object per table with its non-private columns.
    pub fn fetch_table_schema(&self) -> String {
        #[derive(serde::Serialize)]
        struct ColumnSchema {
            col_id: String,
            #[serde(rename = "type")]
            type_name: String,
            is_formula: bool,
        }
        #[derive(serde::Serialize)]
        struct TableSchema {
            table_id: String,
            columns: Vec<ColumnSchema>,
        }

        let tables: Vec<TableSchema> = self
            .store
            .table_ids()
            .filter(|t| !t.is_metadata())
            .filter_map(|table_id| {
                let table = self.store.table(table_id)?;
                let columns = table
                    .column_ids()
                    .filter_map(|col_id| {
                        let col = table.get_column(col_id)?;
                        if col.private {
                            return None;
                        }
                        Some(ColumnSchema {
                            col_id: col_id.as_str().to_string(),
                            type_name: format!("{:?}", col.col_type),
                            is_formula: col.is_formula,
                        })
                    })
                    .collect();
                Some(TableSchema { table_id: table_id.as_str().to_string(), columns })
            })
            .collect();

        serde_json::to_string(&tables).unwrap_or_default()
    }

    /// `get_formula_error` (spec 6): force `(table_id, col_id, row_id)` to (re)evaluate
    /// synchronously, independent of the recompute queue, and return whatever value landed in
    /// the cell — including any pending request it raised along the way, resolved as far as
    /// already-cached answers allow.
    pub fn get_formula_error(&mut self, table_id: &TableId, col_id: &ColId, row_id: RowId) -> Value {
        self.reevaluate_cell(table_id, col_id, row_id)
    }

    /// `autocomplete` (spec 6): a collaborator concern (formula-language-aware completion) the
    /// engine does not implement; exposed as a stub so a host can see the entry point exists
    /// without this crate depending on any particular formula language's parser.
    pub fn autocomplete(&self, _prefix: &str, _table_id: &TableId, _col_id: &ColId, _row_id: RowId) -> Vec<String> {
        Vec::new()
    }
}
