//! Document model facade (spec 4.8): typed accessors over the metadata tables that describe
//! the document's own schema (`_grist_Tables`, `_grist_Tables_column`, `_grist_Views`, ...).
//!
//! These tables live in the same [`crate::store::Store`] as user data and go through the same
//! [`crate::action::ActionPipeline`] — `update_record`/`remove_table_record` below are thin
//! wrappers around `apply_user_actions` rather than a separate mutation path, so schema changes
//! made through the facade stay consistent with ones made by replaying doc actions directly
//! (spec 4.8: "ultimately call the same BulkUpdateRecord/BulkRemoveRecord handlers").

use gridcore_common::{ColId, ColumnType, GridError, RowId, TableId, Value};
use rustc_hash::FxHashMap;

use crate::action::{ActionGroup, UserAction};
use crate::document::Document;
use crate::store::Column;

pub const TABLES: &str = "_grist_Tables";
pub const TABLES_COLUMN: &str = "_grist_Tables_column";
pub const VIEWS: &str = "_grist_Views";
pub const VIEWS_SECTION: &str = "_grist_Views_section";
pub const VIEWS_SECTION_FIELD: &str = "_grist_Views_section_field";
pub const PAGES: &str = "_grist_Pages";
pub const TAB_BAR: &str = "_grist_TabBar";
pub const TABLE_VIEWS: &str = "_grist_TableViews";

/// Install the empty metadata tables (spec 4.8). Idempotent: a table already present (e.g. from
/// a prior `load_meta_tables` call) is left untouched.
pub fn install_metadata_tables(doc: &mut Document) {
    add_if_missing(doc, TABLES, &[
        ("tableId", ColumnType::Text),
        ("primaryViewId", ColumnType::Int),
        ("summarySourceTable", ColumnType::Int),
        ("onDemand", ColumnType::Bool),
    ]);
    add_if_missing(doc, TABLES_COLUMN, &[
        ("parentId", ColumnType::Int),
        ("parentPos", ColumnType::Float),
        ("colId", ColumnType::Text),
        ("label", ColumnType::Text),
        ("type", ColumnType::Text),
        ("isFormula", ColumnType::Bool),
        ("formula", ColumnType::Text),
        ("widgetOptions", ColumnType::Text),
        ("summarySourceCol", ColumnType::Int),
        ("displayCol", ColumnType::Int),
        ("visibleCol", ColumnType::Int),
    ]);
    add_if_missing(doc, VIEWS, &[("name", ColumnType::Text), ("type", ColumnType::Text)]);
    add_if_missing(doc, VIEWS_SECTION, &[
        ("tableRef", ColumnType::Int),
        ("parentId", ColumnType::Int),
        ("parentKey", ColumnType::Text),
        ("title", ColumnType::Text),
    ]);
    add_if_missing(doc, VIEWS_SECTION_FIELD, &[
        ("parentId", ColumnType::Int),
        ("colRef", ColumnType::Int),
        ("parentPos", ColumnType::Float),
        ("width", ColumnType::Int),
    ]);
    add_if_missing(doc, PAGES, &[
        ("viewRef", ColumnType::Int),
        ("indentation", ColumnType::Int),
        ("pagePos", ColumnType::Float),
    ]);
    add_if_missing(doc, TAB_BAR, &[("viewRef", ColumnType::Int), ("tabPos", ColumnType::Float)]);
    add_if_missing(doc, TABLE_VIEWS, &[("tableRef", ColumnType::Int), ("viewRef", ColumnType::Int)]);
}

fn add_if_missing(doc: &mut Document, table: &str, columns: &[(&str, ColumnType)]) {
    let table_id = TableId::new(table);
    if doc.store.table(&table_id).is_some() {
        return;
    }
    doc.add_table(crate::store::Table::new(table_id.clone()));
    for (col_id, col_type) in columns {
        doc.add_column(&table_id, Column::new(ColId::new(*col_id), *col_type));
    }
}

/// `load_meta_tables` (spec 6): install the metadata schema, then populate it from already
/// boot-serialized rows. No recomputation runs here; formula columns (there are none among the
/// metadata tables themselves, but user formulas reading them) recompute on first demand.
pub fn load_meta_tables(
    doc: &mut Document,
    tables_rows: (Vec<RowId>, FxHashMap<ColId, Vec<Value>>),
    columns_rows: (Vec<RowId>, FxHashMap<ColId, Vec<Value>>),
) {
    install_metadata_tables(doc);
    load_table(doc, &TableId::new(TABLES), tables_rows.0, tables_rows.1);
    load_table(doc, &TableId::new(TABLES_COLUMN), columns_rows.0, columns_rows.1);
}

/// `load_table` (spec 6): append already-serialized rows to a table outside the action pipeline
/// — no undo entry, no doc action emitted, and (per spec) no recompute pass triggered here.
pub fn load_table(doc: &mut Document, table_id: &TableId, row_ids: Vec<RowId>, columns: FxHashMap<ColId, Vec<Value>>) {
    doc.add_rows(table_id, &row_ids, &columns);
}

#[derive(Debug, Clone)]
pub struct TableRecord {
    pub row: RowId,
    pub table_id: TableId,
}

/// All rows of `_grist_Tables` (spec 4.8).
pub fn tables(doc: &Document) -> Vec<TableRecord> {
    let table_id = TableId::new(TABLES);
    doc.store
        .table(&table_id)
        .map(|t| {
            t.iter_row_ids()
                .map(|row| TableRecord {
                    row,
                    table_id: match doc.get_cell(&table_id, &ColId::new("tableId"), row) {
                        Value::Text(s) => TableId::new(s),
                        _ => TableId::new(""),
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `lookupOne`-equivalent for `_grist_Tables.tableId` (spec 4.8). Metadata tables are small
/// enough that a linear scan beats standing up a full lookup index for this one field.
pub fn table_record_by_id(doc: &Document, table_id: &TableId) -> Option<TableRecord> {
    tables(doc).into_iter().find(|t| &t.table_id == table_id)
}

#[derive(Debug, Clone)]
pub struct ColumnRecord {
    pub row: RowId,
    pub parent: RowId,
    pub col_id: ColId,
    pub type_name: String,
    pub is_formula: bool,
}

/// Rows of `_grist_Tables_column` belonging to the `_grist_Tables` row `parent`.
pub fn columns_of(doc: &Document, parent: RowId) -> Vec<ColumnRecord> {
    let table_id = TableId::new(TABLES_COLUMN);
    doc.store
        .table(&table_id)
        .map(|t| {
            t.iter_row_ids()
                .filter(|&row| matches!(doc.get_cell(&table_id, &ColId::new("parentId"), row), Value::Int(p) if p == parent.0))
                .map(|row| ColumnRecord {
                    row,
                    parent,
                    col_id: match doc.get_cell(&table_id, &ColId::new("colId"), row) {
                        Value::Text(s) => ColId::new(s),
                        _ => ColId::new(""),
                    },
                    type_name: match doc.get_cell(&table_id, &ColId::new("type"), row) {
                        Value::Text(s) => s,
                        _ => String::new(),
                    },
                    is_formula: matches!(doc.get_cell(&table_id, &ColId::new("isFormula"), row), Value::Bool(true)),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The live schema actually installed in `doc.store`: `(table_id, col_id, is_formula)` triples,
/// independent of what `_grist_Tables`/`_grist_Tables_column` say. Invariant 1 (spec 8) is
/// `live_schema(doc) == schema_from_metadata(doc)`.
pub fn live_schema(doc: &Document) -> Vec<(TableId, ColId, bool)> {
    let mut out = Vec::new();
    for table_id in doc.store.table_ids() {
        if table_id.is_metadata() {
            continue;
        }
        if let Some(table) = doc.store.table(table_id) {
            for col_id in table.column_ids() {
                if let Some(col) = table.get_column(col_id) {
                    if !col.private {
                        out.push((table_id.clone(), col_id.clone(), col.is_formula));
                    }
                }
            }
        }
    }
    out.sort();
    out
}

/// The schema as recorded by `_grist_Tables`/`_grist_Tables_column` (spec 8, invariant 1).
pub fn schema_from_metadata(doc: &Document) -> Vec<(TableId, ColId, bool)> {
    let mut out = Vec::new();
    for table in tables(doc) {
        for col in columns_of(doc, table.row) {
            out.push((table.table_id.clone(), col.col_id, col.is_formula));
        }
    }
    out.sort();
    out
}

/// Reconcile `_grist_Tables`/`_grist_Tables_column` with `live_schema(doc)` (spec 8 invariant 1:
/// `live_schema(doc) == schema_from_metadata(doc)` must hold after any sequence of user actions).
/// Called once per `apply_user_actions` bundle, after every schema-changing doc action in the
/// bundle has already run, so metadata consistency looks automatic to a caller. Existing rows
/// are reused (by `tableId`/`colId`) rather than wiped and rebuilt, so `_grist_Tables` row ids
/// stay stable across bundles for anything that references them (e.g. `_grist_Views_section.
/// tableRef`). A simplification from real Grist, which drives schema changes FROM metadata
/// writes rather than mirroring metadata off schema changes after the fact (noted in DESIGN.md).
pub(crate) fn resync_metadata(doc: &mut Document) {
    install_metadata_tables(doc);

    let mut live_tables: Vec<TableId> = doc.store.table_ids().filter(|t| !t.is_metadata()).cloned().collect();
    live_tables.sort();

    let tables_table = TableId::new(TABLES);
    let columns_table = TableId::new(TABLES_COLUMN);

    let existing = tables(doc);
    let mut table_row_of: FxHashMap<TableId, RowId> =
        existing.iter().map(|rec| (rec.table_id.clone(), rec.row)).collect();

    let stale_table_rows: Vec<RowId> =
        existing.iter().filter(|rec| !live_tables.contains(&rec.table_id)).map(|rec| rec.row).collect();
    if !stale_table_rows.is_empty() {
        let orphaned_cols: Vec<RowId> = stale_table_rows
            .iter()
            .flat_map(|&parent| columns_of(doc, parent))
            .map(|rec| rec.row)
            .collect();
        if !orphaned_cols.is_empty() {
            doc.remove_rows(&columns_table, &orphaned_cols);
        }
        doc.remove_rows(&tables_table, &stale_table_rows);
    }

    let mut next_table_row = existing.iter().map(|rec| rec.row.0).max().unwrap_or(0) + 1;
    let mut new_table_rows = Vec::new();
    let mut new_table_ids = Vec::new();
    for table_id in &live_tables {
        if !table_row_of.contains_key(table_id) {
            let row = RowId(next_table_row);
            next_table_row += 1;
            table_row_of.insert(table_id.clone(), row);
            new_table_rows.push(row);
            new_table_ids.push(Value::Text(table_id.as_str().to_string()));
        }
    }
    if !new_table_rows.is_empty() {
        let mut cols: FxHashMap<ColId, Vec<Value>> = FxHashMap::default();
        cols.insert(ColId::new("tableId"), new_table_ids);
        doc.add_rows(&tables_table, &new_table_rows, &cols);
    }

    let mut next_col_row =
        doc.store.table(&columns_table).map(|t| t.iter_row_ids().map(|r| r.0).max().unwrap_or(0) + 1).unwrap_or(1);

    for table_id in &live_tables {
        let Some(&parent_row) = table_row_of.get(table_id) else { continue };

        let mut live_cols: Vec<(ColId, ColumnType, bool)> = doc
            .store
            .table(table_id)
            .map(|t| {
                t.column_ids()
                    .filter_map(|c| {
                        t.get_column(c).filter(|col| !col.private).map(|col| (c.clone(), col.col_type, col.is_formula))
                    })
                    .collect()
            })
            .unwrap_or_default();
        live_cols.sort_by(|a, b| a.0.cmp(&b.0));

        let existing_cols = columns_of(doc, parent_row);
        let stale: Vec<RowId> = existing_cols
            .iter()
            .filter(|rec| !live_cols.iter().any(|(id, _, _)| id == &rec.col_id))
            .map(|rec| rec.row)
            .collect();
        if !stale.is_empty() {
            doc.remove_rows(&columns_table, &stale);
        }

        for (col_id, col_type, is_formula) in &live_cols {
            if let Some(rec) = existing_cols.iter().find(|rec| &rec.col_id == col_id) {
                let type_name = format!("{col_type:?}");
                if rec.type_name != type_name || rec.is_formula != *is_formula {
                    doc.set_cell(&columns_table, &ColId::new("type"), rec.row, Value::Text(type_name));
                    doc.set_cell(&columns_table, &ColId::new("isFormula"), rec.row, Value::Bool(*is_formula));
                }
                continue;
            }
            let row = RowId(next_col_row);
            next_col_row += 1;
            let mut cols: FxHashMap<ColId, Vec<Value>> = FxHashMap::default();
            cols.insert(ColId::new("parentId"), vec![Value::Int(parent_row.0)]);
            cols.insert(ColId::new("colId"), vec![Value::Text(col_id.as_str().to_string())]);
            cols.insert(ColId::new("type"), vec![Value::Text(format!("{col_type:?}"))]);
            cols.insert(ColId::new("isFormula"), vec![Value::Bool(*is_formula)]);
            doc.add_rows(&columns_table, &[row], &cols);
        }
    }
}

/// Update helper routed through `apply_user_actions` so metadata edits go through the same
/// undo/trim machinery as any other edit (spec 4.8).
pub fn update_record(
    doc: &mut Document,
    table: &str,
    row_id: RowId,
    values: FxHashMap<ColId, Value>,
) -> Result<ActionGroup, GridError> {
    doc.apply_user_actions(&[UserAction::UpdateRecord { table: TableId::new(table), row_id, values }])
}

pub fn remove_record(doc: &mut Document, table: &str, row_id: RowId) -> Result<ActionGroup, GridError> {
    doc.apply_user_actions(&[UserAction::RemoveRecord { table: TableId::new(table), row_id }])
}
