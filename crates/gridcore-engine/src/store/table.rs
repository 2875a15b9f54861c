//! An ordered sequence of row ids plus a mapping from col_id to [`Column`] (spec 3, "Table").

use gridcore_common::{ColId, Node, RowId, TableId, Value};
use rustc_hash::FxHashMap;

use super::column::Column;

pub struct Table {
    pub table_id: TableId,
    row_ids: Vec<RowId>,
    col_order: Vec<ColId>,
    columns: FxHashMap<ColId, Column>,
    next_row_id: i64,
    /// Columns in other tables whose `Ref*` type points at this table.
    back_references: Vec<Node>,
}

impl Table {
    pub fn new(table_id: impl Into<TableId>) -> Self {
        Self {
            table_id: table_id.into(),
            row_ids: Vec::new(),
            col_order: Vec::new(),
            columns: FxHashMap::default(),
            next_row_id: 1,
            back_references: Vec::new(),
        }
    }

    pub fn add_column(&mut self, column: Column) {
        if !self.columns.contains_key(&column.col_id) {
            self.col_order.push(column.col_id.clone());
        }
        self.columns.insert(column.col_id.clone(), column);
    }

    pub fn remove_column(&mut self, col_id: &ColId) -> Option<Column> {
        self.col_order.retain(|c| c != col_id);
        self.columns.remove(col_id)
    }

    pub fn rename_column(&mut self, old: &ColId, new: ColId) {
        if let Some(mut col) = self.columns.remove(old) {
            col.col_id = new.clone();
            if let Some(slot) = self.col_order.iter_mut().find(|c| *c == old) {
                *slot = new.clone();
            }
            self.columns.insert(new, col);
        }
    }

    pub fn get_column(&self, col_id: &ColId) -> Option<&Column> {
        self.columns.get(col_id)
    }

    pub fn get_column_mut(&mut self, col_id: &ColId) -> Option<&mut Column> {
        self.columns.get_mut(col_id)
    }

    pub fn column_ids(&self) -> impl Iterator<Item = &ColId> {
        self.col_order.iter()
    }

    pub fn iter_row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.row_ids.iter().copied()
    }

    pub fn num_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn has_row(&self, row: RowId) -> bool {
        self.row_ids.binary_search(&row).is_ok()
    }

    pub fn back_references(&self) -> &[Node] {
        &self.back_references
    }

    pub fn add_back_reference(&mut self, node: Node) {
        if !self.back_references.contains(&node) {
            self.back_references.push(node);
        }
    }

    pub fn remove_back_reference(&mut self, node: &Node) {
        self.back_references.retain(|n| n != node);
    }

    /// Assign the next free row id. Used when a doc action supplies `None`/negative row ids
    /// (spec 4.2); the caller is responsible for resolving negative-id references within a
    /// bundle before they reach the store.
    pub fn allocate_row_id(&mut self) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        id
    }

    /// Ensure at least `size` rows exist (ids `1..=size`), filling any gaps with default
    /// values (spec 4.2, `grow_to`). Used by bulk loads of dense tables.
    pub fn grow_to(&mut self, size: i64) {
        for i in 1..=size {
            let row = RowId(i);
            if !self.has_row(row) {
                self.insert_row_id(row);
            }
        }
        self.next_row_id = self.next_row_id.max(size + 1);
    }

    fn insert_row_id(&mut self, row: RowId) {
        match self.row_ids.binary_search(&row) {
            Ok(_) => {}
            Err(pos) => self.row_ids.insert(pos, row),
        }
    }

    /// Add rows with explicit ids and per-column values. Rows may reappear after a prior
    /// removal only by being explicitly re-added with the same id (spec 4.2, undo path).
    pub fn add_rows(&mut self, row_ids: &[RowId], col_values: &FxHashMap<ColId, Vec<Value>>) {
        for (i, &row) in row_ids.iter().enumerate() {
            self.insert_row_id(row);
            self.next_row_id = self.next_row_id.max(row.0 + 1);
            for (col_id, values) in col_values {
                if let Some(value) = values.get(i) {
                    if let Some(col) = self.columns.get_mut(col_id) {
                        col.set(row, value.clone());
                    }
                }
            }
        }
    }

    pub fn remove_rows(&mut self, row_ids: &[RowId]) {
        for row in row_ids {
            if let Ok(pos) = self.row_ids.binary_search(row) {
                self.row_ids.remove(pos);
            }
            for col in self.columns.values_mut() {
                col.unset(*row);
            }
        }
    }

    pub fn set(&mut self, row: RowId, col_id: &ColId, value: Value) {
        if let Some(col) = self.columns.get_mut(col_id) {
            col.set(row, value);
        }
    }

    pub fn raw_get(&self, row: RowId, col_id: &ColId) -> Value {
        self.columns
            .get(col_id)
            .map(|c| c.raw_get(row))
            .unwrap_or(Value::Blank)
    }
}
