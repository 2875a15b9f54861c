//! The in-memory columnar store (spec 4.2, "Column/table runtime").

pub mod column;
pub mod table;

pub use column::{Column, RecalcPolicy};
pub use table::Table;

use gridcore_common::TableId;
use rustc_hash::FxHashMap;

/// All tables in the document.
#[derive(Default)]
pub struct Store {
    tables: FxHashMap<TableId, Table>,
    table_order: Vec<TableId>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) {
        let id = table.table_id.clone();
        if !self.tables.contains_key(&id) {
            self.table_order.push(id.clone());
        }
        self.tables.insert(id, table);
    }

    pub fn remove_table(&mut self, table_id: &TableId) -> Option<Table> {
        self.table_order.retain(|t| t != table_id);
        self.tables.remove(table_id)
    }

    pub fn rename_table(&mut self, old: &TableId, new: TableId) {
        if let Some(mut table) = self.tables.remove(old) {
            table.table_id = new.clone();
            if let Some(slot) = self.table_order.iter_mut().find(|t| *t == old) {
                *slot = new.clone();
            }
            self.tables.insert(new, table);
        }
    }

    pub fn table(&self, table_id: &TableId) -> Option<&Table> {
        self.tables.get(table_id)
    }

    pub fn table_mut(&mut self, table_id: &TableId) -> Option<&mut Table> {
        self.tables.get_mut(table_id)
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &TableId> {
        self.table_order.iter()
    }
}
