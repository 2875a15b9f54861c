//! Identifiers shared by the column store, dependency graph, and action pipeline.

use std::fmt;

/// A table identifier (`_grist_Tables.tableId`-equivalent). Interned as an owned string since
/// tables are created/renamed rarely relative to how often ids are compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub String);

impl TableId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the metadata tables the document facade knows about (`_grist_*`).
    pub fn is_metadata(&self) -> bool {
        self.0.starts_with("_grist_")
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TableId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A column identifier, unique within a table. The special id `"id"` always refers to the
/// row-id pseudo-column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColId(pub String);

impl ColId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub const ROW_ID: &'static str = "id";

    pub fn is_row_id(&self) -> bool {
        self.0 == Self::ROW_ID
    }

    /// Lookup index columns are synthetic and never appear in `Table::columns`; their col_id
    /// is namespaced with this prefix so the recompute scheduler can sort them first (spec 4.4).
    pub fn is_lookup_index(&self) -> bool {
        self.0.starts_with("#lookup")
    }
}

impl fmt::Display for ColId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ColId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A row identifier. Dense positive integers, not necessarily contiguous after deletes.
///
/// Negative values (and the sentinel returned from [`RowId::none`]) are used transiently within
/// a single user-action bundle to refer to not-yet-assigned rows (spec 4.2); they must never be
/// persisted into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub i64);

impl RowId {
    /// The sentinel "no row" reference a dangling `Ref` resolves to (spec invariant 8).
    pub const NONE: RowId = RowId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_placeholder(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        RowId(v)
    }
}

/// `(table_id, col_id)` — the unit of dependency tracking (spec glossary: "Node").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub table_id: TableId,
    pub col_id: ColId,
}

impl Node {
    pub fn new(table_id: impl Into<TableId>, col_id: impl Into<ColId>) -> Self {
        Self {
            table_id: table_id.into(),
            col_id: col_id.into(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_id, self.col_id)
    }
}
