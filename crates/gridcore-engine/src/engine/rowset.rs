//! `node -> set<row_id> | ALL_ROWS` (spec 3, "Recompute map").

use gridcore_common::RowId;
use rustc_hash::FxHashSet;

/// A set of row ids, or the absorbing "all rows of this node" element (spec 4.3:
/// "`ALL_ROWS` is an absorbing element").
#[derive(Debug, Clone)]
pub enum RowSet {
    All,
    Some(FxHashSet<RowId>),
}

impl RowSet {
    pub fn empty() -> Self {
        RowSet::Some(FxHashSet::default())
    }

    pub fn single(row: RowId) -> Self {
        let mut set = FxHashSet::default();
        set.insert(row);
        RowSet::Some(set)
    }

    pub fn from_rows(rows: impl IntoIterator<Item = RowId>) -> Self {
        RowSet::Some(rows.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RowSet::All => false,
            RowSet::Some(s) => s.is_empty(),
        }
    }

    pub fn contains(&self, row: RowId) -> bool {
        match self {
            RowSet::All => true,
            RowSet::Some(s) => s.contains(&row),
        }
    }

    /// Union `other` into `self`. `All` absorbs any union (spec 4.3).
    pub fn union_with(&mut self, other: &RowSet) {
        match (self, other) {
            (this @ RowSet::Some(_), RowSet::All) => *this = RowSet::All,
            (RowSet::Some(a), RowSet::Some(b)) => {
                a.extend(b.iter().copied());
            }
            (RowSet::All, _) => {}
        }
    }

    /// Remove `rows` from `self` in place (used after a node's dirty rows finish recomputing).
    pub fn subtract_rows(&mut self, rows: &FxHashSet<RowId>, all_known_rows: &[RowId]) {
        match self {
            RowSet::Some(s) => {
                for r in rows {
                    s.remove(r);
                }
            }
            RowSet::All => {
                // All minus a finite set becomes an explicit set of the remainder.
                let remaining: FxHashSet<RowId> = all_known_rows
                    .iter()
                    .copied()
                    .filter(|r| !rows.contains(r))
                    .collect();
                *self = RowSet::Some(remaining);
            }
        }
    }

    pub fn iter_concrete<'a>(&'a self, all_known_rows: &'a [RowId]) -> Box<dyn Iterator<Item = RowId> + 'a> {
        match self {
            RowSet::All => Box::new(all_known_rows.iter().copied()),
            RowSet::Some(s) => Box::new(s.iter().copied()),
        }
    }
}
