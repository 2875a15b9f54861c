//! Row-mapping functions associated with one dependency graph edge (spec 3/4.3, "Relation").
//!
//! Stored as `Rc<dyn Relation>` in the graph's edge arena rather than owned per-edge, so a
//! lookup index can share one stateful relation object across every `use_node` call made
//! against it (spec 9, "Dependency edges as value-typed structs, not pointer graphs").

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use gridcore_common::RowId;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::key::HashKey;
use super::rowset::RowSet;

pub trait Relation: fmt::Debug {
    /// Rows of the dependency side that `dependent_row` reads through this relation.
    fn forward(&self, dependent_row: RowId) -> SmallVec<[RowId; 4]>;

    /// Given a set of dependency-side rows that just changed, the dependent rows affected.
    /// Used while walking `invalidate_deps` outward from an edge's dependency side.
    fn affected_dependents(&self, changed: &RowSet) -> RowSet;

    /// Called just before the node owning this relation (as a dependency) is recomputed, so
    /// stateful relations can discard stale mappings concerning only `rows` (spec 4.3).
    fn reset_rows(&self, rows: &RowSet);

    /// Called when the node owning this relation is globally invalidated.
    fn reset_all(&self);
}

/// Maps row `r` to `{r}` in the same table. The common case for `$Field` reads within a row.
#[derive(Debug, Clone)]
pub struct IdentityRelation;

impl Relation for IdentityRelation {
    fn forward(&self, dependent_row: RowId) -> SmallVec<[RowId; 4]> {
        SmallVec::from_slice(&[dependent_row])
    }
    fn affected_dependents(&self, changed: &RowSet) -> RowSet {
        changed.clone()
    }
    fn reset_rows(&self, _rows: &RowSet) {}
    fn reset_all(&self) {}
}

/// Identical row mapping to [`IdentityRelation`], used for trigger-formula explicit
/// dependencies (spec 3: "not invalidated by reset" — `ExplicitDeps` edges stay live across
/// resets since they do not carry any stateful index to discard).
#[derive(Debug, Clone)]
pub struct SingleRowIdentityRelation;

impl Relation for SingleRowIdentityRelation {
    fn forward(&self, dependent_row: RowId) -> SmallVec<[RowId; 4]> {
        SmallVec::from_slice(&[dependent_row])
    }
    fn affected_dependents(&self, changed: &RowSet) -> RowSet {
        changed.clone()
    }
    fn reset_rows(&self, _rows: &RowSet) {}
    fn reset_all(&self) {}
}

/// The relation installed on a `(referring_node, lookup_index_node)` edge.
///
/// Owned by the corresponding [`crate::engine::lookup::LookupIndex`] and shared by every
/// `use_node` call the referring column makes against that index (spec 4.5 step 2). It records,
/// for each referring row, the key it looked up, so that when the index later learns a key
/// changed, it can translate "key changed" into "these referring rows need recomputing"
/// without the referring column needing to re-declare the relationship.
#[derive(Debug, Default)]
pub struct LookupRelation {
    /// referring_row -> key(s) it looked up. A plain lookup records one key per row; a
    /// `CONTAINS` lookup may record several distinct keys for the same referring row across
    /// repeated evaluations, so this holds a small vec.
    by_row: RefCell<FxHashMap<RowId, SmallVec<[HashKey; 1]>>>,
}

impl LookupRelation {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn record(&self, referring_row: RowId, key: HashKey) {
        self.by_row
            .borrow_mut()
            .entry(referring_row)
            .or_default()
            .push(key);
    }

    /// Rows whose recorded keys intersect `affected_keys`.
    pub fn rows_for_keys(&self, affected_keys: &[HashKey]) -> SmallVec<[RowId; 8]> {
        let map = self.by_row.borrow();
        let mut out = SmallVec::new();
        for (row, keys) in map.iter() {
            if keys.iter().any(|k| affected_keys.contains(k)) {
                out.push(*row);
            }
        }
        out
    }
}

impl Relation for LookupRelation {
    fn forward(&self, _dependent_row: RowId) -> SmallVec<[RowId; 4]> {
        // Resolving to concrete target rows requires the owning index's row_key_map; callers
        // that need the actual target rows go through `LookupIndex::do_lookup` instead.
        SmallVec::new()
    }

    fn affected_dependents(&self, changed: &RowSet) -> RowSet {
        // Row-level invalidation precision for lookups is driven explicitly by the index's own
        // recompute step (spec 4.5), not by this generic walk — see DESIGN.md. `All` still
        // absorbs, matching every other relation.
        match changed {
            RowSet::All => RowSet::All,
            RowSet::Some(_) => RowSet::empty(),
        }
    }

    fn reset_rows(&self, rows: &RowSet) {
        let mut map = self.by_row.borrow_mut();
        match rows {
            RowSet::All => map.clear(),
            RowSet::Some(set) => {
                for r in set {
                    map.remove(r);
                }
            }
        }
    }

    fn reset_all(&self) {
        self.by_row.borrow_mut().clear();
    }
}

/// The relation installed on a `$X.Y`-style nested-reference-read edge (spec 9, "$X.Y nested
/// reference reads"): records, per referring row, which row of the target table it last resolved
/// `$X` to. Analogous to [`LookupRelation`] but keyed by a single recorded target row rather than
/// a lookup key, which lets `affected_dependents` answer honestly instead of needing an
/// out-of-band invalidation path the way a lookup index's does.
#[derive(Debug, Default)]
pub struct RefRelation {
    by_row: RefCell<FxHashMap<RowId, RowId>>,
}

impl RefRelation {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn record(&self, referring_row: RowId, target_row: RowId) {
        self.by_row.borrow_mut().insert(referring_row, target_row);
    }
}

impl Relation for RefRelation {
    fn forward(&self, dependent_row: RowId) -> SmallVec<[RowId; 4]> {
        match self.by_row.borrow().get(&dependent_row) {
            Some(target) => SmallVec::from_slice(&[*target]),
            None => SmallVec::new(),
        }
    }

    fn affected_dependents(&self, changed: &RowSet) -> RowSet {
        match changed {
            RowSet::All => RowSet::All,
            RowSet::Some(targets) => RowSet::from_rows(
                self.by_row
                    .borrow()
                    .iter()
                    .filter(|(_, target)| targets.contains(target))
                    .map(|(referrer, _)| *referrer),
            ),
        }
    }

    fn reset_rows(&self, rows: &RowSet) {
        let mut map = self.by_row.borrow_mut();
        match rows {
            RowSet::All => map.clear(),
            RowSet::Some(set) => map.retain(|r, _| !set.contains(r)),
        }
    }

    fn reset_all(&self) {
        self.by_row.borrow_mut().clear();
    }
}

/// `ref ∘ identity`-style composition: resolves a dependency reached through an intermediate
/// relation as one graph edge instead of two (spec 9, "Lookup relation reuse & composition").
/// `affected_dependents` reverses both halves in turn — `second` first (dependency side to the
/// intermediate row), then `first` (intermediate row to the ultimate dependent) — the mirror
/// image of `forward`'s `first` then `second` order.
///
/// Critically, `reset_rows`/`reset_all` forward **only** to `first` — forwarding to `second` as
/// well was a confirmed correctness bug in nested-lookup scenarios (spec 4.3, 9).
#[derive(Debug)]
pub struct Composition {
    pub first: Rc<dyn Relation>,
    pub second: Rc<dyn Relation>,
}

impl Relation for Composition {
    fn forward(&self, dependent_row: RowId) -> SmallVec<[RowId; 4]> {
        let mut out = SmallVec::new();
        for mid in self.first.forward(dependent_row) {
            out.extend(self.second.forward(mid));
        }
        out
    }

    fn affected_dependents(&self, changed: &RowSet) -> RowSet {
        let mid = self.second.affected_dependents(changed);
        self.first.affected_dependents(&mid)
    }

    fn reset_rows(&self, rows: &RowSet) {
        self.first.reset_rows(rows);
    }

    fn reset_all(&self) {
        self.first.reset_all();
    }
}
