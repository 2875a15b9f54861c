//! Keyed secondary index maintaining `(key-tuple -> row-id-set)` for one `(table, key-cols,
//! flags)` combination referenced by any formula (spec 4.5, "Lookup index").
//!
//! Conceptually a column, not a data column: it never stores a value a user would see, and is
//! installed into its target table as a `private` formula column so the ordinary recompute
//! engine brings it up to date exactly like any other formula (spec 4.5 step 1).

use std::cell::RefCell;
use std::rc::Rc;

use gridcore_common::{ColId, Node, RowId, TableId, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use super::key::HashKey;
use super::relation::LookupRelation;
use super::rowset::RowSet;
use crate::document::EvalContext;
use crate::formula::{Formula, FormulaResult};

/// Build the canonical node for a lookup over `key_cols` (spec 4.5 step 1: `#lookup#{sorted
/// key column ids}{,#contains-flags}`). Key columns are sorted so two formulas requesting the
/// same key set in a different argument order share one index.
pub fn lookup_node_id(prefix: &str, table: &TableId, key_cols: &[ColId], contains: &[bool]) -> Node {
    let mut pairs: Vec<(&ColId, &bool)> = key_cols.iter().zip(contains.iter()).collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let mut col_part = pairs
        .iter()
        .map(|(c, _)| c.as_str())
        .collect::<Vec<_>>()
        .join(",");
    if col_part.is_empty() {
        col_part = "()".to_string();
    }
    let flags_part: String = pairs
        .iter()
        .map(|(_, contains)| if **contains { "C" } else { "-" })
        .collect();
    Node::new(table.clone(), format!("{prefix}#{col_part}#{flags_part}"))
}

struct LookupState {
    by_row: FxHashMap<RowId, Vec<HashKey>>,
    by_key: FxHashMap<HashKey, FxHashSet<RowId>>,
    relations: FxHashMap<Node, Rc<LookupRelation>>,
}

pub struct LookupIndex {
    pub node: Node,
    pub target_table: TableId,
    pub key_cols: Vec<ColId>,
    pub contains: Vec<bool>,
    state: RefCell<LookupState>,
}

impl LookupIndex {
    pub fn new(node: Node, target_table: TableId, key_cols: Vec<ColId>, contains: Vec<bool>) -> Rc<Self> {
        Rc::new(Self {
            node,
            target_table,
            key_cols,
            contains,
            state: RefCell::new(LookupState {
                by_row: FxHashMap::default(),
                by_key: FxHashMap::default(),
                relations: FxHashMap::default(),
            }),
        })
    }

    pub fn get_or_create_relation(&self, referring_node: &Node) -> Rc<LookupRelation> {
        let mut state = self.state.borrow_mut();
        state
            .relations
            .entry(referring_node.clone())
            .or_insert_with(LookupRelation::new)
            .clone()
    }

    /// Drop the relation for a referring node that no longer reads this index (its formula was
    /// recompiled, or the column removed). Returns true if the index now has no relations left
    /// (spec 4.5: "Unused lookup indices ... are marked and deleted").
    pub fn delete_relation(&self, referring_node: &Node) -> bool {
        let mut state = self.state.borrow_mut();
        state.relations.remove(referring_node);
        state.relations.is_empty()
    }

    pub fn is_unused(&self) -> bool {
        self.state.borrow().relations.is_empty()
    }

    pub fn rows_for_key(&self, key: &HashKey) -> FxHashSet<RowId> {
        self.state
            .borrow()
            .by_key
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove all mapping for `row` (record removal path, spec 4.5 invariant).
    pub fn unset_row(&self, row: RowId) {
        let mut state = self.state.borrow_mut();
        if let Some(old_keys) = state.by_row.remove(&row) {
            for k in &old_keys {
                if let Some(set) = state.by_key.get_mut(k) {
                    set.remove(&row);
                    if set.is_empty() {
                        state.by_key.remove(k);
                    }
                }
            }
        }
    }

    /// Like [`Self::unset_row`], but also reports which referrer rows the removal affects, so the
    /// caller can invalidate them the same way a key-column edit would (spec 4.5 invariant 4: a
    /// lookup's target row set must track removals, not just edits).
    pub fn unset_row_and_affected(&self, row: RowId) -> Vec<(Node, FxHashSet<RowId>)> {
        let old_keys = {
            let mut state = self.state.borrow_mut();
            let old_keys = state.by_row.remove(&row).unwrap_or_default();
            for k in &old_keys {
                if let Some(set) = state.by_key.get_mut(k) {
                    set.remove(&row);
                    if set.is_empty() {
                        state.by_key.remove(k);
                    }
                }
            }
            old_keys
        };
        if old_keys.is_empty() {
            return Vec::new();
        }
        let relations: Vec<(Node, Rc<LookupRelation>)> =
            self.state.borrow().relations.iter().map(|(n, r)| (n.clone(), r.clone())).collect();
        relations
            .into_iter()
            .filter_map(|(node, relation)| {
                let affected: FxHashSet<RowId> = relation.rows_for_keys(&old_keys).into_iter().collect();
                if affected.is_empty() {
                    None
                } else {
                    Some((node, affected))
                }
            })
            .collect()
    }

    fn compute_keys(&self, ctx: &mut EvalContext<'_>, row: RowId) -> FormulaResult<Vec<HashKey>> {
        let mut components: Vec<Vec<Value>> = Vec::new();
        for (col_id, is_contains) in self.key_cols.iter().zip(self.contains.iter()) {
            let node = Node::new(self.target_table.clone(), col_id.clone());
            let val = ctx.get(&node, row)?;
            if *is_contains {
                match val {
                    Value::ChoiceList(items) if !items.is_empty() => {
                        components.push(items.into_iter().map(Value::Text).collect())
                    }
                    Value::RefList(_, rows) if !rows.is_empty() => components.push(
                        rows.into_iter()
                            .map(|r| Value::Ref(self.target_table.clone(), r))
                            .collect(),
                    ),
                    _ => components.push(vec![Value::Blank]), // match_empty sentinel
                }
            } else {
                components.push(vec![val]);
            }
        }
        let mut tuples: Vec<Vec<Value>> = vec![Vec::new()];
        for component in components {
            let mut next = Vec::with_capacity(tuples.len() * component.len().max(1));
            for prefix in &tuples {
                for item in &component {
                    let mut t = prefix.clone();
                    t.push(item.clone());
                    next.push(t);
                }
            }
            tuples = next;
        }
        Ok(tuples.iter().map(|t| HashKey::from_values(t)).collect())
    }
}

impl Formula for LookupIndex {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult<Value> {
        let new_keys = self.compute_keys(ctx, row)?;

        let changed = {
            let mut state = self.state.borrow_mut();
            let old_keys = state.by_row.remove(&row).unwrap_or_default();
            for k in &old_keys {
                if let Some(set) = state.by_key.get_mut(k) {
                    set.remove(&row);
                    if set.is_empty() {
                        state.by_key.remove(k);
                    }
                }
            }
            for k in &new_keys {
                state.by_key.entry(k.clone()).or_default().insert(row);
            }
            state.by_row.insert(row, new_keys.clone());

            let mut changed: Vec<HashKey> = Vec::new();
            for k in &old_keys {
                if !new_keys.contains(k) {
                    changed.push(k.clone());
                }
            }
            for k in &new_keys {
                if !old_keys.contains(k) {
                    changed.push(k.clone());
                }
            }
            changed
        };

        if !changed.is_empty() {
            let relations: Vec<(Node, Rc<LookupRelation>)> = self
                .state
                .borrow()
                .relations
                .iter()
                .map(|(n, r)| (n.clone(), r.clone()))
                .collect();
            for (referring_node, relation) in relations {
                let affected = relation.rows_for_keys(&changed);
                if !affected.is_empty() {
                    ctx.invalidate_rows(&referring_node, RowSet::from_rows(affected));
                }
            }
        }

        // LookupMapColumn stores no visible value (spec 4.5); the cell value is never read.
        Ok(Value::Blank)
    }
}
