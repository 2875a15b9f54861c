//! A hashable, tag-aware representation of a lookup key tuple.
//!
//! [`gridcore_common::Value`] deliberately has no blanket `Hash`/`Eq` (NaN makes that unsound
//! for `Float`), but the lookup index needs both to act as a secondary index (spec 4.5). This
//! module provides a lossless-for-key-purposes projection: floats hash/compare by bit pattern
//! (so two NaNs of the same bit pattern are the same key — acceptable for indexing purposes,
//! unlike `strict_equal`'s IEEE semantics used for change detection elsewhere).

use std::rc::Rc;

use gridcore_common::{RowId, TableId, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyAtom {
    Int(i64),
    FloatBits(u64),
    Bool(bool),
    Text(String),
    Date(i64),
    DateTime(i64, String),
    Ref(TableId, RowId),
    RefList(TableId, Vec<RowId>),
    ChoiceList(Vec<String>),
    AltText(String),
    Blank,
    Error,
}

impl From<&Value> for KeyAtom {
    fn from(v: &Value) -> Self {
        match v {
            Value::Int(i) => KeyAtom::Int(*i),
            Value::Float(f) => KeyAtom::FloatBits(f.to_bits()),
            Value::Bool(b) => KeyAtom::Bool(*b),
            Value::Text(s) => KeyAtom::Text(s.clone()),
            Value::Date(d) => KeyAtom::Date(*d),
            Value::DateTime(s, z) => KeyAtom::DateTime(*s, z.clone()),
            Value::Ref(t, r) => KeyAtom::Ref(t.clone(), *r),
            Value::RefList(t, rs) => KeyAtom::RefList(t.clone(), rs.clone()),
            Value::ChoiceList(items) => KeyAtom::ChoiceList(items.clone()),
            Value::AltText(s) => KeyAtom::AltText(s.clone()),
            Value::Blank => KeyAtom::Blank,
            Value::Error(_) => KeyAtom::Error,
        }
    }
}

/// A hashable key tuple, cheap to clone (`Rc`-backed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashKey(pub Rc<[KeyAtom]>);

impl HashKey {
    pub fn from_values(values: &[Value]) -> Self {
        HashKey(values.iter().map(KeyAtom::from).collect())
    }

    /// `match_empty` sentinel: an all-blank key, used by `CONTAINS` lookups to mean "match
    /// when the list is empty" (spec 4.5).
    pub fn match_empty(arity: usize) -> Self {
        HashKey((0..arity).map(|_| KeyAtom::Blank).collect())
    }
}
