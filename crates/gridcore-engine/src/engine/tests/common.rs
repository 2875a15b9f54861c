use gridcore_common::{ColId, RowId, TableId, Value};
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::document::Document;

pub fn doc() -> Document {
    Document::new(EngineConfig::default())
}

pub fn values(pairs: &[(&str, Value)]) -> FxHashMap<ColId, Value> {
    pairs.iter().map(|(c, v)| (ColId::new(*c), v.clone())).collect()
}

pub fn bulk_values(pairs: &[(&str, Vec<Value>)]) -> FxHashMap<ColId, Vec<Value>> {
    pairs.iter().map(|(c, v)| (ColId::new(*c), v.clone())).collect()
}

pub fn sales_table() -> TableId {
    TableId::new("Sales")
}

pub fn row(n: i64) -> RowId {
    RowId(n)
}
