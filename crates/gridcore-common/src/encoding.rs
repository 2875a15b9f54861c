//! Wire encoding for [`Value`] at the API boundary (spec 6, "Value encoding on the boundary").
//!
//! Every value that is not a plain string/number/bool/null is encoded as a typed list tagged by
//! a single-letter marker: `["D", epoch_ms]` for DateTime, `["d", epoch_s]` for Date,
//! `["R", table, row]` for Ref, `["L", v1, v2, ...]` for list, `["E", kind, message, details?]`
//! for Error, `["P", ...]` for pending. The engine decodes/encodes only at this boundary —
//! internal storage always uses [`Value`] directly.

use serde_json::json;

use crate::error::{GridError, GridErrorKind};
use crate::ids::{RowId, TableId};
use crate::value::Value;

pub fn encode(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Bool(b) => json!(b),
        Value::Text(s) => json!(s),
        Value::Blank => serde_json::Value::Null,
        Value::Date(days) => json!(["d", days * 86_400]),
        Value::DateTime(secs, _zone) => json!(["D", secs * 1000]),
        Value::Ref(table, row) => json!(["R", table.as_str(), row.0]),
        Value::RefList(table, rows) => {
            let mut arr = vec![json!("L")];
            arr.extend(rows.iter().map(|r| json!(["R", table.as_str(), r.0])));
            serde_json::Value::Array(arr)
        }
        Value::ChoiceList(items) => {
            let mut arr = vec![json!("L")];
            arr.extend(items.iter().map(|s| json!(s)));
            serde_json::Value::Array(arr)
        }
        Value::AltText(raw) => json!(raw),
        Value::Error(e) => {
            let mut arr = vec![json!("E"), json!(e.kind.to_string()), json!(e.message)];
            if let Some(details) = &e.details {
                arr.push(json!(details));
            }
            serde_json::Value::Array(arr)
        }
    }
}

/// Decode a wire value back into [`Value`]. `default_table` is used for bare `["R", row]`
/// shapes that omit a table name (not part of the canonical wire format, but accepted for
/// leniency).
pub fn decode(json: &serde_json::Value, default_table: Option<&TableId>) -> Value {
    use serde_json::Value as J;
    match json {
        J::Null => Value::Blank,
        J::Bool(b) => Value::Bool(*b),
        J::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        J::String(s) => Value::Text(s.clone()),
        J::Array(items) => decode_tagged(items, default_table),
        J::Object(_) => Value::AltText(json.to_string()),
    }
}

fn decode_tagged(items: &[serde_json::Value], default_table: Option<&TableId>) -> Value {
    let Some(tag) = items.first().and_then(|v| v.as_str()) else {
        return Value::AltText(serde_json::Value::Array(items.to_vec()).to_string());
    };
    match tag {
        "d" => items
            .get(1)
            .and_then(|v| v.as_i64())
            .map(|secs| Value::Date(secs.div_euclid(86_400)))
            .unwrap_or(Value::Blank),
        "D" => items
            .get(1)
            .and_then(|v| v.as_i64())
            .map(|ms| Value::DateTime(ms.div_euclid(1000), "UTC".to_string()))
            .unwrap_or(Value::Blank),
        "R" => {
            let (table, row_field) = match items.len() {
                3 => (
                    items[1].as_str().map(TableId::new),
                    items.get(2),
                ),
                _ => (default_table.cloned(), items.get(1)),
            };
            let row = row_field.and_then(|v| v.as_i64()).unwrap_or(0);
            Value::Ref(table.unwrap_or_else(|| TableId::new("")), RowId(row))
        }
        "L" => {
            let rest = &items[1..];
            if rest
                .iter()
                .all(|v| matches!(decode(v, default_table), Value::Ref(..)))
            {
                let mut table = default_table.cloned().unwrap_or_else(|| TableId::new(""));
                let mut rows = Vec::with_capacity(rest.len());
                for v in rest {
                    if let Value::Ref(t, r) = decode(v, default_table) {
                        table = t;
                        rows.push(r);
                    }
                }
                Value::RefList(table, rows)
            } else {
                Value::ChoiceList(
                    rest.iter()
                        .map(|v| v.as_str().unwrap_or_default().to_string())
                        .collect(),
                )
            }
        }
        "E" => {
            let kind_str = items.get(1).and_then(|v| v.as_str()).unwrap_or("");
            let kind = parse_error_kind(kind_str);
            let mut err = GridError::new(kind);
            if let Some(msg) = items.get(2).and_then(|v| v.as_str()) {
                err = err.with_message(msg);
            }
            if let Some(details) = items.get(3).and_then(|v| v.as_str()) {
                err = err.with_details(details);
            }
            Value::Error(err)
        }
        "P" => Value::Blank, // pending values resolve to blank until the request completes
        _ => Value::AltText(serde_json::Value::Array(items.to_vec()).to_string()),
    }
}

fn parse_error_kind(s: &str) -> GridErrorKind {
    match s {
        "CircularRefError" => GridErrorKind::CircularRef,
        "EngineProgressError" => GridErrorKind::EngineProgress,
        "SchemaMismatch" => GridErrorKind::SchemaMismatch,
        "NotFound" => GridErrorKind::NotFound,
        "TypeConversion" => GridErrorKind::TypeConversion,
        "InvalidInput" => GridErrorKind::InvalidInput,
        other => GridErrorKind::Custom(Box::leak(other.to_string().into_boxed_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_ref() {
        let v = Value::Ref(TableId::new("Students"), RowId(5));
        let json = encode(&v);
        let back = decode(&json, None);
        assert!(v.strict_equal(&back));
    }

    #[test]
    fn roundtrip_date() {
        let v = Value::Date(100);
        let back = decode(&encode(&v), None);
        assert!(v.strict_equal(&back));
    }

    #[test]
    fn plain_scalars_are_not_tagged() {
        assert_eq!(encode(&Value::Int(5)), json!(5));
        assert_eq!(encode(&Value::Text("hi".into())), json!("hi"));
        assert_eq!(encode(&Value::Blank), serde_json::Value::Null);
    }
}
