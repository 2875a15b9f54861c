//! The tagged cell value. Values are the only thing stored in cells (spec 3, "Value").

use std::fmt;

use crate::error::{GridError, GridErrorKind};
use crate::ids::{RowId, TableId};

/// A spreadsheet cell value.
///
/// Each variant is tagged; a cell in a formula column can additionally hold [`Value::Error`].
/// There is deliberately no implicit numeric-to-text coercion at this layer — that belongs to
/// the formula library (out of scope, spec 1).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Days since the epoch (1970-01-01 = day 0), matching the wire encoding of spec 6.
    Date(i64),
    /// Seconds since the Unix epoch, plus an IANA zone id.
    DateTime(i64, String),
    Ref(TableId, RowId),
    RefList(TableId, Vec<RowId>),
    ChoiceList(Vec<String>),
    /// A value that failed type coercion at a column boundary; stored verbatim rather than
    /// rejected or coerced to an error (spec 4.1).
    AltText(String),
    Error(GridError),
    Blank,
}

impl Value {
    pub fn error(kind: GridErrorKind, message: impl Into<String>) -> Self {
        Value::Error(GridError::new(kind).with_message(message))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// `strict_equal` — compares tag *and* value (spec 4.1): `1 != 1.0`, `1 != True`. Within a
    /// tag, natural equality; NaN follows IEEE (so `NaN != NaN`), which is why `Value` does not
    /// derive `PartialEq`/`Eq` and this method exists instead.
    pub fn strict_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b, // IEEE: NaN != NaN falls out naturally
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a, za), Value::DateTime(b, zb)) => a == b && za == zb,
            (Value::Ref(ta, ra), Value::Ref(tb, rb)) => ta == tb && ra == rb,
            (Value::RefList(ta, ra), Value::RefList(tb, rb)) => ta == tb && ra == rb,
            (Value::ChoiceList(a), Value::ChoiceList(b)) => a == b,
            (Value::AltText(a), Value::AltText(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Blank, Value::Blank) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::DateTime(s, tz) => write!(f, "DateTime({s}, {tz})"),
            Value::Ref(t, r) => write!(f, "Ref({t}, {r})"),
            Value::RefList(t, rs) => write!(f, "RefList({t}, {rs:?})"),
            Value::ChoiceList(items) => write!(f, "{items:?}"),
            Value::AltText(raw) => write!(f, "{raw}"),
            Value::Error(e) => write!(f, "{e}"),
            Value::Blank => write!(f, ""),
        }
    }
}

/// The declared type of a column (spec 3, "Column"). Governs what [`convert`] does to
/// incoming values at a user-action boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
    Date,
    DateTime,
    Ref,
    RefList,
    ChoiceList,
    /// Accepts anything verbatim; used for lookup-index pseudo-columns and `Any`-typed formula
    /// columns.
    Any,
}

/// Convert a user-entered value to a column's target type.
///
/// A pure-data column storing a non-convertible value must keep it as [`Value::AltText`] —
/// never reject, never coerce to an error (spec 4.1).
pub fn convert(value: Value, target: ColumnType, ref_table: Option<&TableId>) -> Value {
    if matches!(value, Value::Blank) || matches!(value, Value::Error(_)) {
        return value;
    }
    match target {
        ColumnType::Any => value,
        ColumnType::Int => match &value {
            Value::Int(_) => value,
            Value::Float(f) if f.fract() == 0.0 => Value::Int(*f as i64),
            Value::Bool(b) => Value::Int(if *b { 1 } else { 0 }),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::AltText(s.clone())),
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::Float => match &value {
            Value::Float(_) => value,
            Value::Int(i) => Value::Float(*i as f64),
            Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::AltText(s.clone())),
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::Bool => match &value {
            Value::Bool(_) => value,
            Value::Int(i) => Value::Bool(*i != 0),
            Value::Float(f) => Value::Bool(*f != 0.0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::AltText(s.clone()),
            },
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::Text => match value {
            Value::Text(_) => value,
            other => Value::Text(other.to_string()),
        },
        ColumnType::Date => match &value {
            Value::Date(_) => value,
            Value::DateTime(secs, _) => Value::Date(secs.div_euclid(86_400)),
            Value::Text(s) => parse_date(s).unwrap_or_else(|| Value::AltText(s.clone())),
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::DateTime => match &value {
            Value::DateTime(..) => value,
            Value::Date(days) => Value::DateTime(days * 86_400, "UTC".to_string()),
            Value::Text(s) => parse_datetime(s).unwrap_or_else(|| Value::AltText(s.clone())),
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::Ref => match &value {
            Value::Ref(..) => value,
            Value::Int(i) => Value::Ref(
                ref_table.cloned().unwrap_or_else(|| TableId::new("")),
                RowId(*i),
            ),
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::RefList => match &value {
            Value::RefList(..) => value,
            Value::Ref(t, r) => Value::RefList(t.clone(), vec![*r]),
            _ => Value::AltText(value.to_string()),
        },
        ColumnType::ChoiceList => match &value {
            Value::ChoiceList(_) => value,
            Value::Text(s) => Value::ChoiceList(vec![s.clone()]),
            _ => Value::AltText(value.to_string()),
        },
    }
}

/// Minimal ISO-8601 date parser (`YYYY-MM-DD`), used by [`convert`] when no format is configured.
/// The codegen-provided formula library owns richer locale-aware parsing (spec 1, out of scope).
fn parse_date(s: &str) -> Option<Value> {
    chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| Value::Date((d - epoch_date()).num_days()))
}

fn parse_datetime(s: &str) -> Option<Value> {
    chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| Value::DateTime(dt.and_utc().timestamp(), "UTC".to_string()))
}

fn epoch_date() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_equal_distinguishes_tags() {
        assert!(!Value::Int(1).strict_equal(&Value::Bool(true)));
        assert!(!Value::Int(1).strict_equal(&Value::Float(1.0)));
        assert!(Value::Int(1).strict_equal(&Value::Int(1)));
    }

    #[test]
    fn strict_equal_nan_is_ieee() {
        let nan = Value::Float(f64::NAN);
        assert!(!nan.strict_equal(&nan));
    }

    #[test]
    fn convert_unparseable_text_becomes_alttext() {
        let v = convert(Value::Text("not a number".into()), ColumnType::Int, None);
        assert!(matches!(v, Value::AltText(_)));
    }

    #[test]
    fn convert_blank_passes_through_regardless_of_type() {
        let v = convert(Value::Blank, ColumnType::Int, None);
        assert!(v.is_blank());
    }
}
