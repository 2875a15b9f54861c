//! S2 + S3 (spec 8): circular `get` reads resolve to `Value::Error(CircularRef)`; `peek` reads a
//! cell's value without recording a dependency edge, so it never makes the peeking formula a
//! dependent of what it peeked.

use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, Node, RowId, TableId, Value};

use super::common::{doc, values};
use crate::action::UserAction;
use crate::document::EvalContext;
use crate::formula::FormulaResult;
use crate::store::{Column, Table};
use rustc_hash::FxHashMap;

#[test]
fn circular_reference_resolves_to_error_value() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("Circ")));
    d.add_column(
        &TableId::new("Circ"),
        Column::new(ColId::new("A"), ColumnType::Any).with_formula(Rc::new(
            |row: RowId, ctx: &mut EvalContext<'_>| -> FormulaResult {
                ctx.get(&Node::new(TableId::new("Circ"), ColId::new("B")), row)
            },
        )),
    );
    d.add_column(
        &TableId::new("Circ"),
        Column::new(ColId::new("B"), ColumnType::Any).with_formula(Rc::new(
            |row: RowId, ctx: &mut EvalContext<'_>| -> FormulaResult {
                ctx.get(&Node::new(TableId::new("Circ"), ColId::new("A")), row)
            },
        )),
    );

    d.apply_user_actions(&[UserAction::BulkAddRecord {
        table: TableId::new("Circ"),
        row_ids: Some(vec![RowId(1)]),
        columns: FxHashMap::default(),
    }])
    .unwrap();

    let a = d.get_cell(&TableId::new("Circ"), &ColId::new("A"), RowId(1));
    let b = d.get_cell(&TableId::new("Circ"), &ColId::new("B"), RowId(1));
    assert!(a.is_error() || b.is_error(), "expected one side of the cycle to hold CircularRef, got {a:?} / {b:?}");
}

/// `peek` reads a would-be value without recording a dependency edge, which is what lets a
/// formula inspect a cell that would otherwise close a cycle back onto itself: `B` peeking `A`
/// never makes `B` a dependent of `A`, so editing `A` directly leaves `B` untouched, while a
/// sibling column reading the same cell through `get` keeps following it.
#[test]
fn peek_does_not_record_a_dependency_edge() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("Peek")));
    d.add_column(&TableId::new("Peek"), Column::new(ColId::new("A"), ColumnType::Int));
    d.add_column(
        &TableId::new("Peek"),
        Column::new(ColId::new("PeeksA"), ColumnType::Int).with_formula(Rc::new(
            |row: RowId, ctx: &mut EvalContext<'_>| -> FormulaResult {
                match ctx.peek(&Node::new(TableId::new("Peek"), ColId::new("A")), row)? {
                    Value::Int(n) => Ok(Value::Int(n * 10)),
                    _ => Ok(Value::Int(0)),
                }
            },
        )),
    );
    d.add_column(
        &TableId::new("Peek"),
        Column::new(ColId::new("GetsA"), ColumnType::Int).with_formula(Rc::new(
            |row: RowId, ctx: &mut EvalContext<'_>| -> FormulaResult {
                match ctx.get(&Node::new(TableId::new("Peek"), ColId::new("A")), row)? {
                    Value::Int(n) => Ok(Value::Int(n * 10)),
                    _ => Ok(Value::Int(0)),
                }
            },
        )),
    );

    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("Peek"),
        row_id: Some(RowId(1)),
        values: values(&[("A", Value::Int(5))]),
    }])
    .unwrap();
    assert!(matches!(d.get_cell(&TableId::new("Peek"), &ColId::new("PeeksA"), RowId(1)), Value::Int(50)));
    assert!(matches!(d.get_cell(&TableId::new("Peek"), &ColId::new("GetsA"), RowId(1)), Value::Int(50)));

    d.apply_user_actions(&[UserAction::UpdateRecord {
        table: TableId::new("Peek"),
        row_id: RowId(1),
        values: values(&[("A", Value::Int(7))]),
    }])
    .unwrap();

    // GetsA tracks the edit through its recorded dependency; PeeksA stays stale since peek never
    // registered one.
    assert!(matches!(d.get_cell(&TableId::new("Peek"), &ColId::new("GetsA"), RowId(1)), Value::Int(70)));
    assert!(matches!(d.get_cell(&TableId::new("Peek"), &ColId::new("PeeksA"), RowId(1)), Value::Int(50)));
}
