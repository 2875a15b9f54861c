//! S6 and two more spec 8 invariants: undo around a summary-fed table, the trim step (no
//! `BulkUpdateRecord` for a cell that recomputed to the value it already held), and a plain
//! undo round-trip.

use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, Node, RowId, TableId, Value};

use super::common::{doc, sales_table, values};
use crate::action::{DocAction, UserAction};
use crate::document::EvalContext;
use crate::formula::FormulaResult;
use crate::store::{Column, Table};
use crate::summary;

#[test]
fn undo_restores_source_state_around_a_summary_edit() {
    let mut d = doc();
    d.add_table(Table::new(sales_table()));
    d.add_column(&sales_table(), Column::new(ColId::new("Region"), ColumnType::Text));
    let summary_table = summary::ensure_summary_table(&mut d, &sales_table(), &[ColId::new("Region")]).unwrap();

    d.apply_user_actions(&[UserAction::AddRecord {
        table: sales_table(),
        row_id: Some(RowId(1)),
        values: values(&[("Region", Value::Text("West".into()))]),
    }])
    .unwrap();
    assert_eq!(d.store.table(&sales_table()).unwrap().num_rows(), 1);
    assert_eq!(d.store.table(&summary_table).unwrap().num_rows(), 1);

    let second = d
        .apply_user_actions(&[UserAction::AddRecord {
            table: sales_table(),
            row_id: Some(RowId(2)),
            values: values(&[("Region", Value::Text("East".into()))]),
        }])
        .unwrap();
    assert_eq!(d.store.table(&sales_table()).unwrap().num_rows(), 2);

    d.apply_user_actions(&[UserAction::ApplyUndoActions { actions: second.undo }]).unwrap();
    assert_eq!(d.store.table(&sales_table()).unwrap().num_rows(), 1);
    assert!(!d.store.table(&sales_table()).unwrap().has_row(RowId(2)));
}

#[test]
fn recompute_trims_unchanged_cells() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("T")));
    d.add_column(&TableId::new("T"), Column::new(ColId::new("X"), ColumnType::Int));
    d.add_column(
        &TableId::new("T"),
        Column::new(ColId::new("Y"), ColumnType::Int).with_formula(Rc::new(
            |row: RowId, ctx: &mut EvalContext<'_>| -> FormulaResult {
                match ctx.get(&Node::new(TableId::new("T"), ColId::new("X")), row)? {
                    Value::Int(n) => Ok(Value::Int(n * 2)),
                    _ => Ok(Value::Int(0)),
                }
            },
        )),
    );

    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("T"),
        row_id: Some(RowId(1)),
        values: values(&[("X", Value::Int(5))]),
    }])
    .unwrap();

    // Re-writing X to the value it already holds must not cause Y to appear as changed.
    let group = d
        .apply_user_actions(&[UserAction::UpdateRecord {
            table: TableId::new("T"),
            row_id: RowId(1),
            values: values(&[("X", Value::Int(5))]),
        }])
        .unwrap();

    let y_changed = group.calc.iter().any(|action| match action {
        DocAction::BulkUpdateRecord { columns, .. } => columns.contains_key(&ColId::new("Y")),
        _ => false,
    });
    assert!(!y_changed, "Y did not actually change value and should not appear in calc");
}

#[test]
fn undo_round_trip_restores_prior_values() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("T")));
    d.add_column(&TableId::new("T"), Column::new(ColId::new("X"), ColumnType::Int));

    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("T"),
        row_id: Some(RowId(1)),
        values: values(&[("X", Value::Int(1))]),
    }])
    .unwrap();

    let group = d
        .apply_user_actions(&[UserAction::UpdateRecord {
            table: TableId::new("T"),
            row_id: RowId(1),
            values: values(&[("X", Value::Int(99))]),
        }])
        .unwrap();
    assert!(matches!(d.get_cell(&TableId::new("T"), &ColId::new("X"), RowId(1)), Value::Int(99)));

    d.apply_user_actions(&[UserAction::ApplyUndoActions { actions: group.undo }]).unwrap();
    assert!(matches!(d.get_cell(&TableId::new("T"), &ColId::new("X"), RowId(1)), Value::Int(1)));
}
