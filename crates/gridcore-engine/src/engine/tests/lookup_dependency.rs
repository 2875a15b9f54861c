//! S1 (spec 8): a formula's `lookup_records` follows through when the key column of a
//! referencing row changes.

use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, RowId, TableId, Value};

use super::common::{bulk_values, doc, values};
use crate::action::UserAction;
use crate::document::EvalContext;
use crate::formula::{Formula, FormulaResult};
use crate::store::{Column, Table};

/// Count of `People` rows whose `Dept` ref points at this `Depts` row.
struct DeptCountFormula;

impl Formula for DeptCountFormula {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult {
        let depts = ctx.current_node().table_id.clone();
        let key = Value::Ref(depts, row);
        let rows = ctx.lookup_records(&TableId::new("People"), &[ColId::new("Dept")], &[false], &[key])?;
        Ok(Value::Int(rows.len() as i64))
    }
}

fn people_depts_fixture() -> crate::document::Document {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("Depts")));
    d.add_column(&TableId::new("Depts"), Column::new(ColId::new("Name"), ColumnType::Text));
    d.add_column(
        &TableId::new("Depts"),
        Column::new(ColId::new("Count"), ColumnType::Int).with_formula(Rc::new(DeptCountFormula)),
    );
    d.add_table(Table::new(TableId::new("People")));
    d.add_column(&TableId::new("People"), Column::new(ColId::new("Name"), ColumnType::Text));
    d.add_column(
        &TableId::new("People"),
        Column::new(ColId::new("Dept"), ColumnType::Ref).with_ref_table(TableId::new("Depts")),
    );
    d
}

#[test]
fn lookup_dependency_follows_key_column_edits() {
    let mut d = people_depts_fixture();
    d.apply_user_actions(&[UserAction::BulkAddRecord {
        table: TableId::new("Depts"),
        row_ids: Some(vec![RowId(1), RowId(2)]),
        columns: bulk_values(&[("Name", vec![Value::Text("Eng".into()), Value::Text("Sales".into())])]),
    }])
    .unwrap();

    let eng = Value::Ref(TableId::new("Depts"), RowId(1));
    let sales = Value::Ref(TableId::new("Depts"), RowId(2));
    d.apply_user_actions(&[UserAction::BulkAddRecord {
        table: TableId::new("People"),
        row_ids: Some(vec![RowId(1), RowId(2)]),
        columns: bulk_values(&[
            ("Name", vec![Value::Text("Alice".into()), Value::Text("Bob".into())]),
            ("Dept", vec![eng.clone(), eng.clone()]),
        ]),
    }])
    .unwrap();

    assert!(matches!(
        d.get_cell(&TableId::new("Depts"), &ColId::new("Count"), RowId(1)),
        Value::Int(2)
    ));
    assert!(matches!(
        d.get_cell(&TableId::new("Depts"), &ColId::new("Count"), RowId(2)),
        Value::Int(0)
    ));

    // Move Bob from Eng to Sales; both departments' counts must follow.
    d.apply_user_actions(&[UserAction::UpdateRecord {
        table: TableId::new("People"),
        row_id: RowId(2),
        values: values(&[("Dept", sales)]),
    }])
    .unwrap();

    assert!(matches!(
        d.get_cell(&TableId::new("Depts"), &ColId::new("Count"), RowId(1)),
        Value::Int(1)
    ));
    assert!(matches!(
        d.get_cell(&TableId::new("Depts"), &ColId::new("Count"), RowId(2)),
        Value::Int(1)
    ));
}
