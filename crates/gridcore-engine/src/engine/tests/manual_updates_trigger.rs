//! S5 (spec 8): a `ManualUpdates` trigger column recomputes whenever its row is touched by any
//! direct user action, independent of which column was actually written.

use std::cell::RefCell;
use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, RowId, TableId, Value};

use super::common::{doc, values};
use crate::action::{ColumnSpec, UserAction};
use crate::document::EvalContext;
use crate::formula::{Formula, FormulaResult};
use crate::store::{Column, RecalcPolicy, Table};

struct Counter(Rc<RefCell<i64>>);

impl Formula for Counter {
    fn eval(&self, _row: RowId, _ctx: &mut EvalContext<'_>) -> FormulaResult {
        let mut c = self.0.borrow_mut();
        *c += 1;
        Ok(Value::Int(*c))
    }
}

#[test]
fn manual_updates_trigger_fires_on_any_row_touch() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("Tasks")));
    d.add_column(&TableId::new("Tasks"), Column::new(ColId::new("Name"), ColumnType::Text));

    let counter = Rc::new(RefCell::new(0i64));
    d.apply_user_actions(&[UserAction::AddColumn {
        table: TableId::new("Tasks"),
        col_id: Some(ColId::new("Touch")),
        spec: ColumnSpec {
            col_type: ColumnType::Int,
            ref_table: None,
            is_formula: true,
            formula: Some(Rc::new(Counter(counter.clone()))),
            recalc_policy: RecalcPolicy::ManualUpdates,
            default_value: Value::Blank,
        },
    }])
    .unwrap();

    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("Tasks"),
        row_id: Some(RowId(1)),
        values: values(&[("Name", Value::Text("a".into()))]),
    }])
    .unwrap();
    assert_eq!(*counter.borrow(), 1);

    // Touching an unrelated column on the same row must re-fire Touch.
    d.apply_user_actions(&[UserAction::UpdateRecord {
        table: TableId::new("Tasks"),
        row_id: RowId(1),
        values: values(&[("Name", Value::Text("b".into()))]),
    }])
    .unwrap();
    assert_eq!(*counter.borrow(), 2);
}
