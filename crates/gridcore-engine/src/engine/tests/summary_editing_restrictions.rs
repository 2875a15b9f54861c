//! Editing restrictions (spec 4.7): a summary table's groupby column cannot be removed, and its
//! rows cannot be removed directly.

use gridcore_common::{ColId, ColumnType, RowId, Value};

use super::common::{doc, sales_table, values};
use crate::action::UserAction;
use crate::store::{Column, Table};
use crate::summary;

#[test]
fn summary_editing_restrictions_are_enforced() {
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

    let remove_row =
        d.apply_user_actions(&[UserAction::RemoveRecord { table: summary_table.clone(), row_id: RowId(1) }]);
    assert!(remove_row.is_err(), "summary rows must not be removable directly");

    let remove_col =
        d.apply_user_actions(&[UserAction::RemoveColumn { table: summary_table, col_id: ColId::new("Region") }]);
    assert!(remove_col.is_err(), "groupby columns must not be removable");
}
