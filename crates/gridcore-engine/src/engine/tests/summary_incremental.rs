//! S4 (spec 8): a summary table's `group` column stays current as the source table gains new
//! rows, including materializing a brand-new row for a previously unseen groupby tuple.

use gridcore_common::{ColId, ColumnType, RowId, TableId, Value};

use super::common::{bulk_values, doc, sales_table, values};
use crate::action::UserAction;
use crate::store::{Column, Table};
use crate::summary;

#[test]
fn summary_table_tracks_source_inserts_incrementally() {
    let mut d = doc();
    d.add_table(Table::new(sales_table()));
    d.add_column(&sales_table(), Column::new(ColId::new("Region"), ColumnType::Text));
    d.add_column(&sales_table(), Column::new(ColId::new("Amount"), ColumnType::Int));

    let summary_table = summary::ensure_summary_table(&mut d, &sales_table(), &[ColId::new("Region")]).unwrap();

    d.apply_user_actions(&[UserAction::BulkAddRecord {
        table: sales_table(),
        row_ids: Some(vec![RowId(1), RowId(2)]),
        columns: bulk_values(&[
            ("Region", vec![Value::Text("West".into()), Value::Text("West".into())]),
            ("Amount", vec![Value::Int(10), Value::Int(20)]),
        ]),
    }])
    .unwrap();

    assert_eq!(d.store.table(&summary_table).unwrap().num_rows(), 1);
    match d.get_cell(&summary_table, &ColId::new("group"), RowId(1)) {
        Value::RefList(_, rows) => assert_eq!(rows.len(), 2),
        other => panic!("expected RefList, got {other:?}"),
    }

    // A new region must materialize its own summary row.
    d.apply_user_actions(&[UserAction::AddRecord {
        table: sales_table(),
        row_id: Some(RowId(3)),
        values: values(&[("Region", Value::Text("East".into())), ("Amount", Value::Int(5))]),
    }])
    .unwrap();

    assert_eq!(d.store.table(&summary_table).unwrap().num_rows(), 2);
}
