//! Spec 8 invariants not already exercised by a named scenario: schema/metadata consistency (1),
//! quiescence after a full drain (2, 3), lookup index correctness (4), summary row correctness
//! (5), and the dangling-ref sentinel on a removed target row (8).

use std::cell::RefCell;
use std::rc::Rc;

use gridcore_common::{ColId, ColumnType, RowId, TableId, Value};

use super::common::{bulk_values, doc, sales_table, values};
use crate::action::UserAction;
use crate::docmodel;
use crate::document::EvalContext;
use crate::formula::{Formula, FormulaResult};
use crate::store::{Column, Table};
use crate::summary;

#[test]
fn live_schema_matches_metadata_after_user_actions() {
    let mut d = doc();
    d.apply_user_actions(&[UserAction::AddTable {
        table_id: Some(TableId::new("Widgets")),
        columns: vec![
            (ColId::new("Name"), crate::action::ColumnSpec {
                col_type: ColumnType::Text,
                ref_table: None,
                is_formula: false,
                formula: None,
                recalc_policy: crate::store::RecalcPolicy::Default,
                default_value: Value::Blank,
            }),
            (ColId::new("Price"), crate::action::ColumnSpec {
                col_type: ColumnType::Float,
                ref_table: None,
                is_formula: false,
                formula: None,
                recalc_policy: crate::store::RecalcPolicy::Default,
                default_value: Value::Blank,
            }),
        ],
    }])
    .unwrap();

    assert_eq!(docmodel::live_schema(&d), docmodel::schema_from_metadata(&d));

    d.apply_user_actions(&[UserAction::RemoveColumn { table: TableId::new("Widgets"), col_id: ColId::new("Price") }])
        .unwrap();
    assert_eq!(docmodel::live_schema(&d), docmodel::schema_from_metadata(&d));

    d.apply_user_actions(&[UserAction::RemoveTable { table: TableId::new("Widgets") }]).unwrap();
    assert_eq!(docmodel::live_schema(&d), docmodel::schema_from_metadata(&d));
}

#[test]
fn recompute_map_is_empty_at_quiescence() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("T")));
    d.add_column(&TableId::new("T"), Column::new(ColId::new("X"), ColumnType::Int));

    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("T"),
        row_id: Some(RowId(1)),
        values: values(&[("X", Value::Int(1))]),
    }])
    .unwrap();

    assert!(d.is_quiescent(), "engine must settle to no dirty nodes after a drained bundle");
}

/// A formula that looks up `People` rows with `Dept == "Eng"` and stashes the resulting row set
/// in a shared cell so the test can compare it against a manually computed expected set.
struct CaptureLookup(Rc<RefCell<Vec<RowId>>>);

impl Formula for CaptureLookup {
    fn eval(&self, row: RowId, ctx: &mut EvalContext<'_>) -> FormulaResult {
        let rows = ctx.lookup_records(
            &TableId::new("People"),
            &[ColId::new("Dept")],
            &[false],
            &[Value::Text("Eng".into())],
        )?;
        *self.0.borrow_mut() = rows.clone();
        Ok(Value::Int(row.0))
    }
}

#[test]
fn lookup_index_target_rows_match_key_column_values() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("People")));
    d.add_column(&TableId::new("People"), Column::new(ColId::new("Dept"), ColumnType::Text));
    d.add_table(Table::new(TableId::new("Probe")));
    let captured = Rc::new(RefCell::new(Vec::new()));
    d.add_column(
        &TableId::new("Probe"),
        Column::new(ColId::new("Trigger"), ColumnType::Int).with_formula(Rc::new(CaptureLookup(captured.clone()))),
    );

    d.apply_user_actions(&[UserAction::BulkAddRecord {
        table: TableId::new("People"),
        row_ids: Some(vec![RowId(1), RowId(2), RowId(3)]),
        columns: bulk_values(&[(
            "Dept",
            vec![Value::Text("Eng".into()), Value::Text("Sales".into()), Value::Text("Eng".into())],
        )]),
    }])
    .unwrap();
    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("Probe"),
        row_id: Some(RowId(1)),
        values: values(&[]),
    }])
    .unwrap();

    let mut via_lookup = captured.borrow().clone();
    via_lookup.sort_by_key(|r| r.0);

    let expected: Vec<RowId> = [RowId(1), RowId(2), RowId(3)]
        .into_iter()
        .filter(|r| matches!(d.get_cell(&TableId::new("People"), &ColId::new("Dept"), *r), Value::Text(s) if s == "Eng"))
        .collect();
    assert_eq!(via_lookup, expected);
}

#[test]
fn summary_group_matches_source_rows_sharing_the_groupby_tuple() {
    let mut d = doc();
    d.add_table(Table::new(sales_table()));
    d.add_column(&sales_table(), Column::new(ColId::new("Region"), ColumnType::Text));
    let summary_table = summary::ensure_summary_table(&mut d, &sales_table(), &[ColId::new("Region")]).unwrap();

    d.apply_user_actions(&[UserAction::BulkAddRecord {
        table: sales_table(),
        row_ids: Some(vec![RowId(1), RowId(2), RowId(3)]),
        columns: bulk_values(&[(
            "Region",
            vec![Value::Text("West".into()), Value::Text("East".into()), Value::Text("West".into())],
        )]),
    }])
    .unwrap();

    assert_eq!(d.store.table(&summary_table).unwrap().num_rows(), 2);
    for row in d.store.table(&summary_table).unwrap().iter_row_ids().collect::<Vec<_>>() {
        let region = d.get_cell(&summary_table, &ColId::new("Region"), row);
        let Value::RefList(_, group_rows) = d.get_cell(&summary_table, &ColId::new("group"), row) else {
            panic!("group column must hold a RefList");
        };
        let expected: Vec<RowId> = [RowId(1), RowId(2), RowId(3)]
            .into_iter()
            .filter(|r| d.get_cell(&sales_table(), &ColId::new("Region"), *r).strict_equal(&region))
            .collect();
        let mut sorted_group = group_rows.clone();
        sorted_group.sort_by_key(|r| r.0);
        let mut sorted_expected = expected.clone();
        sorted_expected.sort_by_key(|r| r.0);
        assert_eq!(sorted_group, sorted_expected);
    }
}

#[test]
fn dangling_ref_resolves_to_sentinel_after_target_row_removed() {
    let mut d = doc();
    d.add_table(Table::new(TableId::new("Depts")));
    d.add_column(&TableId::new("Depts"), Column::new(ColId::new("Name"), ColumnType::Text));
    d.add_table(Table::new(TableId::new("People")));
    d.add_column(
        &TableId::new("People"),
        Column::new(ColId::new("Dept"), ColumnType::Ref).with_ref_table(TableId::new("Depts")),
    );

    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("Depts"),
        row_id: Some(RowId(1)),
        values: values(&[("Name", Value::Text("Eng".into()))]),
    }])
    .unwrap();
    d.apply_user_actions(&[UserAction::AddRecord {
        table: TableId::new("People"),
        row_id: Some(RowId(1)),
        values: values(&[("Dept", Value::Ref(TableId::new("Depts"), RowId(1)))]),
    }])
    .unwrap();

    d.apply_user_actions(&[UserAction::RemoveRecord { table: TableId::new("Depts"), row_id: RowId(1) }]).unwrap();

    match d.get_cell(&TableId::new("People"), &ColId::new("Dept"), RowId(1)) {
        Value::Ref(t, r) => {
            assert_eq!(t, TableId::new("Depts"));
            assert_eq!(r, RowId::NONE);
        }
        other => panic!("expected a dangling Ref to resolve to the sentinel row, got {other:?}"),
    }
}
