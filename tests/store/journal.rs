//! Integration tests for the call journal

use stowage_foundation::{DataType, Value};
use stowage_store::{
    DataField, DataRow, DataStore, DataTable, Journal, JournalingStore, MemoryStore, StoreOp,
};

fn tag_table() -> DataTable {
    let mut table = DataTable::new("Tag");
    table
        .header_mut()
        .add(DataField::header("label", DataType::String).with_id(true));
    table
}

fn tag(label: &str) -> DataRow {
    DataRow::new().with(DataField::new("label", DataType::String, Value::from(label)).with_id(true))
}

#[test]
fn stores_can_share_one_journal() {
    let journal = Journal::new();
    let mut left = JournalingStore::with_journal(MemoryStore::new("left"), journal.clone());
    let mut right = JournalingStore::with_journal(MemoryStore::new("right"), journal.clone());

    let mut table = tag_table();
    left.connect().unwrap();
    right.connect().unwrap();
    left.validate_table(&table).unwrap();
    right.validate_table(&table).unwrap();
    table.add_row(tag("red"));
    right.save(&table).unwrap();

    assert_eq!(journal.len(), 5);
    assert_eq!(
        journal.writes(),
        [StoreOp::Save {
            table: "Tag".into(),
            ids: vec![Value::from("red")],
        }]
    );
    assert_eq!(right.inner().tables().row_count("Tag"), 1);
    assert_eq!(left.inner().tables().row_count("Tag"), 0);
}

#[test]
fn drain_empties_the_journal() {
    let mut store = JournalingStore::new(MemoryStore::new("tags"));
    let journal = store.journal();
    store.connect().unwrap();
    store.validate_table(&tag_table()).unwrap();

    let drained = journal.drain();
    assert_eq!(drained.len(), 2);
    assert!(journal.is_empty());

    store.reset(&tag_table()).unwrap();
    assert_eq!(journal.ops(), [StoreOp::Reset { table: "Tag".into() }]);
}

#[test]
fn failure_rules_can_target_one_table() {
    let mut store = JournalingStore::new(MemoryStore::new("tags"));
    store.fail_when(|op| op.is_write() && op.table() == Some("Tag"));
    store.connect().unwrap();
    let mut table = tag_table();
    store.validate_table(&table).unwrap();
    table.add_row(tag("blue"));

    let err = store.save(&table).unwrap_err();
    assert!(err.to_string().contains("injected failure"));
    assert_eq!(store.inner().tables().row_count("Tag"), 0);

    let mut loaded = tag_table();
    store.load(&mut loaded).unwrap();
    assert!(loaded.is_empty());
}
