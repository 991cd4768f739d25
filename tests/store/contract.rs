//! The store contract, run against every backing store.

use std::path::PathBuf;

use stowage_foundation::{DataType, ErrorKind, Value};
use stowage_store::{
    DataField, DataRow, DataStore, DataTable, FileStore, JournalingStore, MemoryStore,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "stowage_contract_{name}_{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn account_table() -> DataTable {
    let mut table = DataTable::new("Account");
    let header = table.header_mut();
    header.add(
        DataField::header("id", DataType::Integer)
            .with_id(true)
            .with_autogenerated(true),
    );
    header.add(DataField::header("name", DataType::String));
    header.add(DataField::header("active", DataType::Boolean));
    table
}

fn account(id: i64, name: &str, active: bool) -> DataRow {
    DataRow::new()
        .with(DataField::new("id", DataType::Integer, Value::Integer(id)).with_id(true))
        .with(DataField::new("name", DataType::String, Value::from(name)))
        .with(DataField::new("active", DataType::Boolean, Value::Boolean(active)))
}

fn member_table() -> DataTable {
    let mut table = DataTable::new("TeamMember");
    let header = table.header_mut();
    header.set_parent_key("TeamId");
    header.add(DataField::header("TeamId", DataType::Integer));
    header.add(DataField::header("memberName", DataType::String));
    table
}

fn member(team: i64, name: &str) -> DataRow {
    DataRow::new()
        .with(DataField::new("TeamId", DataType::Integer, Value::Integer(team)))
        .with(DataField::new("memberName", DataType::String, Value::from(name)))
}

fn loaded(store: &mut dyn DataStore, template: &DataTable) -> DataTable {
    let mut table = template.clone();
    store.load(&mut table).unwrap();
    table
}

fn names(table: &DataTable, column: &str) -> Vec<String> {
    table
        .rows()
        .iter()
        .map(|r| r.value(column).to_string())
        .collect()
}

// =============================================================================
// Contract
// =============================================================================

fn check_contract(store: &mut dyn DataStore) {
    let template = account_table();

    // Nothing works before connect.
    assert!(matches!(
        store.validate_table(&template).unwrap_err().kind,
        ErrorKind::NotConnected(_)
    ));
    store.connect().unwrap();
    store.connect().unwrap();
    assert!(store.is_connected());

    // Loading a table that was never validated fails.
    let mut unknown = template.clone();
    assert!(matches!(
        store.load(&mut unknown).unwrap_err().kind,
        ErrorKind::TableNotFound(_)
    ));

    store.validate_table(&template).unwrap();
    assert!(loaded(store, &template).is_empty());

    // Upsert by identity.
    let mut batch = template.clone();
    batch.add_row(account(1, "ada", true));
    batch.add_row(account(2, "bob", false));
    store.save(&batch).unwrap();

    let mut update = template.clone();
    update.add_row(account(2, "bea", true));
    store.save(&update).unwrap();

    let table = loaded(store, &template);
    assert_eq!(names(&table, "name"), ["ada", "bea"]);
    // Booleans come back in storage form.
    assert_eq!(table.rows()[0].value("active"), &Value::Integer(1));

    // Clear by row identity.
    let mut gone = template.clone();
    gone.add_row(account(1, "", false));
    store.clear(&gone).unwrap();
    assert_eq!(names(&loaded(store, &template), "name"), ["bea"]);

    // Child tables append and clear by parent key.
    let members = member_table();
    store.validate_table(&members).unwrap();
    let mut rows = members.clone();
    rows.add_row(member(1, "ann"));
    rows.add_row(member(1, "ann"));
    rows.add_row(member(2, "cat"));
    store.save(&rows).unwrap();
    assert_eq!(loaded(store, &members).len(), 3);

    store.clear_ids(&members, &[Value::Integer(1)]).unwrap();
    assert_eq!(names(&loaded(store, &members), "memberName"), ["cat"]);

    store.reset(&members).unwrap();
    assert!(loaded(store, &members).is_empty());

    // Unknown columns are rejected and nothing is written.
    let mut bad = template.clone();
    bad.add_row(account(7, "eve", true));
    bad.add_row(
        DataRow::new()
            .with(DataField::new("id", DataType::Integer, Value::Integer(8)).with_id(true))
            .with(DataField::new("nickname", DataType::String, Value::from("x"))),
    );
    assert!(store.save(&bad).is_err());
    assert_eq!(loaded(store, &template).len(), 1);

    store.disconnect().unwrap();
    assert!(!store.is_connected());
}

#[test]
fn memory_store_honors_contract() {
    check_contract(&mut MemoryStore::new("bank"));
}

#[test]
fn file_store_honors_contract() {
    let dir = scratch_dir("file");
    check_contract(&mut FileStore::new(&dir, "bank"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn deferred_file_store_honors_contract() {
    let dir = scratch_dir("deferred");
    check_contract(&mut FileStore::new(&dir, "bank").with_write_through(false));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn journaling_store_honors_contract() {
    check_contract(&mut JournalingStore::new(MemoryStore::new("bank")));
}

// =============================================================================
// Schema Evolution
// =============================================================================

#[test]
fn validate_adds_columns_to_existing_tables() {
    let mut store = MemoryStore::new("bank");
    store.connect().unwrap();

    let mut narrow = DataTable::new("Account");
    narrow
        .header_mut()
        .add(DataField::header("id", DataType::Integer).with_id(true));
    store.validate_table(&narrow).unwrap();
    let mut row = narrow.clone();
    row.add_row(
        DataRow::new().with(DataField::new("id", DataType::Integer, Value::Integer(1)).with_id(true)),
    );
    store.save(&row).unwrap();

    let wide = account_table();
    store.validate_table(&wide).unwrap();
    let table = loaded(&mut store, &wide);
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].value("name"), &Value::Null);
    assert_eq!(store.tables().header("Account").unwrap().len(), 3);
}
