//! Integration tests for file-backed stores
//!
//! Tests that tables survive reopening and that stores of different schemas
//! keep separate files.

use std::path::PathBuf;

use stowage_foundation::{DataType, ErrorKind, Value};
use stowage_store::file::{from_bytes, load_from_file, to_bytes};
use stowage_store::{DataField, DataRow, DataStore, DataTable, FileStore};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stowage_files_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn event_table() -> DataTable {
    let mut table = DataTable::new("Event");
    table
        .header_mut()
        .add(DataField::header("id", DataType::Integer).with_id(true));
    table
        .header_mut()
        .add(DataField::header("title", DataType::String));
    table
}

fn event(id: i64, title: &str) -> DataRow {
    DataRow::new()
        .with(DataField::new("id", DataType::Integer, Value::Integer(id)).with_id(true))
        .with(DataField::new("title", DataType::String, Value::from(title)))
}

#[test]
fn tables_survive_reopen() {
    let dir = scratch_dir("reopen");
    {
        let mut store = FileStore::new(&dir, "calendar");
        store.connect().unwrap();
        let mut table = event_table();
        store.validate_table(&table).unwrap();
        table.add_row(event(1, "launch"));
        table.add_row(event(2, "review"));
        store.save(&table).unwrap();
    }

    let mut store = FileStore::new(&dir, "calendar");
    store.connect().unwrap();
    let mut table = event_table();
    store.validate_table(&table).unwrap();
    store.load(&mut table).unwrap();
    assert_eq!(table.key_values(), [Value::Integer(1), Value::Integer(2)]);
    assert_eq!(table.rows()[0].value("title"), &Value::from("launch"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn schemas_keep_separate_files() {
    let dir = scratch_dir("schemas");
    let mut work = FileStore::new(&dir, "work");
    let mut home = FileStore::new(&dir, "home life");
    for store in [&mut work, &mut home] {
        store.connect().unwrap();
        store.validate_table(&event_table()).unwrap();
    }
    let mut table = event_table();
    table.add_row(event(1, "standup"));
    work.save(&table).unwrap();

    assert!(home.path().ends_with("home_life.msgpack"));
    assert_eq!(load_from_file(work.path()).unwrap().row_count("Event"), 1);
    assert_eq!(load_from_file(home.path()).unwrap().row_count("Event"), 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn deferred_store_flushes_on_disconnect() {
    let dir = scratch_dir("deferred");
    let mut store = FileStore::new(&dir, "calendar").with_write_through(false);
    store.connect().unwrap();
    let mut table = event_table();
    store.validate_table(&table).unwrap();
    table.add_row(event(1, "launch"));
    store.save(&table).unwrap();
    assert!(store.has_pending_writes());
    assert!(!store.path().exists());

    store.disconnect().unwrap();
    assert!(!store.has_pending_writes());
    assert_eq!(load_from_file(store.path()).unwrap().row_count("Event"), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn encoded_tables_decode_identically() {
    let mut store = stowage_store::MemoryStore::new("calendar");
    store.connect().unwrap();
    let mut table = event_table();
    store.validate_table(&table).unwrap();
    table.add_row(event(3, "retro"));
    store.save(&table).unwrap();

    let bytes = to_bytes(store.tables()).unwrap();
    let decoded = from_bytes(&bytes).unwrap();
    assert_eq!(decoded.table_names(), ["Event"]);
    assert_eq!(decoded.row_count("Event"), 1);
    assert_eq!(decoded.header("Event"), store.tables().header("Event"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = scratch_dir("missing");
    let err = load_from_file(dir.join("nothing.msgpack")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IoError(_)));
}
