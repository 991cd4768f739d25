//! The account scenario: autogenerated identities, removal, reload.

use std::cell::RefCell;
use std::rc::Rc;

use stowage::engine::{Declaration, Persist, PersistClass, Persisted, Persistence, PersistedClass};
use stowage::foundation::{DataType, Value};
use stowage::store::{JournalingStore, MemoryStore, SharedStore, StoreOp};

#[derive(Debug, Default)]
struct Account {
    id: i64,
    name: String,
}

impl Account {
    fn named(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
        }
    }
}

impl Persisted for Account {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Account"))
            .field(Persist::auto_id(), "id", |a| &a.id, |a| &mut a.id)
            .field(Persist::new(), "name", |a| &a.name, |a| &mut a.name)
    }
}

#[test]
fn account_table_shape() {
    let class = PersistedClass::<Account>::bind().unwrap();
    let table = class.table();
    assert_eq!(table.name(), "Account");

    let fields = table.header().fields();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name, "id");
    assert_eq!(fields[0].data_type, DataType::Integer);
    assert!(fields[0].id && fields[0].autogenerated);
    assert_eq!(fields[1].name, "name");
    assert!(!fields[1].id);
}

#[test]
fn remove_save_reload() {
    let store = Rc::new(RefCell::new(JournalingStore::new(MemoryStore::new("global"))));
    let journal = store.borrow().journal();
    let mut persistence = Persistence::in_memory();
    persistence.install_store("global", Rc::clone(&store) as SharedStore);
    persistence.register::<Account>().unwrap();

    let ann = persistence.put(Account::named("ann")).unwrap();
    let bob = persistence.put(Account::named("bob")).unwrap();
    assert_eq!(ann.borrow().id, 1);
    assert_eq!(bob.borrow().id, 2);

    assert!(persistence.remove_id::<Account>(1).unwrap());
    journal.clear();
    persistence.save_all().unwrap();
    assert_eq!(
        journal.writes(),
        [
            StoreOp::Clear {
                table: "Account".into(),
                ids: vec![Value::Integer(1)],
            },
            StoreOp::Save {
                table: "Account".into(),
                ids: vec![Value::Integer(2)],
            },
        ]
    );

    persistence.clear_all();
    let all = persistence.get_all::<Account>().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].borrow().id, 2);
    assert_eq!(all[0].borrow().name, "bob");
    assert!(persistence.get::<Account>(1).unwrap().is_none());
}

#[test]
fn saving_twice_writes_once() {
    let store = Rc::new(RefCell::new(JournalingStore::new(MemoryStore::new("global"))));
    let journal = store.borrow().journal();
    let mut persistence = Persistence::in_memory();
    persistence.install_store("global", Rc::clone(&store) as SharedStore);
    persistence.register::<Account>().unwrap();

    persistence.put(Account::named("ann")).unwrap();
    persistence.save_all().unwrap();
    assert_eq!(journal.writes().len(), 1);
    assert!(!persistence.is_dirty());

    journal.clear();
    persistence.save_all().unwrap();
    assert!(journal.is_empty());

    // A freshly loaded cache is clean too.
    persistence.clear_all();
    persistence.load::<Account>().unwrap();
    journal.clear();
    persistence.save_all().unwrap();
    assert!(journal.writes().is_empty());
}
