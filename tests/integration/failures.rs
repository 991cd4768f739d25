//! Store failures leave the cache retryable.

use std::cell::RefCell;
use std::rc::Rc;

use stowage::engine::{Declaration, LoadState, Persist, PersistClass, Persisted, Persistence};
use stowage::foundation::ErrorKind;
use stowage::store::{JournalingStore, MemoryStore, SharedStore, StoreOp};

#[derive(Default)]
struct Order {
    id: i64,
    item: String,
}

impl Persisted for Order {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Order").with_schema("shop"))
            .field(Persist::auto_id(), "id", |o| &o.id, |o| &mut o.id)
            .field(Persist::new(), "item", |o| &o.item, |o| &mut o.item)
    }
}

type Journaled = Rc<RefCell<JournalingStore<MemoryStore>>>;

fn setup() -> (Persistence, Journaled) {
    let store = Rc::new(RefCell::new(JournalingStore::new(MemoryStore::new("shop"))));
    let mut persistence = Persistence::in_memory();
    persistence.install_store("shop", Rc::clone(&store) as SharedStore);
    persistence.register::<Order>().unwrap();
    (persistence, store)
}

fn order(item: &str) -> Order {
    Order {
        id: 0,
        item: item.to_string(),
    }
}

#[test]
fn failed_save_can_be_retried() {
    let (persistence, store) = setup();
    persistence.put(order("lamp")).unwrap();
    persistence.put(order("desk")).unwrap();
    persistence.remove_id::<Order>(1).unwrap();

    store
        .borrow_mut()
        .fail_when(|op| matches!(op, StoreOp::Save { .. }));
    let err = persistence.save_all().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Store { .. }));
    assert!(persistence.is_dirty());

    store.borrow_mut().clear_failure();
    persistence.save_all().unwrap();
    assert!(!persistence.is_dirty());
    assert_eq!(store.borrow().inner().tables().row_count("Order"), 1);

    persistence.clear_all();
    let orders = persistence.get_all::<Order>().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].borrow().item, "desk");
}

#[test]
fn failed_load_leaves_the_cache_empty() {
    let (persistence, store) = setup();
    persistence.put(order("lamp")).unwrap();
    persistence.save_all().unwrap();
    persistence.clear_all();

    store
        .borrow_mut()
        .fail_when(|op| matches!(op, StoreOp::Load { .. }));
    assert!(persistence.get::<Order>(1).is_err());
    assert!(persistence.descriptor::<Order>().is_err());

    store.borrow_mut().clear_failure();
    let descriptor = persistence.descriptor::<Order>().unwrap();
    assert_eq!(descriptor.borrow().load_state(), LoadState::Loaded);
    assert_eq!(descriptor.borrow().len(), 1);
}

#[test]
fn other_types_still_save_when_one_fails() {
    #[derive(Default)]
    struct Receipt {
        number: String,
    }

    impl Persisted for Receipt {
        fn declare() -> Declaration<Self> {
            Declaration::<Self>::new(PersistClass::new("Receipt").with_schema("shop"))
                .field(Persist::id(), "number", |r| &r.number, |r| &mut r.number)
        }
    }

    let (mut persistence, store) = setup();
    persistence.register::<Receipt>().unwrap();
    persistence.put(order("lamp")).unwrap();
    persistence
        .put(Receipt {
            number: "R-1".to_string(),
        })
        .unwrap();

    store
        .borrow_mut()
        .fail_when(|op| op.table() == Some("Order") && op.is_write());
    assert!(persistence.save_all().is_err());
    assert_eq!(store.borrow().inner().tables().row_count("Receipt"), 1);
    assert_eq!(store.borrow().inner().tables().row_count("Order"), 0);
}
