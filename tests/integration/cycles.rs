//! Mutually referencing types load without recursing.

use std::rc::Rc;

use stowage::engine::{Declaration, Handle, Persist, PersistClass, Persisted, Persistence};

#[derive(Default)]
struct Husband {
    id: i64,
    spouse: Option<Handle<Wife>>,
}

impl Persisted for Husband {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Husband"))
            .field(Persist::id(), "id", |h| &h.id, |h| &mut h.id)
            .field(Persist::new(), "spouse", |h| &h.spouse, |h| &mut h.spouse)
    }
}

#[derive(Default)]
struct Wife {
    id: i64,
    spouse: Option<Handle<Husband>>,
}

impl Persisted for Wife {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Wife"))
            .field(Persist::id(), "id", |w| &w.id, |w| &mut w.id)
            .field(Persist::new(), "spouse", |w| &w.spouse, |w| &mut w.spouse)
    }
}

fn married(pairs: i64) -> Persistence {
    let mut persistence = Persistence::in_memory();
    persistence.register::<Husband>().unwrap();
    for id in 1..=pairs {
        let husband = persistence.put(Husband { id, spouse: None }).unwrap();
        let wife = persistence
            .put(Wife {
                id,
                spouse: Some(Rc::clone(&husband)),
            })
            .unwrap();
        husband.borrow_mut().spouse = Some(wife);
        persistence.put_handle(&husband).unwrap();
    }
    persistence.save_all().unwrap();
    persistence.clear_all();
    persistence
}

#[test]
fn both_sides_resolve() {
    let persistence = married(3);
    let report = persistence.load::<Husband>().unwrap();
    assert_eq!(report.types_loaded, 2);
    assert_eq!(report.rows_loaded, 6);
    assert_eq!(report.references_resolved, 6);

    for id in 1..=3 {
        let husband = persistence.get::<Husband>(id).unwrap().unwrap();
        let wife = husband.borrow().spouse.clone().unwrap();
        assert_eq!(wife.borrow().id, id);
        let back = wife.borrow().spouse.clone().unwrap();
        assert!(Rc::ptr_eq(&husband, &back));
    }
}

#[test]
fn loading_from_either_side() {
    let persistence = married(1);
    let wife = persistence.get::<Wife>(1).unwrap().unwrap();
    let husband = wife.borrow().spouse.clone().unwrap();
    assert!(husband.borrow().spouse.is_some());
    assert!(Rc::ptr_eq(
        &husband,
        &persistence.get::<Husband>(1).unwrap().unwrap()
    ));
}
