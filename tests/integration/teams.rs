//! The team scenario: a contained list stored in a child table.

use std::cell::RefCell;
use std::rc::Rc;

use stowage::engine::{Declaration, Handle, Persist, PersistClass, Persisted, Persistence, handle};
use stowage::foundation::Value;
use stowage::store::{JournalingStore, MemoryStore, SharedStore, StoreOp};

#[derive(Default)]
struct Player {
    name: String,
    number: i32,
}

impl Persisted for Player {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::contained("Player"))
            .field(Persist::new(), "name", |p| &p.name, |p| &mut p.name)
            .field(Persist::new(), "number", |p| &p.number, |p| &mut p.number)
    }
}

#[derive(Default)]
struct Team {
    id: i64,
    members: Vec<Handle<Player>>,
}

impl Persisted for Team {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Team"))
            .field(Persist::id(), "id", |t| &t.id, |t| &mut t.id)
            .field(Persist::contained(), "members", |t| &t.members, |t| &mut t.members)
    }
}

fn player(name: &str, number: i32) -> Handle<Player> {
    handle(Player {
        name: name.to_string(),
        number,
    })
}

type Journaled = Rc<RefCell<JournalingStore<MemoryStore>>>;

fn setup() -> (Persistence, Journaled) {
    let store = Rc::new(RefCell::new(JournalingStore::new(MemoryStore::new("league"))));
    let mut persistence = Persistence::in_memory();
    persistence.install_store("global", Rc::clone(&store) as SharedStore);
    persistence.register::<Team>().unwrap();
    (persistence, store)
}

#[test]
fn members_are_written_to_the_child_table() {
    let (persistence, store) = setup();
    let journal = store.borrow().journal();

    persistence
        .put(Team {
            id: 7,
            members: vec![player("ann", 4), player("bo", 9), player("cy", 11)],
        })
        .unwrap();
    journal.clear();
    persistence.save_all().unwrap();

    assert_eq!(
        journal.writes(),
        [
            StoreOp::Save {
                table: "Team".into(),
                ids: vec![Value::Integer(7)],
            },
            StoreOp::ClearIds {
                table: "TeamMember".into(),
                ids: vec![Value::Integer(7)],
            },
            StoreOp::Save {
                table: "TeamMember".into(),
                ids: vec![Value::Integer(7); 3],
            },
        ]
    );

    let stored = store.borrow();
    let header = stored.inner().tables().header("TeamMember").unwrap();
    let columns: Vec<_> = header.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(columns, ["TeamId", "memberName", "memberNumber"]);
    assert_eq!(stored.inner().tables().row_count("TeamMember"), 3);
}

#[test]
fn saving_again_replaces_prior_rows() {
    let (persistence, store) = setup();
    let team = persistence
        .put(Team {
            id: 7,
            members: vec![player("ann", 4), player("bo", 9), player("cy", 11)],
        })
        .unwrap();
    persistence
        .put(Team {
            id: 8,
            members: vec![player("dee", 1)],
        })
        .unwrap();
    persistence.save_all().unwrap();

    team.borrow_mut().members.truncate(1);
    persistence.put_handle(&team).unwrap();
    persistence.save_all().unwrap();
    assert_eq!(store.borrow().inner().tables().row_count("TeamMember"), 2);

    persistence.clear_all();
    let team = persistence.get::<Team>(7).unwrap().unwrap();
    let names: Vec<_> = team
        .borrow()
        .members
        .iter()
        .map(|p| p.borrow().name.clone())
        .collect();
    assert_eq!(names, ["ann"]);
    let other = persistence.get::<Team>(8).unwrap().unwrap();
    assert_eq!(other.borrow().members[0].borrow().number, 1);
}

#[test]
fn removing_a_team_removes_its_members() {
    let (persistence, store) = setup();
    persistence
        .put(Team {
            id: 7,
            members: vec![player("ann", 4), player("bo", 9)],
        })
        .unwrap();
    persistence.save_all().unwrap();

    persistence.remove_id::<Team>(7).unwrap();
    persistence.save_all().unwrap();
    let stored = store.borrow();
    assert_eq!(stored.inner().tables().row_count("Team"), 0);
    assert_eq!(stored.inner().tables().row_count("TeamMember"), 0);
}

#[test]
fn a_team_removed_and_recreated_before_saving_is_kept() {
    let (persistence, store) = setup();
    let journal = store.borrow().journal();
    persistence
        .put(Team {
            id: 7,
            members: vec![player("a", 1), player("b", 2)],
        })
        .unwrap();
    persistence.save_all().unwrap();

    persistence.remove_id::<Team>(7).unwrap();
    persistence
        .put(Team {
            id: 7,
            members: vec![player("c", 3)],
        })
        .unwrap();
    journal.clear();
    persistence.save_all().unwrap();
    assert!(
        !journal
            .writes()
            .iter()
            .any(|op| matches!(op, StoreOp::Clear { .. }))
    );

    persistence.clear_all();
    let team = persistence.get::<Team>(7).unwrap().unwrap();
    let names: Vec<_> = team
        .borrow()
        .members
        .iter()
        .map(|p| p.borrow().name.clone())
        .collect();
    assert_eq!(names, ["c"]);
}
