//! Integration tests for load sessions
//!
//! Tests that loading a type pulls in what it points at, and that cycles
//! and dangling identities resolve without failing the load.

use std::rc::Rc;

use stowage_engine::{Declaration, Handle, LoadReport, Persist, PersistClass, Persisted, Persistence, handle};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Default)]
struct Author {
    name: String,
    favorite: Option<Handle<Book>>,
}

impl Persisted for Author {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Author"))
            .field(Persist::id(), "name", |a| &a.name, |a| &mut a.name)
            .field(Persist::new(), "favorite", |a| &a.favorite, |a| &mut a.favorite)
    }
}

#[derive(Default)]
struct Book {
    isbn: String,
    author: Option<Handle<Author>>,
}

impl Persisted for Book {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Book"))
            .field(Persist::id(), "isbn", |b| &b.isbn, |b| &mut b.isbn)
            .field(Persist::new(), "author", |b| &b.author, |b| &mut b.author)
    }
}

#[derive(Default)]
struct Shelf {
    id: i64,
    books: Vec<Handle<Book>>,
}

impl Persisted for Shelf {
    fn declare() -> Declaration<Self> {
        Declaration::<Self>::new(PersistClass::new("Shelf"))
            .field(Persist::auto_id(), "id", |s| &s.id, |s| &mut s.id)
            .field(Persist::new(), "books", |s| &s.books, |s| &mut s.books)
    }
}

fn author(name: &str) -> Author {
    Author {
        name: name.to_string(),
        favorite: None,
    }
}

fn book(isbn: &str, author: &Handle<Author>) -> Book {
    Book {
        isbn: isbn.to_string(),
        author: Some(Rc::clone(author)),
    }
}

fn library() -> Persistence {
    let mut persistence = Persistence::in_memory();
    persistence.register::<Shelf>().unwrap();

    let le_guin = persistence.put(author("le guin")).unwrap();
    let earthsea = persistence.put(book("0-553-26250-5", &le_guin)).unwrap();
    let dispossessed = persistence.put(book("0-06-051275-X", &le_guin)).unwrap();
    le_guin.borrow_mut().favorite = Some(Rc::clone(&earthsea));
    persistence.put_handle(&le_guin).unwrap();
    persistence
        .put(Shelf {
            id: 0,
            books: vec![dispossessed, earthsea],
        })
        .unwrap();
    persistence.save_all().unwrap();
    persistence.clear_all();
    persistence
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn registering_follows_references() {
    let mut persistence = Persistence::in_memory();
    persistence.register::<Shelf>().unwrap();
    assert_eq!(persistence.len(), 3);
    assert!(persistence.is_registered::<Book>());
    assert!(persistence.is_registered::<Author>());
}

#[test]
fn loading_a_type_loads_its_targets() {
    let persistence = library();
    let report = persistence.load::<Shelf>().unwrap();
    assert_eq!(
        report,
        LoadReport {
            types_loaded: 3,
            rows_loaded: 4,
            references_resolved: 3,
            references_unset: 0,
            lists_linked: 1,
            failures: 0,
        }
    );

    // Everything is loaded now; a second load does nothing.
    assert_eq!(persistence.load::<Book>().unwrap(), LoadReport::default());
}

#[test]
fn lists_keep_their_order() {
    let persistence = library();
    let shelf = persistence.get::<Shelf>(1).unwrap().unwrap();
    let isbns: Vec<_> = shelf
        .borrow()
        .books
        .iter()
        .map(|b| b.borrow().isbn.clone())
        .collect();
    assert_eq!(isbns, ["0-06-051275-X", "0-553-26250-5"]);
}

#[test]
fn mutual_references_resolve_to_cached_instances() {
    let persistence = library();
    let author = persistence.get::<Author>("le guin").unwrap().unwrap();
    let favorite = author.borrow().favorite.clone().unwrap();
    let back = favorite.borrow().author.clone().unwrap();
    assert!(Rc::ptr_eq(&author, &back));
    assert!(Rc::ptr_eq(
        &favorite,
        &persistence.get::<Book>("0-553-26250-5").unwrap().unwrap()
    ));
}

#[test]
fn dangling_identities_are_dropped() {
    let persistence = library();
    persistence.remove_id::<Book>("0-553-26250-5").unwrap();
    persistence.save_all().unwrap();
    persistence.clear_all();

    let report = persistence.load::<Shelf>().unwrap();
    assert_eq!(report.references_unset, 1);
    assert_eq!(report.failures, 0);

    let author = persistence.get::<Author>("le guin").unwrap().unwrap();
    assert!(author.borrow().favorite.is_none());
    let shelf = persistence.get::<Shelf>(1).unwrap().unwrap();
    assert_eq!(shelf.borrow().books.len(), 1);
}

#[test]
fn unsaved_handles_are_not_persisted() {
    let mut persistence = Persistence::in_memory();
    persistence.register::<Book>().unwrap();
    let stray = handle(author("stray"));
    persistence.put(book("x", &stray)).unwrap();
    persistence.save_all().unwrap();
    persistence.clear_all();

    let loaded = persistence.get::<Book>("x").unwrap().unwrap();
    assert!(loaded.borrow().author.is_none());
    assert!(persistence.get::<Author>("stray").unwrap().is_none());
}
