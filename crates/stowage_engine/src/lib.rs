//! Entity declarations, field bindings, caches, and load sessions for Stowage.
//!
//! This crate provides:
//! - [`Persisted`] - How a type declares its table and fields
//! - [`PersistedClass`] - A declaration checked against the persistence rules
//! - [`EntityDescriptor`] - The identity-keyed cache of one type and its store
//! - [`LoadSession`] - Deferred resolution of references and lists during loads
//! - [`Persistence`] - The registry tying types, descriptors, and stores together

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod class;
pub mod config;
pub mod declare;
pub mod descriptor;
pub mod field;
mod list;
pub mod persistence;
mod reference;
mod scalar;
pub mod session;
pub mod value;

pub use cache::{Cache, CachedObject};
pub use class::{MAX_CONTAINMENT_DEPTH, PersistedClass};
pub use config::{PersistenceConfig, StoreBackend};
pub use declare::{Accessor, Declaration, Handle, Persist, PersistClass, Persisted, handle};
pub use descriptor::{EntityDescriptor, LoadState};
pub use field::{FieldBinding, FieldInfo, FieldKind};
pub use persistence::Persistence;
pub use session::{LoadReport, LoadSession};
pub use value::{FieldValue, ListElement, ScalarValue};
