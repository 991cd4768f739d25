//! Row/table exchange format and backing stores for Stowage.
//!
//! This crate provides:
//! - [`DataTable`] - The storage-neutral table, header, and row model
//! - [`DataStore`] - The pluggable backing store contract
//! - [`MemoryStore`] - Tables kept in memory
//! - [`FileStore`] - Tables kept in one `MessagePack` file per schema
//! - [`JournalingStore`] - A wrapper recording every store call

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod file;
pub mod journal;
pub mod memory;
pub mod store;
pub mod table;

pub use file::FileStore;
pub use journal::{Journal, JournalingStore, StoreOp};
pub use memory::{MemoryStore, TableSet};
pub use store::{DataStore, SharedStore, shared};
pub use table::{DataField, DataRow, DataTable, TableHeader};
