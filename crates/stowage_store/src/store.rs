//! The backing store contract.

use std::cell::RefCell;
use std::rc::Rc;

use stowage_foundation::{Result, Value};

use crate::table::DataTable;

/// A pluggable backing store.
///
/// Every operation takes a [`DataTable`] describing the table it acts on.
/// Only the header is consulted by `validate_table`, `load`, `clear_ids` and
/// `reset`; `save` and `clear` also read the rows.
pub trait DataStore {
    /// Name of the store, usually the schema it serves.
    fn name(&self) -> &str;

    /// Opens the store. Idempotent; called before every operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be opened.
    fn connect(&mut self) -> Result<()>;

    /// Closes the store, flushing any pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if pending writes cannot be flushed.
    fn disconnect(&mut self) -> Result<()>;

    /// Returns true while connected.
    fn is_connected(&self) -> bool;

    /// Ensures the physical table matches the header, creating the table or
    /// adding missing columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not connected or the table cannot be
    /// altered.
    fn validate_table(&mut self, table: &DataTable) -> Result<()>;

    /// Replaces `table`'s rows with the stored rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not connected or the table has not
    /// been validated.
    fn load(&mut self, table: &mut DataTable) -> Result<()>;

    /// Upserts `table`'s rows by identity, or appends them if the table has
    /// no identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not connected, the table has not been
    /// validated, or a value does not fit its column.
    fn save(&mut self, table: &DataTable) -> Result<()>;

    /// Deletes the stored rows whose identity matches a row of `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not connected or the table has not
    /// been validated.
    fn clear(&mut self, table: &DataTable) -> Result<()>;

    /// Deletes the stored rows whose key column holds one of `ids`.
    ///
    /// The key column is the identity of an entity table, or the parent key
    /// of a child table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not connected or the table has not
    /// been validated.
    fn clear_ids(&mut self, table: &DataTable, ids: &[Value]) -> Result<()>;

    /// Deletes every stored row of the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not connected.
    fn reset(&mut self, table: &DataTable) -> Result<()>;
}

/// A store shared by every descriptor of one schema.
pub type SharedStore = Rc<RefCell<dyn DataStore>>;

/// Wraps a store for sharing.
#[must_use]
pub fn shared<S: DataStore + 'static>(store: S) -> SharedStore {
    Rc::new(RefCell::new(store))
}
