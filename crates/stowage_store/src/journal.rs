//! Store call recording.
//!
//! [`JournalingStore`] wraps any [`DataStore`] and appends every call that
//! reaches the inner store to a shared journal, so the traffic produced by a
//! save or load cycle can be inspected. A failure rule can be installed to
//! make chosen calls fail before they reach the inner store.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use stowage_foundation::{Error, Result, Value};

use crate::store::DataStore;
use crate::table::DataTable;

// =============================================================================
// Store Op
// =============================================================================

/// One recorded store call.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOp {
    /// The store was connected.
    Connect,
    /// The store was disconnected.
    Disconnect,
    /// A table was validated.
    Validate {
        /// Table name.
        table: String,
    },
    /// A table was loaded.
    Load {
        /// Table name.
        table: String,
    },
    /// Rows were upserted or appended.
    Save {
        /// Table name.
        table: String,
        /// Key column values of the saved rows.
        ids: Vec<Value>,
    },
    /// Rows were deleted by content.
    Clear {
        /// Table name.
        table: String,
        /// Key column values of the deleted rows.
        ids: Vec<Value>,
    },
    /// Rows were deleted by key.
    ClearIds {
        /// Table name.
        table: String,
        /// Keys deleted.
        ids: Vec<Value>,
    },
    /// A table was truncated.
    Reset {
        /// Table name.
        table: String,
    },
}

impl StoreOp {
    /// Table the call acted on, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Connect | Self::Disconnect => None,
            Self::Validate { table }
            | Self::Load { table }
            | Self::Save { table, .. }
            | Self::Clear { table, .. }
            | Self::ClearIds { table, .. }
            | Self::Reset { table } => Some(table),
        }
    }

    /// Returns true for calls that change stored rows.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Save { .. } | Self::Clear { .. } | Self::ClearIds { .. } | Self::Reset { .. }
        )
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |ids: &[Value]| {
            ids.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Disconnect => write!(f, "disconnect"),
            Self::Validate { table } => write!(f, "validate {table}"),
            Self::Load { table } => write!(f, "load {table}"),
            Self::Save { table, ids: keys } => write!(f, "save {table} [{}]", ids(keys)),
            Self::Clear { table, ids: keys } => write!(f, "clear {table} [{}]", ids(keys)),
            Self::ClearIds { table, ids: keys } => {
                write!(f, "clear-ids {table} [{}]", ids(keys))
            }
            Self::Reset { table } => write!(f, "reset {table}"),
        }
    }
}

// =============================================================================
// Journal
// =============================================================================

/// Shared, append-only record of store calls.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    ops: Rc<RefCell<Vec<StoreOp>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn record(&self, op: StoreOp) {
        self.ops.borrow_mut().push(op);
    }

    /// Copy of every recorded call, oldest first.
    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.borrow().clone()
    }

    /// Recorded calls that changed stored rows.
    #[must_use]
    pub fn writes(&self) -> Vec<StoreOp> {
        self.ops.borrow().iter().filter(|op| op.is_write()).cloned().collect()
    }

    /// Removes and returns every recorded call.
    pub fn drain(&self) -> Vec<StoreOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        self.ops.borrow_mut().clear();
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.borrow().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.borrow().is_empty()
    }
}

// =============================================================================
// Journaling Store
// =============================================================================

type FailureRule = Box<dyn Fn(&StoreOp) -> bool>;

/// A store wrapper recording every call.
///
/// Calls rejected by the failure rule are not recorded and never reach the
/// inner store.
pub struct JournalingStore<S> {
    inner: S,
    journal: Journal,
    fail_when: Option<FailureRule>,
}

impl<S: DataStore> JournalingStore<S> {
    /// Wraps `inner` with a fresh journal.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self::with_journal(inner, Journal::new())
    }

    /// Wraps `inner`, recording into an existing journal.
    #[must_use]
    pub fn with_journal(inner: S, journal: Journal) -> Self {
        Self {
            inner,
            journal,
            fail_when: None,
        }
    }

    /// A handle to the journal.
    #[must_use]
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes every call matching `rule` fail with a store error.
    pub fn fail_when(&mut self, rule: impl Fn(&StoreOp) -> bool + 'static) {
        self.fail_when = Some(Box::new(rule));
    }

    /// Removes the failure rule.
    pub fn clear_failure(&mut self) {
        self.fail_when = None;
    }

    fn admit(&self, op: StoreOp) -> Result<()> {
        if self.fail_when.as_ref().is_some_and(|rule| rule(&op)) {
            return Err(Error::store(
                self.inner.name(),
                format!("injected failure: {op}"),
            ));
        }
        self.journal.record(op);
        Ok(())
    }
}

impl<S: fmt::Debug> fmt::Debug for JournalingStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalingStore")
            .field("inner", &self.inner)
            .field("journal", &self.journal)
            .field("fail_when", &self.fail_when.is_some())
            .finish()
    }
}

impl<S: DataStore> DataStore for JournalingStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn connect(&mut self) -> Result<()> {
        if self.inner.is_connected() {
            return Ok(());
        }
        self.admit(StoreOp::Connect)?;
        self.inner.connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        self.admit(StoreOp::Disconnect)?;
        self.inner.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn validate_table(&mut self, table: &DataTable) -> Result<()> {
        self.admit(StoreOp::Validate {
            table: table.name().to_string(),
        })?;
        self.inner.validate_table(table)
    }

    fn load(&mut self, table: &mut DataTable) -> Result<()> {
        self.admit(StoreOp::Load {
            table: table.name().to_string(),
        })?;
        self.inner.load(table)
    }

    fn save(&mut self, table: &DataTable) -> Result<()> {
        self.admit(StoreOp::Save {
            table: table.name().to_string(),
            ids: table.key_values(),
        })?;
        self.inner.save(table)
    }

    fn clear(&mut self, table: &DataTable) -> Result<()> {
        self.admit(StoreOp::Clear {
            table: table.name().to_string(),
            ids: table.key_values(),
        })?;
        self.inner.clear(table)
    }

    fn clear_ids(&mut self, table: &DataTable, ids: &[Value]) -> Result<()> {
        self.admit(StoreOp::ClearIds {
            table: table.name().to_string(),
            ids: ids.to_vec(),
        })?;
        self.inner.clear_ids(table, ids)
    }

    fn reset(&mut self, table: &DataTable) -> Result<()> {
        self.admit(StoreOp::Reset {
            table: table.name().to_string(),
        })?;
        self.inner.reset(table)
    }
}
