//! Load sessions.
//!
//! Loading one type can require others: references and list elements point
//! at instances of other types, possibly back at the type being loaded. A
//! [`LoadSession`] turns that recursion into a worklist. Queues are drained
//! in strict priority:
//!
//! 1. types to load (base rows only, references queued);
//! 2. deferred references;
//! 3. list sub-table loads;
//! 4. deferred list links.
//!
//! A pending item whose target type is not loaded yet requests that type and
//! goes back on its queue, so every type's base rows are cached before any
//! pointer into it is resolved, and references settle before lists begin.
//! Each type is loaded at most once per session.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, warn};

use stowage_foundation::{Error, Result, Value};

use crate::descriptor::{ErasedDescriptor, LoadState};
use crate::reference::Target;

/// Looks up type-erased descriptors by type.
pub(crate) trait Registry {
    fn erased(&self, type_id: TypeId) -> Option<Rc<RefCell<dyn ErasedDescriptor>>>;
}

/// A reference waiting for its target type to be cached.
pub(crate) struct PendingReference {
    pub(crate) target: Target,
    pub(crate) field: String,
    pub(crate) id: Value,
    pub(crate) apply: Box<dyn FnOnce(Option<Rc<dyn Any>>) -> Result<()>>,
}

/// A list waiting for its element type to be cached.
pub(crate) struct PendingList {
    pub(crate) target: Target,
    pub(crate) field: String,
    pub(crate) ids: Vec<Value>,
    pub(crate) apply: Box<dyn FnOnce(Vec<Rc<dyn Any>>) -> Result<()>>,
}

/// Counters describing what a session did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Types whose rows were loaded.
    pub types_loaded: usize,
    /// Rows cached across all types.
    pub rows_loaded: usize,
    /// References resolved to an instance.
    pub references_resolved: usize,
    /// References left unset.
    pub references_unset: usize,
    /// Lists linked to their elements.
    pub lists_linked: usize,
    /// Types whose load failed.
    pub failures: usize,
}

/// A worklist of pending loads and deferred pointer resolutions.
#[derive(Default)]
pub struct LoadSession {
    types: VecDeque<TypeId>,
    references: VecDeque<PendingReference>,
    list_loads: VecDeque<TypeId>,
    list_links: VecDeque<PendingList>,
    requested: HashSet<TypeId>,
    loading: Vec<TypeId>,
    failed: HashSet<TypeId>,
    failures: Vec<(TypeId, Error)>,
    report: LoadReport,
}

impl LoadSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What the session has done so far.
    #[must_use]
    pub fn report(&self) -> LoadReport {
        self.report
    }

    /// Number of items still queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.types.len() + self.references.len() + self.list_loads.len() + self.list_links.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub(crate) fn defer_reference(&mut self, pending: PendingReference) {
        self.references.push_back(pending);
    }

    pub(crate) fn defer_list(&mut self, pending: PendingList) {
        self.list_links.push_back(pending);
    }

    /// Queues a type for loading; repeated requests are ignored.
    pub(crate) fn request(&mut self, type_id: TypeId) {
        if self.requested.insert(type_id) {
            self.types.push_back(type_id);
        }
    }

    /// The error that made `type_id` fail to load, if it did.
    pub(crate) fn take_failure(&mut self, type_id: TypeId) -> Option<Error> {
        let index = self.failures.iter().position(|(id, _)| *id == type_id)?;
        Some(self.failures.swap_remove(index).1)
    }

    /// Drains every queue, then marks the types loaded by this session as
    /// loaded.
    pub(crate) fn run(&mut self, registry: &impl Registry) -> LoadReport {
        loop {
            if let Some(type_id) = self.types.pop_front() {
                self.load_type(registry, type_id);
            } else if let Some(pending) = self.references.pop_front() {
                self.resolve_reference(registry, pending);
            } else if let Some(type_id) = self.list_loads.pop_front() {
                self.load_lists(registry, type_id);
            } else if let Some(pending) = self.list_links.pop_front() {
                self.resolve_list(registry, pending);
            } else {
                break;
            }
        }

        for type_id in std::mem::take(&mut self.loading) {
            if let Some(erased) = registry.erased(type_id) {
                erased.borrow_mut().finish_load();
            }
        }

        debug!(
            types = self.report.types_loaded,
            rows = self.report.rows_loaded,
            references = self.report.references_resolved,
            lists = self.report.lists_linked,
            "load session finished"
        );
        self.report
    }

    fn load_type(&mut self, registry: &impl Registry, type_id: TypeId) {
        let Some(erased) = registry.erased(type_id) else {
            return;
        };
        if erased.borrow().load_state() != LoadState::Unloaded {
            return;
        }

        let result = erased.borrow_mut().begin_load(self);
        match result {
            Ok(rows) => {
                self.report.types_loaded += 1;
                self.report.rows_loaded += rows;
                self.loading.push(type_id);
                self.list_loads.push_back(type_id);
            }
            Err(e) => self.fail(&erased, type_id, e),
        }
    }

    fn load_lists(&mut self, registry: &impl Registry, type_id: TypeId) {
        if self.failed.contains(&type_id) {
            return;
        }
        let Some(erased) = registry.erased(type_id) else {
            return;
        };
        let result = erased.borrow_mut().load_lists(self);
        if let Err(e) = result {
            self.loading.retain(|id| *id != type_id);
            self.fail(&erased, type_id, e);
        }
    }

    fn fail(&mut self, erased: &Rc<RefCell<dyn ErasedDescriptor>>, type_id: TypeId, e: Error) {
        let mut descriptor = erased.borrow_mut();
        error!(table = descriptor.table_name(), error = %e, "cache load failed");
        descriptor.abort_load();
        self.report.failures += 1;
        self.failed.insert(type_id);
        self.failures.push((type_id, e));
    }

    /// Returns the target descriptor once it can be looked up, or `None` if
    /// the target is unavailable. Requests unloaded targets and reports
    /// `Err(())` so the caller re-queues.
    fn target(
        &mut self,
        registry: &impl Registry,
        target: &Target,
    ) -> std::result::Result<Option<Rc<RefCell<dyn ErasedDescriptor>>>, ()> {
        if self.failed.contains(&target.type_id) {
            return Ok(None);
        }
        let Some(erased) = registry.erased(target.type_id) else {
            warn!(target = target.type_name, "reference to unregistered type");
            return Ok(None);
        };
        if erased.borrow().load_state() == LoadState::Unloaded {
            if self.requested.contains(&target.type_id) {
                // Requested but never started: the load was skipped.
                return Ok(None);
            }
            self.request(target.type_id);
            return Err(());
        }
        Ok(Some(erased))
    }

    fn resolve_reference(&mut self, registry: &impl Registry, pending: PendingReference) {
        let erased = match self.target(registry, &pending.target) {
            Ok(erased) => erased,
            Err(()) => {
                self.references.push_back(pending);
                return;
            }
        };

        let found = erased.and_then(|e| e.borrow().lookup(&pending.id));
        if found.is_some() {
            self.report.references_resolved += 1;
        } else {
            self.report.references_unset += 1;
            warn!(
                field = pending.field.as_str(),
                target = pending.target.type_name,
                id = %pending.id,
                "dangling reference left unset"
            );
        }
        if let Err(e) = (pending.apply)(found) {
            warn!(field = pending.field.as_str(), error = %e, "cannot set reference");
        }
    }

    fn resolve_list(&mut self, registry: &impl Registry, pending: PendingList) {
        let erased = match self.target(registry, &pending.target) {
            Ok(erased) => erased,
            Err(()) => {
                self.list_links.push_back(pending);
                return;
            }
        };

        let mut found = Vec::with_capacity(pending.ids.len());
        if let Some(erased) = erased {
            let descriptor = erased.borrow();
            for id in &pending.ids {
                match descriptor.lookup(id) {
                    Some(element) => found.push(element),
                    None => warn!(
                        field = pending.field.as_str(),
                        target = pending.target.type_name,
                        id = %id,
                        "dangling list element dropped"
                    ),
                }
            }
        }
        self.report.lists_linked += 1;
        if let Err(e) = (pending.apply)(found) {
            warn!(field = pending.field.as_str(), error = %e, "cannot set list");
        }
    }
}

impl fmt::Debug for LoadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSession")
            .field("types", &self.types.len())
            .field("references", &self.references.len())
            .field("list_loads", &self.list_loads.len())
            .field("list_links", &self.list_links.len())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}
