//! The persistence registry.
//!
//! [`Persistence`] owns one descriptor per registered type and one store per
//! schema. Typed entry points load a type's cache on first use through a
//! [`LoadSession`], which also loads whatever the type points at.
//!
//! ```ignore
//! let mut persistence = Persistence::in_memory();
//! persistence.register::<Account>()?;
//! let account = persistence.put(Account::new("ann"))?;
//! persistence.save_all()?;
//! ```

use std::any::{Any, TypeId, type_name};
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use stowage_foundation::naming::sanitize_identifier;
use stowage_foundation::{Error, ErrorKind, Result, Value};
use stowage_store::SharedStore;

use crate::class::PersistedClass;
use crate::config::PersistenceConfig;
use crate::declare::{Handle, Persisted};
use crate::descriptor::{EntityDescriptor, ErasedDescriptor, LoadState};
use crate::session::{LoadReport, LoadSession, Registry};

struct Registered {
    erased: Rc<RefCell<dyn ErasedDescriptor>>,
    typed: Rc<dyn Any>,
}

/// Registry of persisted types and the stores they live in.
pub struct Persistence {
    config: PersistenceConfig,
    stores: HashMap<String, SharedStore>,
    descriptors: HashMap<TypeId, Registered>,
}

impl Default for Persistence {
    fn default() -> Self {
        Self::new(PersistenceConfig::default())
    }
}

impl Persistence {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            stores: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    /// Creates an empty registry keeping every schema in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(PersistenceConfig::in_memory())
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Returns true if `T` is registered.
    #[must_use]
    pub fn is_registered<T: Persisted>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    /// The store serving `schema`, created from the configuration on first
    /// use.
    pub fn store(&mut self, schema: &str) -> SharedStore {
        let schema = sanitize_identifier(schema);
        let config = &self.config;
        Rc::clone(
            self.stores
                .entry(schema.clone())
                .or_insert_with(|| config.create_store(&schema)),
        )
    }

    /// Serves `schema` from `store`, including for types already registered.
    /// Their caches are dropped and reload from the new store.
    pub fn install_store(&mut self, schema: &str, store: SharedStore) {
        let schema = sanitize_identifier(schema);
        for registered in self.descriptors.values() {
            let mut descriptor = registered.erased.borrow_mut();
            if descriptor.schema() == schema {
                descriptor.set_store(Rc::clone(&store));
            }
        }
        self.stores.insert(schema, store);
    }

    /// Binds `T` and every type it references by identity.
    ///
    /// Registering a type twice does nothing. A referenced type that fails
    /// to bind is logged; references to it stay unset.
    ///
    /// # Errors
    ///
    /// Returns a schema error if `T` itself cannot be persisted.
    pub fn register<T: Persisted>(&mut self) -> Result<()> {
        let type_id = TypeId::of::<T>();
        if self.descriptors.contains_key(&type_id) {
            return Ok(());
        }

        let class = PersistedClass::<T>::bind()?;
        let schema = sanitize_identifier(class.schema().unwrap_or(&self.config.default_schema));
        let store = self.store(&schema);
        let targets = class.targets();

        let descriptor = Rc::new(RefCell::new(EntityDescriptor::new(class, schema, store)?));
        let erased: Rc<RefCell<dyn ErasedDescriptor>> = Rc::clone(&descriptor) as _;
        self.descriptors.insert(
            type_id,
            Registered {
                erased,
                typed: descriptor,
            },
        );
        debug!(type_name = type_name::<T>(), "registered");

        for target in targets {
            if let Err(e) = (target.register)(self) {
                warn!(
                    type_name = type_name::<T>(),
                    target = target.type_name,
                    error = %e,
                    "referenced type not registered"
                );
            }
        }
        Ok(())
    }

    fn typed<T: Persisted>(&self) -> Result<Rc<RefCell<EntityDescriptor<T>>>> {
        let registered = self
            .descriptors
            .get(&TypeId::of::<T>())
            .ok_or_else(|| Error::unregistered(type_name::<T>()))?;
        Rc::clone(&registered.typed)
            .downcast::<RefCell<EntityDescriptor<T>>>()
            .map_err(|_| {
                Error::new(ErrorKind::Internal(format!(
                    "descriptor of {} has the wrong type",
                    type_name::<T>()
                )))
            })
    }

    fn borrow<T: Persisted>(
        descriptor: &Rc<RefCell<EntityDescriptor<T>>>,
    ) -> Result<RefMut<'_, EntityDescriptor<T>>> {
        descriptor.try_borrow_mut().map_err(|_| {
            Error::new(ErrorKind::Internal(format!(
                "descriptor of {} is in use",
                type_name::<T>()
            )))
        })
    }

    /// Loads the cache of `T`, and whatever it points at, unless loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered or its rows cannot be
    /// loaded. The cache is left empty and the next access retries.
    pub fn load<T: Persisted>(&self) -> Result<LoadReport> {
        let type_id = TypeId::of::<T>();
        let erased = self
            .erased(type_id)
            .ok_or_else(|| Error::unregistered(type_name::<T>()))?;
        if erased.borrow().load_state() != LoadState::Unloaded {
            return Ok(LoadReport::default());
        }

        let mut session = LoadSession::new();
        session.request(type_id);
        let report = session.run(self);
        match session.take_failure(type_id) {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// The loaded descriptor of `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered or cannot be loaded.
    pub fn descriptor<T: Persisted>(&self) -> Result<Rc<RefCell<EntityDescriptor<T>>>> {
        self.load::<T>()?;
        self.typed::<T>()
    }

    /// Returns the cached instance of `T` with identity `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered, cannot be loaded, or `id`
    /// does not fit its identity type.
    pub fn get<T: Persisted>(&self, id: impl Into<Value>) -> Result<Option<Handle<T>>> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.get(id)
    }

    /// Returns the cached instance of `T` with identity `id`, creating a
    /// blank one on a miss.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), or if no instance can be made.
    pub fn get_or_insert<T: Persisted>(&self, id: impl Into<Value>) -> Result<Handle<T>> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.get_or_insert(id)
    }

    /// Returns the cached instance of `T` with identity `id`, caching
    /// `default` under that identity on a miss.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub fn get_or_insert_with<T: Persisted>(&self, id: impl Into<Value>, default: T) -> Result<Handle<T>> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.get_or_insert_with(id, default)
    }

    /// Caches `instance`, assigning its identity if autogenerated.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered, cannot be loaded, or the
    /// identity is unset.
    pub fn put<T: Persisted>(&self, instance: T) -> Result<Handle<T>> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.put(instance)
    }

    /// Caches the instance behind `holder`.
    ///
    /// # Errors
    ///
    /// As [`put`](Self::put).
    pub fn put_handle<T: Persisted>(&self, holder: &Handle<T>) -> Result<()> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.put_handle(holder)
    }

    /// Every cached instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered or cannot be loaded.
    pub fn get_all<T: Persisted>(&self) -> Result<Vec<Handle<T>>> {
        let descriptor = self.descriptor::<T>()?;
        let all = Self::borrow(&descriptor)?.get_all();
        Ok(all)
    }

    /// The cached instances of `T` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered or cannot be loaded.
    pub fn get_all_where<T: Persisted>(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<Handle<T>>> {
        let descriptor = self.descriptor::<T>()?;
        let matching = Self::borrow(&descriptor)?.get_all_where(predicate);
        Ok(matching)
    }

    /// Uncaches the instance behind `holder`; the next save deletes it.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered, cannot be loaded, or the
    /// identity cannot be read.
    pub fn remove<T: Persisted>(&self, holder: &Handle<T>) -> Result<bool> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.remove(holder)
    }

    /// Uncaches the instance of `T` with identity `id`.
    ///
    /// # Errors
    ///
    /// As [`remove`](Self::remove).
    pub fn remove_id<T: Persisted>(&self, id: impl Into<Value>) -> Result<bool> {
        let descriptor = self.descriptor::<T>()?;
        Self::borrow(&descriptor)?.remove_id(id)
    }

    /// Writes the pending changes of `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered or the store fails.
    pub fn save<T: Persisted>(&self) -> Result<()> {
        let descriptor = self.typed::<T>()?;
        Self::borrow(&descriptor)?.save()
    }

    /// Writes the pending changes of every registered type.
    ///
    /// Every type is attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn save_all(&self) -> Result<()> {
        let mut first = None;
        for registered in self.descriptors.values() {
            let mut descriptor = registered.erased.borrow_mut();
            if let Err(e) = descriptor.save() {
                warn!(table = descriptor.table_name(), error = %e, "save failed");
                if first.is_none() {
                    first = Some(e);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Returns true if any registered type has unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.descriptors
            .values()
            .any(|r| r.erased.borrow().is_dirty())
    }

    /// Truncates the tables of `T` and empties its cache.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is not registered or the store fails.
    pub fn reset<T: Persisted>(&self) -> Result<()> {
        let descriptor = self.typed::<T>()?;
        Self::borrow(&descriptor)?.reset()
    }

    /// Empties every cache without touching the stores.
    pub fn clear_all(&self) {
        for registered in self.descriptors.values() {
            registered.erased.borrow_mut().clear();
        }
    }

    /// Disconnects every store, flushing pending file writes.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn disconnect_all(&self) -> Result<()> {
        for (schema, store) in &self.stores {
            store
                .try_borrow_mut()
                .map_err(|_| Error::store(schema.as_str(), "store is in use"))?
                .disconnect()?;
        }
        Ok(())
    }
}

impl Registry for Persistence {
    fn erased(&self, type_id: TypeId) -> Option<Rc<RefCell<dyn ErasedDescriptor>>> {
        self.descriptors.get(&type_id).map(|r| Rc::clone(&r.erased))
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self
            .descriptors
            .values()
            .map(|r| r.erased.borrow().type_name())
            .collect();
        types.sort_unstable();
        f.debug_struct("Persistence")
            .field("config", &self.config)
            .field("schemas", &self.stores.keys().collect::<Vec<_>>())
            .field("types", &types)
            .finish()
    }
}
