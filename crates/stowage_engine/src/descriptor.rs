//! Entity descriptors.
//!
//! An [`EntityDescriptor`] owns everything the engine keeps for one type:
//! the bound shape, the instance cache, the store the table lives in, and
//! the identity counter. The cache is filled once, lazily, by a
//! [`LoadSession`]; writes are buffered in the cache and flushed by `save`.

use std::any::{Any, type_name};
use std::cell::RefMut;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use stowage_foundation::{Error, ErrorContext, Result, SchemaViolation, Value};
use stowage_store::{DataRow, DataStore, DataTable, SharedStore};

use crate::cache::Cache;
use crate::class::PersistedClass;
use crate::declare::{Handle, Persisted, handle};
use crate::session::LoadSession;

/// Where a descriptor is in its load cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// The cache is empty and will be filled on first use.
    #[default]
    Unloaded,
    /// Base rows are cached; references and lists are being resolved.
    Loading,
    /// The cache mirrors the store.
    Loaded,
}

/// The operations a load session and the registry need, without the type.
pub(crate) trait ErasedDescriptor {
    fn type_name(&self) -> &'static str;

    fn table_name(&self) -> &str;

    fn schema(&self) -> &str;

    fn load_state(&self) -> LoadState;

    /// Loads and caches the main table's rows. Returns the number cached.
    fn begin_load(&mut self, session: &mut LoadSession) -> Result<usize>;

    /// Loads the list sub-tables into the cached instances.
    fn load_lists(&mut self, session: &mut LoadSession) -> Result<()>;

    fn finish_load(&mut self);

    /// Empties the cache after a failed load.
    fn abort_load(&mut self);

    /// The cached handle for a storage-normalized identity.
    fn lookup(&self, key: &Value) -> Option<Rc<dyn Any>>;

    fn save(&mut self) -> Result<()>;

    fn reset(&mut self) -> Result<()>;

    fn clear(&mut self);

    fn is_dirty(&self) -> bool;

    fn set_store(&mut self, store: SharedStore);
}

fn open<'a>(store: &'a SharedStore, schema: &str) -> Result<RefMut<'a, dyn DataStore + 'static>> {
    let mut store = store
        .try_borrow_mut()
        .map_err(|_| Error::store(schema, "store is in use"))?;
    store.connect()?;
    Ok(store)
}

/// Cache and store access for one persisted type.
pub struct EntityDescriptor<T> {
    class: PersistedClass<T>,
    schema: String,
    store: SharedStore,
    state: LoadState,
    cache: Cache<T>,
    next_id: i64,
    dirty: bool,
}

impl<T: Persisted> EntityDescriptor<T> {
    /// Creates an unloaded descriptor over `store`. Only the registry builds
    /// descriptors, since only a load session can bring one to `Loaded`.
    pub(crate) fn new(class: PersistedClass<T>, schema: impl Into<String>, store: SharedStore) -> Result<Self> {
        if class.id_field().is_none() {
            return Err(Error::schema(class.name(), SchemaViolation::MissingIdField));
        }
        Ok(Self {
            class,
            schema: schema.into(),
            store,
            state: LoadState::Unloaded,
            cache: Cache::new(),
            next_id: 1,
            dirty: false,
        })
    }

    /// The bound shape.
    #[must_use]
    pub fn class(&self) -> &PersistedClass<T> {
        &self.class
    }

    /// Table the rows live in.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.class.table_name()
    }

    /// Schema the table lives in.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Number of persisted fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.class.field_count()
    }

    /// Where the descriptor is in its load cycle.
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.state
    }

    /// Returns true if the cache holds changes not yet saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// The identity the next autogenerated instance receives.
    #[must_use]
    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    fn autogenerated(&self) -> bool {
        self.class
            .id_field()
            .is_some_and(|f| f.info().is_autogenerated())
    }

    fn context(&self) -> ErrorContext {
        ErrorContext::new().with_table(self.class.table_name())
    }

    /// Returns the cached instance for `id`.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if `id` does not fit the identity type.
    pub fn get(&self, id: impl Into<Value>) -> Result<Option<Handle<T>>> {
        let key = self.class.key(&id.into())?;
        Ok(self.cache.get(&key).map(|e| Rc::clone(e.handle())))
    }

    /// Returns the cached instance for `id`, creating a blank one with that
    /// identity on a miss. A created instance is cached clean: it reaches the
    /// store only once it is `put`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` does not fit or no instance can be made.
    pub fn get_or_insert(&mut self, id: impl Into<Value>) -> Result<Handle<T>> {
        let key = self.class.key(&id.into())?;
        if let Some(entry) = self.cache.get(&key) {
            return Ok(Rc::clone(entry.handle()));
        }
        self.insert_clean(key, T::instantiate()?)
    }

    /// Returns the cached instance for `id`, caching `default` under that
    /// identity on a miss. On a hit `default` is dropped. As with
    /// [`get_or_insert`](Self::get_or_insert) the inserted instance is clean.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` does not fit the identity type.
    pub fn get_or_insert_with(&mut self, id: impl Into<Value>, default: T) -> Result<Handle<T>> {
        let key = self.class.key(&id.into())?;
        if let Some(entry) = self.cache.get(&key) {
            return Ok(Rc::clone(entry.handle()));
        }
        self.insert_clean(key, default)
    }

    fn insert_clean(&mut self, key: Value, mut instance: T) -> Result<Handle<T>> {
        self.class.set_id(&mut instance, &key)?;
        if let Some(n) = key.as_integer().filter(|_| self.autogenerated()) {
            self.next_id = self.next_id.max(n + 1);
        }
        let holder = handle(instance);
        self.cache.insert(key, Rc::clone(&holder), false);
        Ok(holder)
    }

    /// Returns the key `instance` is cached under, assigning a fresh identity
    /// if the identity is autogenerated and not cached yet.
    fn assign_key(&mut self, instance: &mut T) -> Result<Value> {
        let key = self.class.key_of(instance)?;
        if self.autogenerated() && !self.cache.contains(&key) {
            let id = Value::Integer(self.next_id);
            self.class.set_id(instance, &id)?;
            self.next_id += 1;
            return Ok(id);
        }
        if key.is_null() {
            return Err(Error::field_access(type_name::<T>(), "identity is unset")
                .with_context(self.context()));
        }
        Ok(key)
    }

    /// Caches `instance` and marks the descriptor dirty.
    ///
    /// If an instance with the same identity is cached, its contents are
    /// replaced so existing handles observe the new state, and that handle is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is unset or cannot be read, or the
    /// cached instance is borrowed.
    pub fn put(&mut self, mut instance: T) -> Result<Handle<T>> {
        let key = self.assign_key(&mut instance)?;
        self.dirty = true;

        if let Some(entry) = self.cache.get(&key) {
            let existing = Rc::clone(entry.handle());
            *existing.try_borrow_mut().map_err(|_| {
                Error::field_access(type_name::<T>(), "cached instance is borrowed")
                    .with_context(self.context().with_id(key.clone()))
            })? = instance;
            self.cache.mark_dirty(&key);
            return Ok(existing);
        }

        let holder = handle(instance);
        self.cache.insert(key, Rc::clone(&holder), true);
        Ok(holder)
    }

    /// Caches the instance behind `holder` and marks the descriptor dirty.
    /// Replaces any other handle cached under the same identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is unset or the instance is borrowed.
    pub fn put_handle(&mut self, holder: &Handle<T>) -> Result<()> {
        let key = {
            let mut instance = holder
                .try_borrow_mut()
                .map_err(|_| Error::field_access(type_name::<T>(), "instance is borrowed"))?;
            self.assign_key(&mut instance)?
        };
        self.cache.insert(key, Rc::clone(holder), true);
        self.dirty = true;
        Ok(())
    }

    /// Every cached instance, in cache order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Handle<T>> {
        self.cache.iter().map(|e| Rc::clone(e.handle())).collect()
    }

    /// The cached instances matching `predicate`.
    ///
    /// Instances that are mutably borrowed are skipped.
    pub fn get_all_where(&self, predicate: impl Fn(&T) -> bool) -> Vec<Handle<T>> {
        self.cache
            .iter()
            .filter(|e| e.handle().try_borrow().is_ok_and(|i| predicate(&*i)))
            .map(|e| Rc::clone(e.handle()))
            .collect()
    }

    /// Uncaches the instance behind `holder`; the next save deletes its row
    /// and its list rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be read.
    pub fn remove(&mut self, holder: &Handle<T>) -> Result<bool> {
        let key = {
            let instance = holder
                .try_borrow()
                .map_err(|_| Error::field_access(type_name::<T>(), "instance is borrowed"))?;
            self.class.key_of(&instance)?
        };
        Ok(self.remove_key(&key))
    }

    /// Uncaches the instance with identity `id`.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if `id` does not fit the identity type.
    pub fn remove_id(&mut self, id: impl Into<Value>) -> Result<bool> {
        let key = self.class.key(&id.into())?;
        Ok(self.remove_key(&key))
    }

    fn remove_key(&mut self, key: &Value) -> bool {
        let removed = self.cache.remove(key).is_some();
        self.dirty |= removed;
        removed
    }

    /// Writes pending changes to the store.
    ///
    /// Does nothing unless the descriptor is loaded and dirty. Removals are
    /// deleted first, then dirty instances are upserted, then each list
    /// sub-table has the rows of every written parent replaced. On failure
    /// the cache keeps its pending changes and the save can be retried.
    ///
    /// # Errors
    ///
    /// Returns the first store or field error.
    pub fn save(&mut self) -> Result<()> {
        if self.state != LoadState::Loaded || !self.dirty {
            return Ok(());
        }

        let removed = self.cache.removed_keys();
        let written = self.cache.dirty_keys();

        let mut deletes = self.class.table();
        for key in &removed {
            deletes.add_row(self.class.id_row(key)?);
        }

        let mut rows = self.class.table();
        let mut children = self
            .class
            .list_fields()
            .map(|(info, list)| list.table(info))
            .collect::<Result<Vec<DataTable>>>()?;
        for key in &written {
            let Some(entry) = self.cache.get(key) else {
                continue;
            };
            let instance = entry.handle().try_borrow().map_err(|_| {
                Error::field_access(type_name::<T>(), "instance is borrowed")
                    .with_context(self.context().with_id(key.clone()))
            })?;
            let mut row = DataRow::new();
            self.class.save_row(&mut row, Some(&*instance))?;
            rows.add_row(row);
            for ((info, list), child) in self.class.list_fields().zip(&mut children) {
                list.save(info, child, key, &instance)?;
            }
        }

        let shared = Rc::clone(&self.store);
        let mut store = open(&shared, &self.schema)?;
        if !removed.is_empty() {
            store.clear(&deletes)?;
            for child in &children {
                store.clear_ids(child, &removed)?;
            }
        }
        if !written.is_empty() {
            store.save(&rows)?;
            for child in &children {
                store.clear_ids(child, &written)?;
                if !child.is_empty() {
                    store.save(child)?;
                }
            }
        }
        drop(store);

        self.cache.settle();
        self.dirty = false;
        debug!(
            table = self.class.table_name(),
            removed = removed.len(),
            saved = written.len(),
            "saved"
        );
        Ok(())
    }

    /// Truncates the main table and every list sub-table, empties the cache,
    /// and restarts identity generation.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub fn reset(&mut self) -> Result<()> {
        let mut tables = vec![self.class.table()];
        for (info, list) in self.class.list_fields() {
            tables.push(list.table(info)?);
        }

        let shared = Rc::clone(&self.store);
        let mut store = open(&shared, &self.schema)?;
        for table in &tables {
            store.reset(table)?;
        }
        drop(store);

        self.clear();
        debug!(table = self.class.table_name(), "reset");
        Ok(())
    }

    /// Forgets the cache without touching the store. The next access
    /// reloads.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.next_id = 1;
        self.state = LoadState::Unloaded;
        self.dirty = false;
    }
}

impl<T: Persisted> ErasedDescriptor for EntityDescriptor<T> {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn table_name(&self) -> &str {
        self.class.table_name()
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    fn load_state(&self) -> LoadState {
        self.state
    }

    fn begin_load(&mut self, session: &mut LoadSession) -> Result<usize> {
        self.clear();
        self.state = LoadState::Loading;

        let mut table = self.class.table();
        {
            let shared = Rc::clone(&self.store);
            let mut store = open(&shared, &self.schema)?;
            store.validate_table(&table)?;
            for (info, list) in self.class.list_fields() {
                store.validate_table(&list.table(info)?)?;
            }
            store.load(&mut table)?;
        }

        let autogenerated = self.autogenerated();
        for row in table.take_rows() {
            let instance = match T::instantiate() {
                Ok(instance) => instance,
                Err(e) => {
                    warn!(table = self.class.table_name(), error = %e, "row skipped");
                    continue;
                }
            };
            let holder = handle(instance);
            self.class.load_row(&row, &holder, session);

            let key = match self.class.key_of(&holder.borrow()) {
                Ok(key) if !key.is_null() => key,
                Ok(_) => {
                    warn!(table = self.class.table_name(), "row without identity skipped");
                    continue;
                }
                Err(e) => {
                    warn!(table = self.class.table_name(), error = %e, "row skipped");
                    continue;
                }
            };
            self.cache.insert(key, holder, false);
        }
        if let Some(n) = self.cache.max_integer_key().filter(|_| autogenerated) {
            self.next_id = self.next_id.max(n + 1);
        }

        debug!(table = self.class.table_name(), rows = self.cache.len(), "loaded");
        Ok(self.cache.len())
    }

    fn load_lists(&mut self, session: &mut LoadSession) -> Result<()> {
        let parents: Vec<(Value, Handle<T>)> = self
            .cache
            .iter()
            .map(|e| (e.key().clone(), Rc::clone(e.handle())))
            .collect();

        let shared = Rc::clone(&self.store);
        for (info, list) in self.class.list_fields() {
            let mut table = list.table(info)?;
            open(&shared, &self.schema)?.load(&mut table)?;
            list.load(info, &table, &parents, session)?;
        }
        Ok(())
    }

    fn finish_load(&mut self) {
        self.state = LoadState::Loaded;
    }

    fn abort_load(&mut self) {
        self.clear();
    }

    fn lookup(&self, key: &Value) -> Option<Rc<dyn Any>> {
        self.cache
            .get(key)
            .map(|e| Rc::clone(e.handle()) as Rc<dyn Any>)
    }

    fn save(&mut self) -> Result<()> {
        EntityDescriptor::save(self)
    }

    fn reset(&mut self) -> Result<()> {
        EntityDescriptor::reset(self)
    }

    fn clear(&mut self) {
        EntityDescriptor::clear(self);
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_store(&mut self, store: SharedStore) {
        self.store = store;
        self.clear();
    }
}

impl<T: 'static> fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("table", &self.class.table_name())
            .field("schema", &self.schema)
            .field("state", &self.state)
            .field("cached", &self.cache.len())
            .field("next_id", &self.next_id)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
