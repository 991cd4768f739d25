//! Configuration for the persistence registry.

use std::path::PathBuf;

use stowage_foundation::naming::sanitize_identifier;
use stowage_store::{FileStore, MemoryStore, SharedStore, shared};

/// Where tables of a schema are kept when no store was installed for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// Tables live in memory for the lifetime of the registry.
    Memory,
    /// One `MessagePack` file per schema under the given directory.
    File(PathBuf),
}

/// Configuration for the persistence registry.
///
/// Controls the default backend and the schema types land in when their
/// declaration names none.
#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    /// Backend used for schemas without an installed store.
    pub backend: StoreBackend,

    /// Schema for types that do not name one.
    pub default_schema: String,

    /// Whether file stores write to disk after every mutation.
    pub write_through: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            default_schema: "global".to_string(),
            write_through: true,
        }
    }
}

impl PersistenceConfig {
    /// Creates a configuration keeping every schema in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a configuration keeping every schema in a file under `dir`.
    #[must_use]
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::File(dir.into()),
            ..Self::default()
        }
    }

    /// Builder method to set the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Builder method to set the default schema.
    #[must_use]
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Builder method to enable/disable write-through for file stores.
    #[must_use]
    pub fn with_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    /// Creates the store for `schema` according to the backend.
    #[must_use]
    pub fn create_store(&self, schema: &str) -> SharedStore {
        match &self.backend {
            StoreBackend::Memory => shared(MemoryStore::new(sanitize_identifier(schema))),
            StoreBackend::File(dir) => {
                shared(FileStore::new(dir, schema).with_write_through(self.write_through))
            }
        }
    }
}
