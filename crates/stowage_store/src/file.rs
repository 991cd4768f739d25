//! Flat-file store using `MessagePack`.
//!
//! Each schema is one file, `<dir>/<schema>.msgpack`, holding the whole
//! [`TableSet`]. The file is read on first connect and rewritten after every
//! mutating call, or only on [`FileStore::flush`] when write-through is off.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use stowage_foundation::naming::sanitize_identifier;
use stowage_foundation::{Error, ErrorKind, Result, Value};

use crate::memory::TableSet;
use crate::store::DataStore;
use crate::table::DataTable;

/// Serializes a table set to bytes using `MessagePack` format.
///
/// Uses named serialization to preserve struct field names.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(tables: &TableSet) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(tables)
        .map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
}

/// Deserializes a table set from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn from_bytes(bytes: &[u8]) -> Result<TableSet> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
}

/// Saves a table set to a file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to,
/// or if serialization fails.
pub fn save_to_file<P: AsRef<Path>>(tables: &TableSet, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to create directory '{}': {e}",
                dir.display()
            )))
        })?;
    }

    let file = File::create(path).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to create file '{}': {e}",
            path.display()
        )))
    })?;

    let mut writer = BufWriter::new(file);
    let bytes = to_bytes(tables)?;

    writer.write_all(&bytes).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to write to file '{}': {e}",
            path.display()
        )))
    })?;

    writer.flush().map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to flush file '{}': {e}",
            path.display()
        )))
    })?;

    Ok(())
}

/// Loads a table set from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or if deserialization fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<TableSet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to open file '{}': {e}",
            path.display()
        )))
    })?;

    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();

    reader.read_to_end(&mut bytes).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to read file '{}': {e}",
            path.display()
        )))
    })?;

    from_bytes(&bytes)
}

/// A store backed by one `MessagePack` file per schema.
#[derive(Debug)]
pub struct FileStore {
    name: String,
    path: PathBuf,
    tables: TableSet,
    connected: bool,
    opened: bool,
    write_through: bool,
    pending: bool,
}

impl FileStore {
    /// Creates a store for `schema` under `dir`.
    ///
    /// Nothing is read until the first [`connect`](DataStore::connect).
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, schema: &str) -> Self {
        let name = sanitize_identifier(schema);
        let path = dir.as_ref().join(format!("{name}.msgpack"));
        Self {
            name,
            path,
            tables: TableSet::new(),
            connected: false,
            opened: false,
            write_through: true,
            pending: false,
        }
    }

    /// Sets whether every mutation is written to disk immediately.
    #[must_use]
    pub fn with_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tables as currently held in memory.
    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// Returns true if there are mutations not yet written to disk.
    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        self.pending
    }

    /// Writes the tables to disk if anything changed since the last write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn flush(&mut self) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        save_to_file(&self.tables, &self.path)?;
        self.pending = false;
        debug!(store = %self.name, path = %self.path.display(), "flushed");
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::not_connected(&self.name))
        }
    }

    fn mutated(&mut self) -> Result<()> {
        self.pending = true;
        if self.write_through {
            self.flush()?;
        }
        Ok(())
    }
}

impl DataStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        if !self.opened {
            if self.path.exists() {
                self.tables = load_from_file(&self.path)?;
                info!(
                    store = %self.name,
                    path = %self.path.display(),
                    tables = self.tables.table_names().len(),
                    "opened"
                );
            }
            self.opened = true;
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            self.flush()?;
            self.connected = false;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn validate_table(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        if self.tables.validate(table) {
            self.mutated()?;
        }
        Ok(())
    }

    fn load(&mut self, table: &mut DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.load(table)
    }

    fn save(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.save(table)?;
        self.mutated()
    }

    fn clear(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.clear(table)?;
        self.mutated()
    }

    fn clear_ids(&mut self, table: &DataTable, ids: &[Value]) -> Result<()> {
        self.ensure_connected()?;
        self.tables.clear_ids(table, ids)?;
        self.mutated()
    }

    fn reset(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.reset(table.name());
        self.mutated()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(store = %self.name, error = %e, "failed to flush on drop");
        }
    }
}
