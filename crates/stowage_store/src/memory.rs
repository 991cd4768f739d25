//! In-memory table storage.
//!
//! [`TableSet`] holds every table of one schema in storage-normalized form:
//! values go through [`DataType::convert_from`] on the way in, so dates and
//! booleans are kept as integers and come back out that way. Rows live in
//! `im` collections, so mutations build a new version cheaply and only
//! replace the old one once every row has been accepted.

use std::collections::{HashMap, HashSet};

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use stowage_foundation::{DataType, Error, ErrorContext, Result, Value};

use crate::store::DataStore;
use crate::table::{DataField, DataRow, DataTable, TableHeader};

type StoredRow = OrdMap<String, Value>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoredTable {
    header: TableHeader,
    rows: Vector<StoredRow>,
}

impl StoredTable {
    fn column_type(&self, name: &str) -> Option<DataType> {
        self.header.field(name).map(|f| f.data_type)
    }

    fn identity(&self, row: &StoredRow) -> Option<Vec<Value>> {
        let ids = self.header.id_fields();
        if ids.is_empty() {
            return None;
        }
        Some(
            ids.iter()
                .map(|id| row.get(id).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

/// Every table of one schema, storage-normalized.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TableSet {
    tables: OrdMap<String, StoredTable>,
}

impl TableSet {
    /// Creates an empty table set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the named table exists.
    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Names of all tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Number of rows in the named table, or zero if it does not exist.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Stored header of the named table.
    #[must_use]
    pub fn header(&self, table: &str) -> Option<&TableHeader> {
        self.tables.get(table).map(|t| &t.header)
    }

    /// Creates the table, or adds the header fields it is missing.
    ///
    /// Returns true if anything changed.
    pub fn validate(&mut self, table: &DataTable) -> bool {
        let Some(stored) = self.tables.get_mut(table.name()) else {
            debug!(table = table.name(), columns = table.header().len(), "creating table");
            self.tables.insert(
                table.name().to_string(),
                StoredTable {
                    header: table.header().clone(),
                    rows: Vector::new(),
                },
            );
            return true;
        };

        let mut changed = false;
        for field in table.header().fields() {
            if stored.header.field(&field.name).is_none() {
                debug!(table = table.name(), column = %field.name, "adding column");
                stored.header.add(field.clone());
                changed = true;
            }
        }
        let has_parent_key = stored.header.parent_key().is_some();
        if let Some(parent_key) = table.header().parent_key().filter(|_| !has_parent_key) {
            stored.header.set_parent_key(parent_key);
            changed = true;
        }
        changed
    }

    /// Copies the stored rows into `table`.
    ///
    /// Cells are typed with the storage type of their column.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn load(&self, table: &mut DataTable) -> Result<()> {
        let stored = self
            .tables
            .get(table.name())
            .ok_or_else(|| Error::table_not_found(table.name()))?;

        let rows = stored
            .rows
            .iter()
            .map(|stored_row| {
                let mut row = DataRow::new();
                for column in stored.header.fields() {
                    let value = stored_row.get(&column.name).cloned().unwrap_or(Value::Null);
                    row.add(
                        DataField::new(column.name.clone(), column.data_type.storage_type(), value)
                            .with_id(column.id)
                            .with_autogenerated(column.autogenerated),
                    );
                }
                row
            })
            .collect();
        table.set_rows(rows);
        trace!(table = table.name(), rows = table.len(), "loaded rows");
        Ok(())
    }

    /// Upserts the rows of `table` by identity, or appends them if the table
    /// has no identity.
    ///
    /// Either every row is written or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, a row names an unknown
    /// column, or a value cannot be stored as its column's type.
    pub fn save(&mut self, table: &DataTable) -> Result<()> {
        let stored = self
            .tables
            .get(table.name())
            .ok_or_else(|| Error::table_not_found(table.name()))?;

        let mut rows = stored.rows.clone();
        let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            if let Some(identity) = stored.identity(row) {
                positions.entry(identity).or_insert(index);
            }
        }

        for row in table.rows() {
            let normalized = normalize_row(stored, table.name(), row)?;
            match stored.identity(&normalized) {
                Some(identity) => match positions.get(&identity).copied() {
                    Some(index) => {
                        rows.set(index, normalized);
                    }
                    None => {
                        positions.insert(identity, rows.len());
                        rows.push_back(normalized);
                    }
                },
                None => rows.push_back(normalized),
            }
        }

        if let Some(stored) = self.tables.get_mut(table.name()) {
            stored.rows = rows;
        }
        Ok(())
    }

    /// Deletes the rows whose identity matches a row of `table`.
    ///
    /// For tables without identity, a stored row is deleted if it agrees with
    /// every cell of a given row.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or a value cannot be
    /// normalized.
    pub fn clear(&mut self, table: &DataTable) -> Result<()> {
        let stored = self
            .tables
            .get_mut(table.name())
            .ok_or_else(|| Error::table_not_found(table.name()))?;

        let targets = table
            .rows()
            .iter()
            .map(|row| normalize_row(stored, table.name(), row))
            .collect::<Result<Vec<_>>>()?;

        let keyed = stored.header.is_keyed();
        let header = stored.header.clone();
        stored.rows.retain(|row| {
            !targets.iter().any(|target| {
                if keyed {
                    header
                        .id_fields()
                        .iter()
                        .all(|id| row.get(id) == target.get(id))
                } else {
                    target.iter().all(|(k, v)| row.get(k) == Some(v))
                }
            })
        });
        Ok(())
    }

    /// Deletes the rows whose key column holds one of `ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, has no key column, or an
    /// id cannot be stored as the key column's type.
    pub fn clear_ids(&mut self, table: &DataTable, ids: &[Value]) -> Result<()> {
        let stored = self
            .tables
            .get_mut(table.name())
            .ok_or_else(|| Error::table_not_found(table.name()))?;

        let key = stored
            .header
            .key_column()
            .or(table.header().key_column())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::store(table.name(), "table has no identity or parent key")
            })?;
        let key_type = stored.column_type(&key).unwrap_or(DataType::Integer);

        let targets = ids
            .iter()
            .map(|id| key_type.convert_from(id))
            .collect::<Result<HashSet<_>>>()?;

        stored
            .rows
            .retain(|row| row.get(&key).is_none_or(|v| !targets.contains(v)));
        Ok(())
    }

    /// Deletes every row of the table. Missing tables are ignored.
    pub fn reset(&mut self, table: &str) {
        if let Some(stored) = self.tables.get_mut(table) {
            stored.rows = Vector::new();
        }
    }
}

fn normalize_row(stored: &StoredTable, table: &str, row: &DataRow) -> Result<StoredRow> {
    let mut normalized = OrdMap::new();
    for cell in row.iter() {
        let column_type = stored.column_type(&cell.name).ok_or_else(|| {
            Error::store(table, format!("unknown column {}", cell.name))
                .with_context(ErrorContext::new().with_table(table).with_field(&cell.name))
        })?;
        let value = cell
            .data_type
            .convert_from(&cell.value)
            .and_then(|v| column_type.convert_from(&v))
            .map_err(|e| {
                e.with_context(ErrorContext::new().with_table(table).with_field(&cell.name))
            })?;
        normalized.insert(cell.name.clone(), value);
    }
    Ok(normalized)
}

/// A store that keeps its tables in memory.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    connected: bool,
    tables: TableSet,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: false,
            tables: TableSet::new(),
        }
    }

    /// The stored tables.
    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::not_connected(&self.name))
        }
    }
}

impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        if !self.connected {
            debug!(store = %self.name, "connected");
            self.connected = true;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn validate_table(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.validate(table);
        Ok(())
    }

    fn load(&mut self, table: &mut DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.load(table)
    }

    fn save(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.save(table)
    }

    fn clear(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.clear(table)
    }

    fn clear_ids(&mut self, table: &DataTable, ids: &[Value]) -> Result<()> {
        self.ensure_connected()?;
        self.tables.clear_ids(table, ids)
    }

    fn reset(&mut self, table: &DataTable) -> Result<()> {
        self.ensure_connected()?;
        self.tables.reset(table.name());
        Ok(())
    }
}
