//! Storage-neutral tables.
//!
//! A [`DataTable`] is the only exchange format between entity descriptors and
//! stores: a [`TableHeader`] of typed field definitions plus a body of
//! [`DataRow`]s, each a name → value mapping whose keys match the header.

use serde::{Deserialize, Serialize};

use stowage_foundation::{DataType, Value};

/// A named, typed cell, or a column definition when used in a header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    /// Column name.
    pub name: String,
    /// Declared type of the column.
    pub data_type: DataType,
    /// Cell value; null in header definitions.
    pub value: Value,
    /// Whether this column is the table's identity.
    pub id: bool,
    /// Whether identity values are synthesized by the engine.
    pub autogenerated: bool,
}

impl DataField {
    /// Creates a column definition.
    #[must_use]
    pub fn header(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, Value::Null)
    }

    /// Creates a cell.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType, value: Value) -> Self {
        Self {
            name: name.into(),
            data_type,
            value,
            id: false,
            autogenerated: false,
        }
    }

    /// Marks this column as the identity.
    #[must_use]
    pub fn with_id(mut self, id: bool) -> Self {
        self.id = id;
        self
    }

    /// Marks this column as autogenerated.
    #[must_use]
    pub fn with_autogenerated(mut self, autogenerated: bool) -> Self {
        self.autogenerated = autogenerated;
        self
    }
}

/// One row: cells keyed by column name, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    fields: Vec<DataField>,
}

impl DataRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell, replacing any cell with the same name.
    pub fn add(&mut self, field: DataField) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Adds a cell, builder style.
    #[must_use]
    pub fn with(mut self, field: DataField) -> Self {
        self.add(field);
        self
    }

    /// Returns the cell with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the value of the named cell, or null if absent.
    #[must_use]
    pub fn value(&self, name: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.get(name).map_or(NULL, |f| &f.value)
    }

    /// Iterates over the cells.
    pub fn iter(&self) -> impl Iterator<Item = &DataField> {
        self.fields.iter()
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Column definitions of a table.
///
/// Entity tables are keyed by their identity fields. Child tables holding
/// list elements have no identity; they carry a parent-key column instead,
/// and may hold many rows per parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableHeader {
    fields: Vec<DataField>,
    id_fields: Vec<String>,
    parent_key: Option<String>,
}

impl TableHeader {
    /// Creates an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column definition, recording it as identity if flagged.
    ///
    /// A column already present is replaced.
    pub fn add(&mut self, field: DataField) {
        if field.id && !self.id_fields.contains(&field.name) {
            self.id_fields.push(field.name.clone());
        }
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Declares the parent-key column of a child table.
    pub fn set_parent_key(&mut self, name: impl Into<String>) {
        self.parent_key = Some(name.into());
    }

    /// Column definitions in order.
    #[must_use]
    pub fn fields(&self) -> &[DataField] {
        &self.fields
    }

    /// Returns the named column definition.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&DataField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the identity columns.
    #[must_use]
    pub fn id_fields(&self) -> &[String] {
        &self.id_fields
    }

    /// Name of the parent-key column, for child tables.
    #[must_use]
    pub fn parent_key(&self) -> Option<&str> {
        self.parent_key.as_deref()
    }

    /// Returns true if rows are unique by identity.
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        !self.id_fields.is_empty()
    }

    /// The column `clear_ids` matches against: the identity of an entity
    /// table, or the parent key of a child table.
    #[must_use]
    pub fn key_column(&self) -> Option<&str> {
        self.id_fields
            .first()
            .map(String::as_str)
            .or(self.parent_key.as_deref())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no columns are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A named table: header plus rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    name: String,
    header: TableHeader,
    rows: Vec<DataRow>,
}

impl DataTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: TableHeader::new(),
            rows: Vec::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column definitions.
    #[must_use]
    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// Mutable column definitions.
    pub fn header_mut(&mut self) -> &mut TableHeader {
        &mut self.header
    }

    /// Rows in order.
    #[must_use]
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// Appends a row.
    pub fn add_row(&mut self, row: DataRow) {
        self.rows.push(row);
    }

    /// Replaces all rows.
    pub fn set_rows(&mut self, rows: Vec<DataRow>) {
        self.rows = rows;
    }

    /// Removes and returns all rows.
    pub fn take_rows(&mut self) -> Vec<DataRow> {
        std::mem::take(&mut self.rows)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the key column, one per row.
    #[must_use]
    pub fn key_values(&self) -> Vec<Value> {
        match self.header.key_column() {
            Some(key) => self.rows.iter().map(|r| r.value(key).clone()).collect(),
            None => Vec::new(),
        }
    }
}
