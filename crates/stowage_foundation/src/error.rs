//! Error types for the Stowage system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::data_type::DataType;
use crate::value::Value;

/// The main error type for Stowage operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a conversion error.
    #[must_use]
    pub fn conversion(value: &Value, target: DataType) -> Self {
        Self::new(ErrorKind::Conversion {
            value: format!("{value:?}"),
            from: value.data_type(),
            target,
        })
    }

    /// Creates a schema violation error.
    #[must_use]
    pub fn schema(class: impl Into<String>, violation: SchemaViolation) -> Self {
        Self::new(ErrorKind::Schema {
            class: class.into(),
            violation,
        })
    }

    /// Creates a field access error.
    #[must_use]
    pub fn field_access(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::FieldAccess {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Creates a store error.
    #[must_use]
    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store {
            store: store.into(),
            message: message.into(),
        })
    }

    /// Creates a not-connected error.
    #[must_use]
    pub fn not_connected(store: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected(store.into()))
    }

    /// Creates a table-not-found error.
    #[must_use]
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::new(ErrorKind::TableNotFound(table.into()))
    }

    /// Creates an instantiation error.
    #[must_use]
    pub fn instantiation(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Instantiation {
            class: class.into(),
            reason: reason.into(),
        })
    }

    /// Creates an unregistered type error.
    #[must_use]
    pub fn unregistered(type_name: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unregistered(type_name.into()))
    }

    /// Returns the schema violation, if this is a schema error.
    #[must_use]
    pub fn violation(&self) -> Option<&SchemaViolation> {
        match &self.kind {
            ErrorKind::Schema { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A value could not be converted to the requested type.
    #[error("cannot convert {value} ({from}) to {target}")]
    Conversion {
        /// Debug rendering of the offending value.
        value: String,
        /// The value's own type.
        from: DataType,
        /// The requested type.
        target: DataType,
    },

    /// An entity type violates a persistence rule.
    #[error("class {class}: {violation}")]
    Schema {
        /// The entity type name.
        class: String,
        /// The rule that was violated.
        violation: SchemaViolation,
    },

    /// Reading or writing a field on an instance failed.
    #[error("field {field}: {reason}")]
    FieldAccess {
        /// The field name.
        field: String,
        /// Why access failed.
        reason: String,
    },

    /// A backing store operation failed.
    #[error("store {store}: {message}")]
    Store {
        /// The store (schema) name.
        store: String,
        /// Description of the failure.
        message: String,
    },

    /// The backing store is not connected.
    #[error("store not connected: {0}")]
    NotConnected(String),

    /// The table has not been validated in the store.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A default instance could not be constructed.
    #[error("cannot instantiate {class}: {reason}")]
    Instantiation {
        /// The entity type name.
        class: String,
        /// Why construction failed.
        reason: String,
    },

    /// The entity type was never registered.
    #[error("type not registered: {0}")]
    Unregistered(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Persistence rules checked while binding an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The class settings carry no table name.
    MissingClassName,
    /// Instances must be cached.
    NotCached,
    /// A non-contained type has no identity field.
    MissingIdField,
    /// More than one field is flagged as identity.
    MultipleIdFields {
        /// The rejected second identity field.
        field: String,
    },
    /// A contained type declares an identity field.
    ContainedWithIdField {
        /// The identity field.
        field: String,
    },
    /// The identity field is flagged contained.
    ContainedIdField {
        /// The field.
        field: String,
    },
    /// A scalar field is flagged contained.
    ContainedScalar {
        /// The field.
        field: String,
    },
    /// A non-identity field is flagged autogenerated.
    AutogeneratedNonId {
        /// The field.
        field: String,
    },
    /// A non-integer identity field is flagged autogenerated.
    AutogeneratedNonInteger {
        /// The field.
        field: String,
        /// The field's type.
        data_type: DataType,
    },
    /// A list field whose elements are themselves lists.
    ListOfLists {
        /// The field.
        field: String,
    },
    /// A list nested inside a contained entity.
    NestedList {
        /// The field.
        field: String,
    },
    /// A reference by identity to a type without an identity field.
    ReferenceWithoutId {
        /// The field.
        field: String,
        /// The referenced type.
        target: String,
    },
    /// The referenced type could not be bound.
    UnboundTarget {
        /// The field.
        field: String,
        /// The referenced type.
        target: String,
    },
    /// An accessor pair that does not name a field.
    InvalidAccessors {
        /// The getter name.
        getter: String,
        /// The setter name.
        setter: String,
    },
    /// The field type has no storage representation.
    NotPersistable {
        /// The field.
        field: String,
    },
    /// Two fields map to the same column.
    DuplicateField {
        /// The column name.
        field: String,
    },
    /// No usable field remained.
    NoFields,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingClassName => write!(f, "missing persistence class name"),
            Self::NotCached => write!(f, "non-cached objects are not supported"),
            Self::MissingIdField => {
                write!(f, "must specify one id field, use an auto int if needed")
            }
            Self::MultipleIdFields { field } => {
                write!(f, "can't have more than one id field ({field})")
            }
            Self::ContainedWithIdField { field } => {
                write!(f, "a contained class can't have an id field ({field})")
            }
            Self::ContainedIdField { field } => {
                write!(f, "an id field can't be a contained entity ({field})")
            }
            Self::ContainedScalar { field } => {
                write!(f, "only list and object fields may be contained ({field})")
            }
            Self::AutogeneratedNonId { field } => {
                write!(f, "only id fields may be autogenerated ({field})")
            }
            Self::AutogeneratedNonInteger { field, data_type } => {
                write!(f, "only integer fields may be autogenerated ({field}: {data_type})")
            }
            Self::ListOfLists { field } => write!(f, "lists of lists not supported ({field})"),
            Self::NestedList { field } => {
                write!(f, "lists inside contained entities not supported ({field})")
            }
            Self::ReferenceWithoutId { field, target } => {
                write!(f, "{field} references {target}, which has no id field")
            }
            Self::UnboundTarget { field, target } => {
                write!(f, "{field} references {target}, which could not be bound")
            }
            Self::InvalidAccessors { getter, setter } => {
                write!(f, "{getter}/{setter} is not a getter/setter pair")
            }
            Self::NotPersistable { field } => write!(f, "field {field} is not persistable"),
            Self::DuplicateField { field } => write!(f, "duplicate field {field}"),
            Self::NoFields => write!(f, "no persisted fields"),
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Table being read or written.
    pub table: Option<String>,
    /// Field being read or written.
    pub field: Option<String>,
    /// Identity of the row involved.
    pub id: Option<Value>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the row identity.
    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(table) = &self.table {
            parts.push(format!("table {table}"));
        }
        if let Some(field) = &self.field {
            parts.push(format!("field {field}"));
        }
        if let Some(id) = &self.id {
            parts.push(format!("id {id}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}
