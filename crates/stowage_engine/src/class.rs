//! Bound entity shapes.
//!
//! [`PersistedClass`] is a declaration after its rules were checked: the
//! table name, the surviving field bindings, and the identity field. Rules
//! that only invalidate one field drop that field with a warning; rules that
//! invalidate the type fail the bind.
//!
//! The same declaration is bound again, re-parented under a field, wherever
//! the type is embedded in another type's rows. Such nested copies never
//! carry identity and never own lists.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use stowage_foundation::naming::sanitize_identifier;
use stowage_foundation::{Error, ErrorKind, Result, SchemaViolation, Value};
use stowage_store::{DataField, DataRow, DataTable, TableHeader};

use crate::declare::{Declaration, Handle, PersistClass, Persisted};
use crate::field::{FieldBinding, FieldInfo, Kind};
use crate::list::{ListAccess, ListOwner};
use crate::reference::Target;
use crate::session::LoadSession;

/// How deep contained entities may nest inside one another.
pub const MAX_CONTAINMENT_DEPTH: usize = 8;

/// The checked shape of a persisted type.
pub struct PersistedClass<T> {
    settings: PersistClass,
    table: String,
    fields: Vec<FieldBinding<T>>,
    id_index: Option<usize>,
    container: Option<String>,
    warnings: Vec<SchemaViolation>,
}

impl<T: Persisted> PersistedClass<T> {
    /// Binds the top-level shape of `T`.
    ///
    /// # Errors
    ///
    /// Returns a schema error naming the violated rule if `T` cannot be
    /// persisted.
    pub fn bind() -> Result<Self> {
        Self::bind_declaration(T::declare(), None, 0)
    }

    /// Binds `T` re-parented under `container`, for embedding.
    pub(crate) fn bind_nested(container: &str, depth: usize) -> Result<Self> {
        Self::bind_declaration(T::declare(), Some(container), depth)
    }

    #[allow(clippy::too_many_lines)]
    fn bind_declaration(
        declaration: Declaration<T>,
        container: Option<&str>,
        depth: usize,
    ) -> Result<Self> {
        let (settings, declared, rejected) = declaration.into_parts();
        let class_name = settings.name.clone();
        let fail = |violation| Error::schema(class_name.clone(), violation);

        if settings.name.trim().is_empty() {
            return Err(fail(SchemaViolation::MissingClassName));
        }
        if !settings.cache {
            return Err(fail(SchemaViolation::NotCached));
        }

        let mut ids = declared.iter().filter(|f| f.info().is_id());
        let first_id = ids.next().map(|f| f.info().clone());
        if let Some(id) = first_id.as_ref().filter(|_| settings.contained) {
            return Err(fail(SchemaViolation::ContainedWithIdField {
                field: id.name().to_string(),
            }));
        }
        if let Some(second) = ids.next().filter(|_| container.is_none()) {
            return Err(fail(SchemaViolation::MultipleIdFields {
                field: second.info().name().to_string(),
            }));
        }

        let table = sanitize_identifier(&settings.name);
        let owns_lists = container.is_none() && !settings.contained;
        let mut warnings = rejected;
        let mut fields = Vec::with_capacity(declared.len());
        let mut names = HashSet::new();

        for mut field in declared {
            if let Some(container) = container {
                field.info_mut().reparent(container);
            }

            let mut persist = field.info().persist();
            if persist.auto && !persist.id {
                warnings.push(SchemaViolation::AutogeneratedNonId {
                    field: field.info().name().to_string(),
                });
                persist.auto = false;
            }
            if persist.auto && !field.info().data_type().is_integral() {
                warnings.push(SchemaViolation::AutogeneratedNonInteger {
                    field: field.info().name().to_string(),
                    data_type: field.info().data_type(),
                });
                persist.auto = false;
            }
            field.info_mut().set_persist(persist);

            let owner = first_id.as_ref().filter(|_| owns_lists).map(|id| ListOwner {
                table: &table,
                id,
            });
            match Self::check_field(&field, owner.as_ref(), depth) {
                Ok(()) => {}
                Err(violation) => {
                    warnings.push(violation);
                    continue;
                }
            }

            if !names.insert(field.info().data_name()) {
                warnings.push(SchemaViolation::DuplicateField {
                    field: field.info().data_name(),
                });
                continue;
            }
            fields.push(field);
        }

        for violation in &warnings {
            warn!(class = class_name.as_str(), container, %violation, "field not persisted");
        }

        if fields.is_empty() {
            return Err(fail(SchemaViolation::NoFields));
        }
        let id_index = fields.iter().position(|f| f.info().is_id());
        if id_index.is_none() && container.is_none() && !settings.contained {
            return Err(fail(SchemaViolation::MissingIdField));
        }

        debug!(class = class_name.as_str(), container, fields = fields.len(), "bound");
        Ok(Self {
            settings,
            table,
            fields,
            id_index,
            container: container.map(str::to_string),
            warnings,
        })
    }

    /// Checks the rules that concern a single field, and binds references and
    /// lists to their targets.
    fn check_field(
        field: &FieldBinding<T>,
        owner: Option<&ListOwner<'_>>,
        depth: usize,
    ) -> std::result::Result<(), SchemaViolation> {
        let info = field.info();
        let name = || info.name().to_string();

        if info.is_id() && info.is_contained() {
            return Err(SchemaViolation::ContainedIdField { field: name() });
        }
        if info.is_id() && !field.is_scalar() {
            return Err(SchemaViolation::NotPersistable { field: name() });
        }

        match field.kind() {
            Kind::Scalar(_) if info.is_contained() => {
                Err(SchemaViolation::ContainedScalar { field: name() })
            }
            Kind::Scalar(_) => Ok(()),
            Kind::ListOfLists => Err(SchemaViolation::ListOfLists { field: name() }),
            Kind::List(list) => match owner {
                Some(owner) => list.prepare(info, owner, depth),
                None => Err(SchemaViolation::NestedList { field: name() }),
            },
            Kind::Reference(reference) => reference.prepare(info, depth),
        }
    }
}

impl<T: 'static> PersistedClass<T> {
    /// Declared class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Table the rows live in.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Declared schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.settings.schema.as_deref()
    }

    /// Class settings.
    #[must_use]
    pub fn settings(&self) -> &PersistClass {
        &self.settings
    }

    /// Storage name of the enclosing field, for nested copies.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Rules that dropped or adjusted a field.
    #[must_use]
    pub fn warnings(&self) -> &[SchemaViolation] {
        &self.warnings
    }

    /// Number of persisted fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Persisted fields, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldBinding<T>> {
        self.fields.iter()
    }

    /// The identity field.
    #[must_use]
    pub fn id_field(&self) -> Option<&FieldBinding<T>> {
        self.id_index.map(|i| &self.fields[i])
    }

    /// Adds the row columns of every field to `header`.
    pub fn columns(&self, header: &mut TableHeader) {
        for field in &self.fields {
            field.columns(header);
        }
    }

    /// Names of the row columns.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        let mut header = TableHeader::new();
        self.columns(&mut header);
        header.fields().iter().map(|f| f.name.clone()).collect()
    }

    /// An empty main table carrying the full header.
    #[must_use]
    pub fn table(&self) -> DataTable {
        let mut table = DataTable::new(self.table.clone());
        self.columns(table.header_mut());
        table
    }

    pub(crate) fn list_fields(&self) -> impl Iterator<Item = (&FieldInfo, &dyn ListAccess<T>)> {
        self.fields.iter().filter_map(|f| match f.kind() {
            Kind::List(list) => Some((f.info(), &**list)),
            _ => None,
        })
    }

    /// Writes every field of `instance` into `row`; nulls when absent.
    ///
    /// # Errors
    ///
    /// Returns the first field error.
    pub fn save_row(&self, row: &mut DataRow, instance: Option<&T>) -> Result<()> {
        for field in &self.fields {
            field.save(row, instance)?;
        }
        Ok(())
    }

    /// Reads every field from `row`. A field that fails is logged and left
    /// as it was; the remaining fields are still read.
    pub(crate) fn load_row(&self, row: &DataRow, holder: &Handle<T>, session: &mut LoadSession) -> usize {
        let mut failed = 0;
        for field in &self.fields {
            if let Err(e) = field.load(row, holder, session) {
                warn!(table = self.table.as_str(), field = %field.info().data_name(), error = %e, "field not loaded");
                failed += 1;
            }
        }
        failed
    }

    fn require_id(&self) -> Result<&FieldBinding<T>> {
        self.id_field().ok_or_else(|| {
            Error::new(ErrorKind::Internal(format!("{} has no id field", self.name())))
        })
    }

    /// The semantic identity of `instance`.
    ///
    /// # Errors
    ///
    /// Returns an error if the type has no identity field.
    pub fn id_value(&self, instance: &T) -> Result<Value> {
        self.require_id()?.get(instance)
    }

    /// The cache key for a semantic or stored identity.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if `id` does not fit the identity type.
    pub fn key(&self, id: &Value) -> Result<Value> {
        self.require_id()?.info().data_type().convert_from(id)
    }

    /// The cache key of `instance`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be read.
    pub fn key_of(&self, instance: &T) -> Result<Value> {
        self.key(&self.id_value(instance)?)
    }

    /// Writes the identity of `instance`.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if `id` does not fit the identity type.
    pub fn set_id(&self, instance: &mut T, id: &Value) -> Result<()> {
        self.require_id()?.set(instance, id)
    }

    /// A row holding only the identity cell, for deletes.
    ///
    /// # Errors
    ///
    /// Returns an error if the type has no identity field.
    pub fn id_row(&self, key: &Value) -> Result<DataRow> {
        let info = self.require_id()?.info();
        Ok(DataRow::new().with(
            DataField::new(info.data_name(), info.data_type(), key.clone()).with_id(true),
        ))
    }

    /// Entity types referenced by identity from any field.
    pub(crate) fn targets(&self) -> Vec<Target> {
        self.fields.iter().flat_map(FieldBinding::targets).collect()
    }
}

impl<T> fmt::Debug for PersistedClass<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedClass")
            .field("name", &self.settings.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("container", &self.container)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}
