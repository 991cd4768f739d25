//! Field bindings.
//!
//! A [`FieldBinding`] ties one declared field to its storage shape. The
//! three kinds share one interface: columns for the table header, `save`
//! into a row, and `load` from a row.
//!
//! - scalar fields occupy one cell;
//! - reference fields hold another entity, stored as its identity or, when
//!   contained, flattened into the row;
//! - list fields hold many entities, stored in a child table and handled by
//!   the entity descriptor rather than the row.

use std::fmt;

use stowage_foundation::naming::contained_name;
use stowage_foundation::{DataType, Error, ErrorContext, Result, Value};
use stowage_store::{DataField, DataRow, TableHeader};

use crate::declare::{Handle, Persist};
use crate::list::ListAccess;
use crate::reference::{ReferenceAccess, Target};
use crate::scalar::ScalarAccess;
use crate::session::LoadSession;

/// Name, type and flags of a bound field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    name: String,
    data_type: DataType,
    container: Option<String>,
    persist: Persist,
}

impl FieldInfo {
    pub(crate) fn new(name: &str, data_type: DataType, persist: Persist) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            container: None,
            persist,
        }
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Storage name of the enclosing field, when nested.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Persistence flags.
    #[must_use]
    pub fn persist(&self) -> Persist {
        self.persist
    }

    /// Returns true for the identity field.
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.persist.id
    }

    /// Returns true if identity values are assigned by the engine.
    #[must_use]
    pub fn is_autogenerated(&self) -> bool {
        self.persist.auto
    }

    /// Returns true if the referenced entity is embedded.
    #[must_use]
    pub fn is_contained(&self) -> bool {
        self.persist.contained
    }

    /// Storage name: the declared name, composed with the container's when
    /// nested (`owner` + `name` is `ownerName`).
    #[must_use]
    pub fn data_name(&self) -> String {
        match &self.container {
            Some(container) => contained_name(container, &self.name),
            None => self.name.clone(),
        }
    }

    pub(crate) fn set_persist(&mut self, persist: Persist) {
        self.persist = persist;
    }

    /// Moves the field under `container`. Nested copies never carry identity.
    pub(crate) fn reparent(&mut self, container: &str) {
        self.container = Some(container.to_string());
        self.persist.id = false;
        self.persist.auto = false;
    }

    pub(crate) fn context(&self) -> ErrorContext {
        ErrorContext::new().with_field(self.data_name())
    }
}

/// Opaque binding shape produced by [`FieldValue`](crate::FieldValue).
pub struct FieldKind<T>(pub(crate) Kind<T>);

pub(crate) enum Kind<T> {
    Scalar(Box<dyn ScalarAccess<T>>),
    Reference(Box<dyn ReferenceAccess<T>>),
    List(Box<dyn ListAccess<T>>),
    ListOfLists,
}

/// One persisted field of `T`.
pub struct FieldBinding<T> {
    info: FieldInfo,
    kind: Kind<T>,
}

impl<T: 'static> FieldBinding<T> {
    pub(crate) fn new(info: FieldInfo, kind: FieldKind<T>) -> Self {
        Self { info, kind: kind.0 }
    }

    /// Name, type and flags.
    #[must_use]
    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    pub(crate) fn info_mut(&mut self) -> &mut FieldInfo {
        &mut self.info
    }

    pub(crate) fn kind(&self) -> &Kind<T> {
        &self.kind
    }

    /// Returns true for single-cell fields.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, Kind::Scalar(_))
    }

    /// Returns true for fields holding another entity.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, Kind::Reference(_))
    }

    /// Returns true for fields stored in a child table.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.kind, Kind::List(_) | Kind::ListOfLists)
    }

    /// Reads a scalar field as a semantic value.
    ///
    /// # Errors
    ///
    /// Returns a field access error for non-scalar fields.
    pub fn get(&self, instance: &T) -> Result<Value> {
        match &self.kind {
            Kind::Scalar(scalar) => Ok(scalar.get(instance)),
            _ => Err(self.not_scalar()),
        }
    }

    /// Writes a scalar field from a semantic or storage value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the value does not fit, or a field access
    /// error for non-scalar fields.
    pub fn set(&self, instance: &mut T, value: &Value) -> Result<()> {
        match &self.kind {
            Kind::Scalar(scalar) => {
                let value = self.info.data_type.convert_to(value)?;
                scalar
                    .set(instance, &value)
                    .map_err(|e| e.with_context(self.info.context()))
            }
            _ => Err(self.not_scalar()),
        }
    }

    /// Adds this field's columns to a table header.
    pub(crate) fn columns(&self, header: &mut TableHeader) {
        match &self.kind {
            Kind::Scalar(_) => header.add(
                DataField::header(self.info.data_name(), self.info.data_type)
                    .with_id(self.info.is_id())
                    .with_autogenerated(self.info.is_autogenerated()),
            ),
            Kind::Reference(reference) => reference.columns(&self.info, header),
            Kind::List(_) | Kind::ListOfLists => {}
        }
    }

    /// Writes this field's cells into `row`. A missing instance writes nulls.
    pub(crate) fn save(&self, row: &mut DataRow, instance: Option<&T>) -> Result<()> {
        match &self.kind {
            Kind::Scalar(scalar) => {
                let value = instance.map_or(Value::Null, |i| scalar.get(i));
                let stored = self
                    .info
                    .data_type
                    .convert_from(&value)
                    .map_err(|e| e.with_context(self.info.context()))?;
                row.add(DataField::new(self.info.data_name(), self.info.data_type, stored));
                Ok(())
            }
            Kind::Reference(reference) => reference.save(&self.info, row, instance),
            Kind::List(_) | Kind::ListOfLists => Ok(()),
        }
    }

    /// Reads this field's cells from `row` into the instance behind `holder`.
    ///
    /// A missing cell leaves the field untouched. References to other
    /// entities are queued on `session` rather than resolved here.
    pub(crate) fn load(
        &self,
        row: &DataRow,
        holder: &Handle<T>,
        session: &mut LoadSession,
    ) -> Result<()> {
        match &self.kind {
            Kind::Scalar(scalar) => {
                let Some(cell) = row.get(&self.info.data_name()) else {
                    return Ok(());
                };
                let value = self
                    .info
                    .data_type
                    .convert_to(&cell.value)
                    .map_err(|e| e.with_context(self.info.context()))?;
                let mut instance = holder
                    .try_borrow_mut()
                    .map_err(|_| Error::field_access(self.info.data_name(), "instance is borrowed"))?;
                scalar
                    .set(&mut *instance, &value)
                    .map_err(|e| e.with_context(self.info.context()))
            }
            Kind::Reference(reference) => reference.load(&self.info, row, holder, session),
            Kind::List(_) | Kind::ListOfLists => Ok(()),
        }
    }

    /// Entity types this field points at by identity.
    pub(crate) fn targets(&self) -> Vec<Target> {
        match &self.kind {
            Kind::Scalar(_) | Kind::ListOfLists => Vec::new(),
            Kind::Reference(reference) => reference.targets(&self.info),
            Kind::List(list) => list.targets(&self.info),
        }
    }

    fn not_scalar(&self) -> Error {
        Error::field_access(self.info.data_name(), "not a scalar field")
    }
}

impl<T> fmt::Debug for FieldBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Scalar(_) => "scalar",
            Kind::Reference(_) => "reference",
            Kind::List(_) => "list",
            Kind::ListOfLists => "list of lists",
        };
        f.debug_struct("FieldBinding")
            .field("info", &self.info)
            .field("kind", &kind)
            .finish()
    }
}
