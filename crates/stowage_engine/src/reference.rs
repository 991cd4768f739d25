//! Reference field bindings.
//!
//! A reference holds another entity. By default the row stores the
//! referenced identity in one column (`owner` becomes `ownerId`) and the
//! handle is resolved once the referenced type is cached. A contained
//! reference instead flattens the referenced entity's fields into the row
//! under composed names and is rebuilt in place on load.

use std::any::{Any, TypeId, type_name};
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use tracing::warn;

use stowage_foundation::naming::contained_name;
use stowage_foundation::{Error, ErrorKind, Result, SchemaViolation, Value};
use stowage_store::{DataField, DataRow, TableHeader};

use crate::class::{MAX_CONTAINMENT_DEPTH, PersistedClass};
use crate::declare::{Accessor, Handle, Persisted, handle};
use crate::field::{FieldBinding, FieldInfo};
use crate::persistence::Persistence;
use crate::session::{LoadSession, PendingReference};

/// An entity type pointed at by identity.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Target {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) register: fn(&mut Persistence) -> Result<()>,
}

impl Target {
    pub(crate) fn of<B: Persisted>() -> Self {
        Self {
            type_id: TypeId::of::<B>(),
            type_name: type_name::<B>(),
            register: Persistence::register::<B>,
        }
    }
}

/// Erases the referenced type of a reference binding.
pub(crate) trait ReferenceAccess<T> {
    fn prepare(&self, info: &FieldInfo, depth: usize) -> std::result::Result<(), SchemaViolation>;

    fn targets(&self, info: &FieldInfo) -> Vec<Target>;

    fn columns(&self, info: &FieldInfo, header: &mut TableHeader);

    fn save(&self, info: &FieldInfo, row: &mut DataRow, instance: Option<&T>) -> Result<()>;

    fn load(
        &self,
        info: &FieldInfo,
        row: &DataRow,
        holder: &Handle<T>,
        session: &mut LoadSession,
    ) -> Result<()>;
}

/// How an element of type `B` is written into a row.
pub(crate) enum Embedding<B> {
    /// One column holding the identity of `B`.
    ById {
        column: String,
        id: FieldBinding<B>,
    },
    /// The fields of `B`, flattened under composed names.
    Contained(PersistedClass<B>),
}

impl<B: Persisted> Embedding<B> {
    /// Resolves the embedding of `B` for the field described by `info`.
    pub(crate) fn resolve(info: &FieldInfo, depth: usize) -> std::result::Result<Self, SchemaViolation> {
        let unbound = || SchemaViolation::UnboundTarget {
            field: info.name().to_string(),
            target: type_name::<B>().to_string(),
        };

        if info.is_contained() {
            if depth >= MAX_CONTAINMENT_DEPTH {
                return Err(unbound());
            }
            return PersistedClass::<B>::bind_nested(&info.data_name(), depth + 1)
                .map(Self::Contained)
                .map_err(|e| {
                    warn!(field = info.name(), target = type_name::<B>(), error = %e, "cannot embed");
                    unbound()
                });
        }

        let declaration = B::declare();
        let without_id = || SchemaViolation::ReferenceWithoutId {
            field: info.name().to_string(),
            target: declaration.class().name.clone(),
        };
        if declaration.class().contained {
            return Err(without_id());
        }
        let violation = without_id();
        let (_, fields, _) = declaration.into_parts();
        let id = fields
            .into_iter()
            .find(|f| f.info().is_id() && f.is_scalar())
            .ok_or(violation)?;
        Ok(Self::ById {
            column: contained_name(&info.data_name(), id.info().name()),
            id,
        })
    }

    pub(crate) fn targets(&self) -> Vec<Target> {
        match self {
            Self::ById { .. } => vec![Target::of::<B>()],
            Self::Contained(nested) => nested.targets(),
        }
    }

    pub(crate) fn columns(&self, header: &mut TableHeader) {
        match self {
            Self::ById { column, id } => {
                header.add(DataField::header(column.clone(), id.info().data_type()));
            }
            Self::Contained(nested) => nested.columns(header),
        }
    }

    /// Writes `element`'s cells, or nulls when absent.
    pub(crate) fn save(&self, row: &mut DataRow, element: Option<&Handle<B>>) -> Result<()> {
        let borrowed = element
            .map(|h| {
                h.try_borrow()
                    .map_err(|_| Error::field_access(type_name::<B>(), "element is mutably borrowed"))
            })
            .transpose()?;

        match self {
            Self::ById { column, id } => {
                let value = match &borrowed {
                    Some(b) => id.get(b)?,
                    None => Value::Null,
                };
                let data_type = id.info().data_type();
                row.add(DataField::new(column.clone(), data_type, data_type.convert_from(&value)?));
                Ok(())
            }
            Self::Contained(nested) => nested.save_row(row, borrowed.as_deref()),
        }
    }

    /// The stored identity this row points at, if any.
    pub(crate) fn referenced_id(&self, row: &DataRow) -> Result<Option<Value>> {
        match self {
            Self::ById { column, id } => {
                let cell = row.value(column);
                if cell.is_null() {
                    return Ok(None);
                }
                id.info().data_type().convert_from(cell).map(Some)
            }
            Self::Contained(_) => Ok(None),
        }
    }

    /// Rebuilds a contained element from `row`; `None` if every cell is null.
    pub(crate) fn rebuild(&self, row: &DataRow, session: &mut LoadSession) -> Result<Option<Handle<B>>> {
        let Self::Contained(nested) = self else {
            return Ok(None);
        };
        if nested.column_names().iter().all(|c| row.value(c).is_null()) {
            return Ok(None);
        }
        let element = handle(B::instantiate()?);
        nested.load_row(row, &element, session);
        Ok(Some(element))
    }
}

pub(crate) struct ReferenceField<T, B> {
    accessor: Accessor<T, Option<Handle<B>>>,
    embedding: OnceCell<Embedding<B>>,
}

impl<T, B> ReferenceField<T, B> {
    pub(crate) fn new(accessor: Accessor<T, Option<Handle<B>>>) -> Self {
        Self {
            accessor,
            embedding: OnceCell::new(),
        }
    }

    fn embedding(&self, info: &FieldInfo) -> Result<&Embedding<B>> {
        self.embedding.get().ok_or_else(|| {
            Error::new(ErrorKind::Internal(format!("reference {} is not bound", info.name())))
        })
    }
}

impl<T: 'static, B: Persisted> ReferenceAccess<T> for ReferenceField<T, B> {
    fn prepare(&self, info: &FieldInfo, depth: usize) -> std::result::Result<(), SchemaViolation> {
        let embedding = Embedding::resolve(info, depth)?;
        // Bound once; a second prepare keeps the first shape.
        let _ = self.embedding.set(embedding);
        Ok(())
    }

    fn targets(&self, _info: &FieldInfo) -> Vec<Target> {
        self.embedding.get().map_or_else(Vec::new, Embedding::targets)
    }

    fn columns(&self, _info: &FieldInfo, header: &mut TableHeader) {
        if let Some(embedding) = self.embedding.get() {
            embedding.columns(header);
        }
    }

    fn save(&self, info: &FieldInfo, row: &mut DataRow, instance: Option<&T>) -> Result<()> {
        let element = instance.and_then(|i| self.accessor.read(i));
        self.embedding(info)?
            .save(row, element.as_ref())
            .map_err(|e| e.with_context(info.context()))
    }

    fn load(
        &self,
        info: &FieldInfo,
        row: &DataRow,
        holder: &Handle<T>,
        session: &mut LoadSession,
    ) -> Result<()> {
        let embedding = self.embedding(info)?;

        if let Some(element) = embedding.rebuild(row, session)? {
            let mut instance = holder
                .try_borrow_mut()
                .map_err(|_| Error::field_access(info.data_name(), "instance is borrowed"))?;
            self.accessor.write(&mut *instance, Some(element));
            return Ok(());
        }

        let Some(id) = embedding.referenced_id(row)? else {
            return Ok(());
        };

        let holder = Rc::clone(holder);
        let accessor = self.accessor;
        let field = info.data_name();
        session.defer_reference(PendingReference {
            target: Target::of::<B>(),
            field: field.clone(),
            id,
            apply: Box::new(move |found: Option<Rc<dyn Any>>| {
                let element = found.and_then(|any| any.downcast::<RefCell<B>>().ok());
                let mut instance = holder
                    .try_borrow_mut()
                    .map_err(|_| Error::field_access(field, "instance is borrowed"))?;
                accessor.write(&mut *instance, element);
                Ok(())
            }),
        });
        Ok(())
    }
}
