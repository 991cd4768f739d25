//! List field bindings.
//!
//! A list field is stored in a child table named after the owner's table and
//! the field (`Team` + `members` is `TeamMember`). Each element is one row
//! tagged with the owner's identity in the parent-key column (`TeamId`).
//! Saving replaces a parent's whole child set; loading groups the child rows
//! by parent key.

use std::any::{Any, type_name};
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use stowage_foundation::naming::contained_name;
use stowage_foundation::{DataType, Error, ErrorKind, Result, SchemaViolation, Value};
use stowage_store::{DataField, DataRow, DataTable};

use crate::declare::{Accessor, Handle, Persisted};
use crate::field::FieldInfo;
use crate::reference::{Embedding, Target};
use crate::session::{LoadSession, PendingList};

/// The entity a list belongs to.
pub(crate) struct ListOwner<'a> {
    pub(crate) table: &'a str,
    pub(crate) id: &'a FieldInfo,
}

/// Erases the element type of a list binding.
pub(crate) trait ListAccess<T> {
    fn prepare(
        &self,
        info: &FieldInfo,
        owner: &ListOwner<'_>,
        depth: usize,
    ) -> std::result::Result<(), SchemaViolation>;

    fn targets(&self, info: &FieldInfo) -> Vec<Target>;

    /// An empty child table carrying the full header.
    fn table(&self, info: &FieldInfo) -> Result<DataTable>;

    /// Appends one row per element of `instance`'s list to `table`.
    fn save(&self, info: &FieldInfo, table: &mut DataTable, parent: &Value, instance: &T) -> Result<()>;

    /// Rebuilds the lists of `parents` from the child rows in `table`.
    fn load(
        &self,
        info: &FieldInfo,
        table: &DataTable,
        parents: &[(Value, Handle<T>)],
        session: &mut LoadSession,
    ) -> Result<()>;
}

struct ListShape<B> {
    table: String,
    parent_key: String,
    parent_type: DataType,
    element: Embedding<B>,
}

pub(crate) struct ListField<T, B> {
    accessor: Accessor<T, Vec<Handle<B>>>,
    shape: OnceCell<ListShape<B>>,
}

impl<T, B> ListField<T, B> {
    pub(crate) fn new(accessor: Accessor<T, Vec<Handle<B>>>) -> Self {
        Self {
            accessor,
            shape: OnceCell::new(),
        }
    }

    fn shape(&self, info: &FieldInfo) -> Result<&ListShape<B>> {
        self.shape.get().ok_or_else(|| {
            Error::new(ErrorKind::Internal(format!("list {} is not bound", info.name())))
        })
    }
}

impl<T: 'static, B: Persisted> ListAccess<T> for ListField<T, B> {
    fn prepare(
        &self,
        info: &FieldInfo,
        owner: &ListOwner<'_>,
        depth: usize,
    ) -> std::result::Result<(), SchemaViolation> {
        let element = Embedding::resolve(info, depth)?;
        let _ = self.shape.set(ListShape {
            table: contained_name(owner.table, info.name()),
            parent_key: contained_name(owner.table, owner.id.name()),
            parent_type: owner.id.data_type(),
            element,
        });
        Ok(())
    }

    fn targets(&self, _info: &FieldInfo) -> Vec<Target> {
        self.shape.get().map_or_else(Vec::new, |s| s.element.targets())
    }

    fn table(&self, info: &FieldInfo) -> Result<DataTable> {
        let shape = self.shape(info)?;
        let mut table = DataTable::new(shape.table.clone());
        let header = table.header_mut();
        header.add(DataField::header(shape.parent_key.clone(), shape.parent_type));
        header.set_parent_key(shape.parent_key.clone());
        shape.element.columns(header);
        Ok(table)
    }

    fn save(&self, info: &FieldInfo, table: &mut DataTable, parent: &Value, instance: &T) -> Result<()> {
        let shape = self.shape(info)?;
        for element in &self.accessor.read(instance) {
            let mut row = DataRow::new().with(DataField::new(
                shape.parent_key.clone(),
                shape.parent_type,
                parent.clone(),
            ));
            shape
                .element
                .save(&mut row, Some(element))
                .map_err(|e| e.with_context(info.context()))?;
            table.add_row(row);
        }
        Ok(())
    }

    fn load(
        &self,
        info: &FieldInfo,
        table: &DataTable,
        parents: &[(Value, Handle<T>)],
        session: &mut LoadSession,
    ) -> Result<()> {
        let shape = self.shape(info)?;

        let mut groups: HashMap<Value, Vec<&DataRow>> = HashMap::new();
        for row in table.rows() {
            let key = shape.parent_type.convert_from(row.value(&shape.parent_key))?;
            if !key.is_null() {
                groups.entry(key).or_default().push(row);
            }
        }

        for (key, holder) in parents {
            let Some(rows) = groups.get(key) else {
                continue;
            };

            if let Embedding::Contained(_) = shape.element {
                let mut elements = Vec::with_capacity(rows.len());
                for row in rows {
                    if let Some(element) = shape.element.rebuild(row, session)? {
                        elements.push(element);
                    }
                }
                let mut instance = holder
                    .try_borrow_mut()
                    .map_err(|_| Error::field_access(info.data_name(), "instance is borrowed"))?;
                self.accessor.write(&mut *instance, elements);
                continue;
            }

            let ids = rows
                .iter()
                .filter_map(|row| shape.element.referenced_id(row).transpose())
                .collect::<Result<Vec<_>>>()?;
            let holder = Rc::clone(holder);
            let accessor = self.accessor;
            let field = info.data_name();
            session.defer_list(PendingList {
                target: Target::of::<B>(),
                field: field.clone(),
                ids,
                apply: Box::new(move |found: Vec<Rc<dyn Any>>| {
                    let elements: Vec<Handle<B>> = found
                        .into_iter()
                        .filter_map(|any| any.downcast::<RefCell<B>>().ok())
                        .collect();
                    let mut instance = holder.try_borrow_mut().map_err(|_| {
                        Error::field_access(field, format!("{} list owner is borrowed", type_name::<B>()))
                    })?;
                    accessor.write(&mut *instance, elements);
                    Ok(())
                }),
            });
        }
        Ok(())
    }
}
