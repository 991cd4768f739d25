//! Entity declarations.
//!
//! A persisted type describes itself once through [`Persisted::declare`]:
//! class settings plus one entry per persisted field. Fields are reached
//! either directly, through a pair of projection functions, or through a
//! getter/setter pair whose names yield the field name.
//!
//! ```ignore
//! impl Persisted for Account {
//!     fn declare() -> Declaration<Self> {
//!         Declaration::<Self>::new(PersistClass::new("Account"))
//!             .field(Persist::auto_id(), "id", |a| &a.id, |a| &mut a.id)
//!             .property(Persist::new(), "getName", Account::name, "setName", Account::set_name)
//!     }
//! }
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use stowage_foundation::naming::property_name;
use stowage_foundation::{Result, SchemaViolation};

use crate::field::{FieldBinding, FieldInfo};
use crate::value::FieldValue;

/// Shared, mutable handle to a cached instance.
pub type Handle<T> = Rc<RefCell<T>>;

/// Wraps a value in a new handle.
#[must_use]
pub fn handle<T>(value: T) -> Handle<T> {
    Rc::new(RefCell::new(value))
}

/// A type whose instances are persisted as rows.
pub trait Persisted: Default + 'static {
    /// Describes the table and fields of this type.
    fn declare() -> Declaration<Self>;

    /// Creates a blank instance to load a row into.
    ///
    /// # Errors
    ///
    /// Returns an instantiation error if no instance can be made; the row
    /// being loaded is skipped.
    fn instantiate() -> Result<Self> {
        Ok(Self::default())
    }
}

/// Class-level persistence settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistClass {
    /// Table name.
    pub name: String,
    /// Schema the table lives in; the registry default when unset.
    pub schema: Option<String>,
    /// Whether instances are cached. Only cached types are supported.
    pub cache: bool,
    /// Whether the type is only ever embedded in another type's rows.
    pub contained: bool,
}

impl PersistClass {
    /// Settings for a top-level, cached type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            cache: true,
            contained: false,
        }
    }

    /// Settings for a type embedded in its containers.
    #[must_use]
    pub fn contained(name: impl Into<String>) -> Self {
        Self {
            contained: true,
            ..Self::new(name)
        }
    }

    /// Builder method to set the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Builder method to set caching.
    #[must_use]
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

/// Field-level persistence flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Persist {
    /// The field is the identity.
    pub id: bool,
    /// Identity values are assigned by the engine.
    pub auto: bool,
    /// The referenced entity is embedded rather than referenced by identity.
    pub contained: bool,
}

impl Persist {
    /// A plain persisted field.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: false,
            auto: false,
            contained: false,
        }
    }

    /// The identity field, supplied by the caller.
    #[must_use]
    pub const fn id() -> Self {
        Self::new().with_id(true)
    }

    /// The identity field, assigned by the engine.
    #[must_use]
    pub const fn auto_id() -> Self {
        Self::id().with_auto(true)
    }

    /// An embedded entity or list of entities.
    #[must_use]
    pub const fn contained() -> Self {
        Self::new().with_contained(true)
    }

    /// Sets the identity flag.
    #[must_use]
    pub const fn with_id(mut self, id: bool) -> Self {
        self.id = id;
        self
    }

    /// Sets the autogeneration flag.
    #[must_use]
    pub const fn with_auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }

    /// Sets the containment flag.
    #[must_use]
    pub const fn with_contained(mut self, contained: bool) -> Self {
        self.contained = contained;
        self
    }
}

/// How a field is read and written on an instance.
pub enum Accessor<T, V> {
    /// Direct access to the member.
    Member {
        /// Borrows the member.
        get: fn(&T) -> &V,
        /// Borrows the member mutably.
        get_mut: fn(&mut T) -> &mut V,
    },
    /// A getter/setter pair.
    Property {
        /// Returns the value.
        getter: fn(&T) -> V,
        /// Replaces the value.
        setter: fn(&mut T, V),
    },
}

impl<T, V: Clone> Accessor<T, V> {
    /// Reads the current value.
    pub fn read(&self, instance: &T) -> V {
        match self {
            Self::Member { get, .. } => get(instance).clone(),
            Self::Property { getter, .. } => getter(instance),
        }
    }

    /// Replaces the current value.
    pub fn write(&self, instance: &mut T, value: V) {
        match self {
            Self::Member { get_mut, .. } => *get_mut(instance) = value,
            Self::Property { setter, .. } => setter(instance, value),
        }
    }
}

impl<T, V> Clone for Accessor<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Accessor<T, V> {}

impl<T, V> fmt::Debug for Accessor<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member { .. } => write!(f, "Accessor::Member"),
            Self::Property { .. } => write!(f, "Accessor::Property"),
        }
    }
}

/// The declared shape of a persisted type.
pub struct Declaration<T> {
    class: PersistClass,
    fields: Vec<FieldBinding<T>>,
    rejected: Vec<SchemaViolation>,
}

impl<T: 'static> Declaration<T> {
    /// Starts a declaration with the given class settings.
    #[must_use]
    pub fn new(class: PersistClass) -> Self {
        Self {
            class,
            fields: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Declares a field accessed directly.
    #[must_use]
    pub fn field<V: FieldValue>(
        mut self,
        persist: Persist,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.fields.push(FieldBinding::new(
            FieldInfo::new(name, V::data_type(), persist),
            V::binding(Accessor::Member { get, get_mut }),
        ));
        self
    }

    /// Declares a field accessed through a getter/setter pair.
    ///
    /// The field name is the shared suffix of the two accessor names. A pair
    /// that does not name one field is recorded as rejected and reported when
    /// the type is bound.
    #[must_use]
    pub fn property<V: FieldValue>(
        mut self,
        persist: Persist,
        getter_name: &str,
        getter: fn(&T) -> V,
        setter_name: &str,
        setter: fn(&mut T, V),
    ) -> Self {
        match property_name(getter_name, setter_name) {
            Some(name) => self.fields.push(FieldBinding::new(
                FieldInfo::new(&name, V::data_type(), persist),
                V::binding(Accessor::Property { getter, setter }),
            )),
            None => self.rejected.push(SchemaViolation::InvalidAccessors {
                getter: getter_name.to_string(),
                setter: setter_name.to_string(),
            }),
        }
        self
    }

    /// Class settings.
    #[must_use]
    pub fn class(&self) -> &PersistClass {
        &self.class
    }

    /// Declared fields, in order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().map(FieldBinding::info)
    }

    /// The first field flagged as identity.
    #[must_use]
    pub fn id_field(&self) -> Option<&FieldInfo> {
        self.fields().find(|f| f.is_id())
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn into_parts(self) -> (PersistClass, Vec<FieldBinding<T>>, Vec<SchemaViolation>) {
        (self.class, self.fields, self.rejected)
    }
}

impl<T> fmt::Debug for Declaration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("class", &self.class)
            .field("fields", &self.fields.len())
            .field("rejected", &self.rejected)
            .finish()
    }
}
