//! Classification of field types.
//!
//! Every Rust type a field may hold implements [`FieldValue`], which fixes
//! its [`DataType`] and the kind of binding it gets:
//!
//! | Rust type                         | Data type | Binding   |
//! |-----------------------------------|-----------|-----------|
//! | `i32`, `i64`, `u32`               | Integer   | scalar    |
//! | `bool`                            | Boolean   | scalar    |
//! | `f32`, `f64`                      | Double    | scalar    |
//! | `String`                          | String    | scalar    |
//! | `DateTime<Utc>`                   | Date      | scalar    |
//! | `Option<_>` of any of the above   | same      | scalar    |
//! | `Option<Handle<B>>`               | Object    | reference |
//! | `Vec<Handle<B>>`                  | List      | list      |
//!
//! Other types do not implement the trait, so a field of an unsupported
//! type fails to compile. `Vec<Vec<_>>` does classify as a list but is
//! rejected when the type is bound.

use chrono::{DateTime, Utc};

use stowage_foundation::{DataType, Error, Result, Value};

use crate::declare::{Accessor, Handle, Persisted};
use crate::field::{FieldKind, Kind};
use crate::list::ListField;
use crate::reference::ReferenceField;
use crate::scalar::ScalarField;

/// A value that fits in one cell.
pub trait ScalarValue: Clone + Default + 'static {
    /// Semantic type of the cell.
    const DATA_TYPE: DataType;

    /// The semantic cell value.
    fn to_value(&self) -> Value;

    /// Reads a semantic cell value. Null yields the default.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the value does not fit.
    fn from_value(value: &Value) -> Result<Self>;
}

/// A type a persisted field may hold.
pub trait FieldValue: Clone + 'static {
    /// Semantic type of the field.
    fn data_type() -> DataType;

    /// Builds the binding reaching this field through `accessor`.
    fn binding<T: 'static>(accessor: Accessor<T, Self>) -> FieldKind<T>;
}

/// A type a list field may hold as its elements.
pub trait ListElement: Clone + 'static {
    /// Builds the binding for a list of this element type.
    fn list_binding<T: 'static>(accessor: Accessor<T, Vec<Self>>) -> FieldKind<T>;
}

macro_rules! scalar_value {
    ($ty:ty, $data_type:expr, $to:expr, $from:expr) => {
        impl ScalarValue for $ty {
            const DATA_TYPE: DataType = $data_type;

            #[allow(clippy::redundant_closure_call)]
            fn to_value(&self) -> Value {
                ($to)(self)
            }

            #[allow(clippy::redundant_closure_call, clippy::cast_possible_truncation)]
            fn from_value(value: &Value) -> Result<Self> {
                if value.is_null() {
                    return Ok(Self::default());
                }
                ($from)(value).ok_or_else(|| Error::conversion(value, $data_type))
            }
        }

        impl ScalarValue for Option<$ty> {
            const DATA_TYPE: DataType = $data_type;

            fn to_value(&self) -> Value {
                self.as_ref().map_or(Value::Null, <$ty as ScalarValue>::to_value)
            }

            fn from_value(value: &Value) -> Result<Self> {
                if value.is_null() {
                    return Ok(None);
                }
                <$ty as ScalarValue>::from_value(value).map(Some)
            }
        }

        impl FieldValue for $ty {
            fn data_type() -> DataType {
                $data_type
            }

            fn binding<T: 'static>(accessor: Accessor<T, Self>) -> FieldKind<T> {
                FieldKind(Kind::Scalar(Box::new(ScalarField::new(accessor))))
            }
        }

        impl FieldValue for Option<$ty> {
            fn data_type() -> DataType {
                $data_type
            }

            fn binding<T: 'static>(accessor: Accessor<T, Self>) -> FieldKind<T> {
                FieldKind(Kind::Scalar(Box::new(ScalarField::new(accessor))))
            }
        }
    };
}

scalar_value!(
    i64,
    DataType::Integer,
    |v: &i64| Value::Integer(*v),
    |v: &Value| v.as_integer()
);
scalar_value!(
    i32,
    DataType::Integer,
    |v: &i32| Value::Integer(i64::from(*v)),
    |v: &Value| v.as_integer().and_then(|n| i32::try_from(n).ok())
);
scalar_value!(
    u32,
    DataType::Integer,
    |v: &u32| Value::Integer(i64::from(*v)),
    |v: &Value| v.as_integer().and_then(|n| u32::try_from(n).ok())
);
scalar_value!(
    bool,
    DataType::Boolean,
    |v: &bool| Value::Boolean(*v),
    |v: &Value| v.as_boolean()
);
scalar_value!(
    f64,
    DataType::Double,
    |v: &f64| Value::Double(*v),
    |v: &Value| v.as_double()
);
scalar_value!(
    f32,
    DataType::Double,
    |v: &f32| Value::Double(f64::from(*v)),
    |v: &Value| v.as_double().map(|n| n as f32)
);
scalar_value!(
    String,
    DataType::String,
    |v: &String| Value::from(v.as_str()),
    |v: &Value| v.as_str().map(str::to_string)
);
scalar_value!(
    DateTime<Utc>,
    DataType::Date,
    |v: &DateTime<Utc>| Value::Date(*v),
    |v: &Value| v.as_date()
);

impl<B: Persisted> FieldValue for Option<Handle<B>> {
    fn data_type() -> DataType {
        DataType::Object
    }

    fn binding<T: 'static>(accessor: Accessor<T, Self>) -> FieldKind<T> {
        FieldKind(Kind::Reference(Box::new(ReferenceField::new(accessor))))
    }
}

impl<E: ListElement> FieldValue for Vec<E> {
    fn data_type() -> DataType {
        DataType::List
    }

    fn binding<T: 'static>(accessor: Accessor<T, Self>) -> FieldKind<T> {
        E::list_binding(accessor)
    }
}

impl<B: Persisted> ListElement for Handle<B> {
    fn list_binding<T: 'static>(accessor: Accessor<T, Vec<Self>>) -> FieldKind<T> {
        FieldKind(Kind::List(Box::new(ListField::new(accessor))))
    }
}

impl<E: ListElement> ListElement for Vec<E> {
    fn list_binding<T: 'static>(_accessor: Accessor<T, Vec<Self>>) -> FieldKind<T> {
        FieldKind(Kind::ListOfLists)
    }
}
