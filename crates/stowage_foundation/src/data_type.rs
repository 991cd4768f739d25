//! Storage-neutral type descriptor.
//!
//! Every persisted field is classified into one [`DataType`]. Scalars convert
//! losslessly (dates to second resolution) between their in-memory form and a
//! storage-safe primitive: dates become epoch seconds, booleans become `0`/`1`.

use std::fmt;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// Semantic type of a persisted field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    /// Integral number.
    Integer,
    /// Boolean flag, stored as `0`/`1`.
    Boolean,
    /// Floating point number.
    Double,
    /// Text.
    String,
    /// Point in time, stored as epoch seconds.
    Date,
    /// Another persisted entity (nested or referenced).
    Object,
    /// Collection of persisted entities, stored in a child table.
    List,
    /// Not persistable.
    Null,
}

impl DataType {
    /// Returns true for the types that fit in a single cell.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Boolean | Self::Double | Self::String | Self::Date
        )
    }

    /// Returns true if identity values of this type may be autogenerated.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Integer)
    }

    /// The type a store reports for cells written with this type.
    #[must_use]
    pub const fn storage_type(self) -> Self {
        match self {
            Self::Date | Self::Boolean => Self::Integer,
            other => other,
        }
    }

    /// Converts an in-memory value into its storage-safe form.
    ///
    /// Null stays null (the empty marker). Already-normalized values pass
    /// through unchanged, so the conversion is idempotent.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the value cannot be represented as `self`.
    pub fn convert_from(self, value: &Value) -> crate::Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let converted = match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Double, Value::Double(_))
            | (Self::Integer | Self::Date | Self::Boolean, Value::Integer(_)) => value.clone(),
            (Self::String, other) => Value::from(other.to_string()),
            (Self::Double, other) => Value::Double(parse_double(self, other)?),
            (Self::Integer, other) => Value::Integer(parse_integer(self, other)?),
            (Self::Date, Value::Date(d)) => Value::Integer(d.timestamp()),
            (Self::Boolean, Value::Boolean(b)) => Value::Integer(i64::from(*b)),
            (Self::Object | Self::List | Self::Null, other) => other.clone(),
            (target, other) => return Err(Error::conversion(other, target)),
        };
        Ok(converted)
    }

    /// Converts a storage-safe value back into its in-memory form.
    ///
    /// Null stays absent. Values already in their in-memory form pass through
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the stored value cannot be read as `self`.
    pub fn convert_to(self, value: &Value) -> crate::Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let converted = match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Double, Value::Double(_))
            | (Self::Integer, Value::Integer(_))
            | (Self::Date, Value::Date(_))
            | (Self::Boolean, Value::Boolean(_)) => value.clone(),
            (Self::String, other) => Value::from(other.to_string()),
            (Self::Double, other) => Value::Double(parse_double(self, other)?),
            (Self::Integer, other) => Value::Integer(parse_integer(self, other)?),
            (Self::Date, Value::Integer(seconds)) => Value::Date(
                DateTime::<Utc>::from_timestamp(*seconds, 0)
                    .ok_or_else(|| Error::conversion(value, self))?,
            ),
            (Self::Date, Value::String(s)) => Value::Date(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|_| Error::conversion(value, self))?
                    .with_timezone(&Utc),
            ),
            (Self::Boolean, Value::Integer(n)) => Value::Boolean(*n != 0),
            (Self::Boolean, Value::String(s)) => match s.as_ref() {
                "true" | "1" => Value::Boolean(true),
                "false" | "0" => Value::Boolean(false),
                _ => return Err(Error::conversion(value, self)),
            },
            (Self::Object | Self::List | Self::Null, other) => other.clone(),
            (target, other) => return Err(Error::conversion(other, target)),
        };
        Ok(converted)
    }
}

#[allow(clippy::cast_precision_loss)]
fn parse_double(target: DataType, value: &Value) -> crate::Result<f64> {
    match value {
        Value::Double(n) => Ok(*n),
        Value::Integer(n) => Ok(*n as f64),
        Value::String(s) => s.trim().parse().map_err(|_| Error::conversion(value, target)),
        _ => Err(Error::conversion(value, target)),
    }
}

fn parse_integer(target: DataType, value: &Value) -> crate::Result<i64> {
    match value {
        Value::Integer(n) => Ok(*n),
        Value::Boolean(b) => Ok(i64::from(*b)),
        Value::String(s) => s.trim().parse().map_err(|_| Error::conversion(value, target)),
        _ => Err(Error::conversion(value, target)),
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Double => "double",
            Self::String => "string",
            Self::Date => "date",
            Self::Object => "object",
            Self::List => "list",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}
