//! Data types, cell values, naming rules, and errors for Stowage.
//!
//! This crate provides:
//! - [`DataType`] - The storage-neutral type descriptor and its conversions
//! - [`Value`] - A single typed cell value
//! - [`naming`] - Column and table naming rules for nested fields
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod data_type;
pub mod error;
pub mod naming;
pub mod value;

pub use data_type::DataType;
pub use error::{Error, ErrorContext, ErrorKind, SchemaViolation};
pub use value::Value;

/// Result type for Stowage operations.
pub type Result<T> = std::result::Result<T, Error>;
