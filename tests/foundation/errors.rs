//! Integration tests for error types
//!
//! Tests error construction, context, and display.

use stowage_foundation::{DataType, Error, ErrorContext, ErrorKind, SchemaViolation, Value};

#[test]
fn schema_error_carries_violation() {
    let err = Error::schema("Account", SchemaViolation::MissingIdField);
    assert_eq!(err.violation(), Some(&SchemaViolation::MissingIdField));
    assert!(err.to_string().contains("Account"));
}

#[test]
fn conversion_error_names_types() {
    let err = Error::conversion(&Value::from("x"), DataType::Integer);
    assert!(matches!(
        err.kind,
        ErrorKind::Conversion {
            target: DataType::Integer,
            ..
        }
    ));
    assert!(err.violation().is_none());
}

#[test]
fn context_is_attached() {
    let err = Error::field_access("name", "instance is borrowed").with_context(
        ErrorContext::new()
            .with_table("Account")
            .with_id(Value::Integer(3)),
    );
    let context = err.context.as_ref().unwrap();
    assert_eq!(context.table.as_deref(), Some("Account"));
    assert_eq!(context.id, Some(Value::Integer(3)));
}

#[test]
fn violation_messages() {
    let violation = SchemaViolation::MultipleIdFields { field: "b".into() };
    assert!(violation.to_string().contains('b'));
    assert_eq!(SchemaViolation::NoFields.to_string(), "no persisted fields");
}
