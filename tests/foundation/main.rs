//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: DataType conversions, Value, naming rules, and Error.

mod errors;
mod naming;
