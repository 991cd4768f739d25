//! Integration tests for Layer 2: Engine
//!
//! Tests declarations and binding, descriptor cache behavior, and load
//! sessions through the public registry.

mod sessions;
