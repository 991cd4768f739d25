//! Integration tests for Layer 1: Store
//!
//! Tests the store contract against every backing store, plus file
//! persistence and the call journal.

mod contract;
mod file;
mod journal;
