//! Stowage - Object-relational persistence with an identity-keyed cache
//!
//! This crate re-exports all layers of the Stowage system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: stowage_engine     - Declarations, field bindings, caches, load sessions
//! Layer 1: stowage_store      - Row/table exchange format, backing stores
//! Layer 0: stowage_foundation - Core types (DataType, Value, Error)
//! ```

pub use stowage_engine as engine;
pub use stowage_foundation as foundation;
pub use stowage_store as store;
