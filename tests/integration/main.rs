//! Integration tests for the full stack
//!
//! End-to-end scenarios: declared types saved through the registry into a
//! store, then reloaded into a fresh cache.

mod accounts;
mod cycles;
mod failures;
mod teams;
