//! Storage abstractions for dealmemory.
//!
//! Defines the key-value port the memory store persists through, plus an
//! in-process implementation used by tests and ephemeral sessions.
//! The durable implementation lives in dealmemory-infra.

pub mod in_memory;
pub mod kv_store;
