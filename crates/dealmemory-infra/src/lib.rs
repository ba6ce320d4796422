//! Infrastructure layer for dealmemory.
//!
//! Contains the implementations behind the ports defined in `dealmemory-core`:
//! SQLite storage for `KvStore`, config loading and data-directory layout.

pub mod config;
pub mod filesystem;
pub mod sqlite;
