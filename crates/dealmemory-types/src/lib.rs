//! Shared domain types for dealmemory.
//!
//! This crate contains the types that describe one user's learned investment
//! profile (thesis, red flags, memo preferences, deal history), the transient
//! `MemoryUpdate` records reported after a change, configuration, and the
//! message shapes exchanged with the language-model collaborator.
//!
//! Zero infrastructure dependencies -- only serde, chrono and thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
