//! Memory store, extraction and prompt injection for dealmemory.
//!
//! This crate defines the ports (`KvStore`, `LlmProvider`) that the
//! infrastructure layer and callers implement. It depends only on
//! `dealmemory-types`, never on `dealmemory-infra` or any database/IO crate.

pub mod chat;
pub mod llm;
pub mod memory;
pub mod storage;
