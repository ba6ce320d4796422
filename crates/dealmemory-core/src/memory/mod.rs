//! The memory subsystem.
//!
//! - `store`: `MemoryStore`, persistence of one user's `Memory` over a `KvStore`
//! - `ops`: in-place edits shared by the store and the extractor, including
//!   the red-flag reinforcement rule
//! - `extractor`: conversation-to-memory extraction
//! - `injector`: memory-to-prompt rendering
//! - `format`: number formatting used in rendered text

pub mod extractor;
pub mod format;
pub mod injector;
pub mod ops;
pub mod store;
