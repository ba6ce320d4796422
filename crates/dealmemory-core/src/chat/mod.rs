//! Memory-aware chat orchestration.

pub mod service;
