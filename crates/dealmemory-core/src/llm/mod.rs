//! Language-model collaborator abstraction.

pub mod provider;
