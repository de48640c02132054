//! Backend implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `MessagingBackend` trait. Only the in-memory backend ships with the
//! crate; production backends implement the trait in their own crates and
//! are injected as a `BackendPtr`.
//!
//! Domain code must not depend on backend-specific types.

mod memory;

pub use memory::{BackendOp, MemoryBackend};
