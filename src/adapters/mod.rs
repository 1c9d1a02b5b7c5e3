//! Infrastructure adapters. Implement outbound ports.
//!
//! Persistence, remote endpoint, content catalog, identity, terminal UI.
//! Map infrastructure errors to DomainError.

pub mod content;
pub mod identity;
pub mod persistence;
pub mod remote;
pub mod ui;
