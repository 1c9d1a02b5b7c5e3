//! Content adapters. Read-only question and exam-type catalog.

pub mod json_catalog;

pub use json_catalog::JsonCatalog;
