//! Application use cases. Orchestrate domain logic via ports.

pub mod generator;
pub mod scoring;
pub mod session;
pub mod sync_service;

pub use generator::ExamGenerator;
pub use scoring::ScoringEngine;
pub use session::ExamSessionEngine;
pub use sync_service::{RetryPolicy, SyncEngine};
