//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: Called by UI/adapter into the application
//! - Outbound: Called by application into infrastructure
//! - Events: state-change publication seam

pub mod events;
pub mod inbound;
pub mod outbound;

pub use events::{NoopObserver, SessionEvent, SessionObserver, TracingObserver};
pub use inbound::InputPort;
pub use outbound::{
    AttemptStore, ConfigSource, Identity, QuestionPool, RemoteResult, ResultsGateway,
    SubmissionStore,
};
