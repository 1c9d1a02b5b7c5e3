//! Cross-cutting helpers: configuration and the clock seam.

pub mod clock;
pub mod config;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
