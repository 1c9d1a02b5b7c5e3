//! Terminal UI. Implements the inbound port; no business logic lives here.

pub mod tui;

pub use tui::TuiInputPort;
