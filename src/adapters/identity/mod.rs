//! Identity adapters.

pub mod profile;

pub use profile::FileProfile;
