//! Data Models
//!
//! Configuration and command response types. Task and step records live in
//! `opsdesk-core` and are re-exported here for command handlers.

pub mod response;
pub mod settings;

pub use opsdesk_core::task::*;
pub use response::*;
pub use settings::*;
