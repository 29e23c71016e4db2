//! Utilities
//!
//! Application error type and data-directory path helpers.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;
