//! Commands
//!
//! Entry points for the UI layer and the CLI. Each command takes the shared
//! `AppState` explicitly and returns a `CommandResponse`.

pub mod health;
pub mod settings;
pub mod tasks;

pub use health::*;
pub use settings::*;
pub use tasks::*;
