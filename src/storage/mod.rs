//! Storage Layer
//!
//! Handles all data persistence: task collections, the task id sequence, and
//! JSON config, all written through atomic whole-file replacement.

pub mod atomic_json;
pub mod config;
pub mod sequence;
pub mod task_store;

pub use atomic_json::AtomicJsonFile;
pub use config::ConfigService;
pub use sequence::TaskIdAllocator;
pub use task_store::{Collection, TaskStore};
