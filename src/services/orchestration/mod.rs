//! Task Orchestration
//!
//! Planning, step execution and the task lifecycle.
//!
//! - `planner` - asks the model for a step list and parses it leniently
//! - `step_executor` - runs one step against the model
//! - `service` - `TaskOrchestrator`, the public lifecycle operations

pub mod planner;
pub mod service;
pub mod step_executor;

pub use planner::StepPlanner;
pub use service::{TaskOrchestrator, CANCELLED_ERROR};
pub use step_executor::{StepExecutionConfig, StepExecutor};
