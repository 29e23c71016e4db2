//! OpsDesk Core
//!
//! Task model shared across the OpsDesk workspace: task and step records, their
//! status machines, the persisted timestamp codec, and core error types. This
//! crate has no dependency on storage, HTTP, or the async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `task` - `Task`, `Step`, status enums, `StepKind`, result records
//! - `timestamp` - serde codec for persisted time fields
//! - `proxy` - Proxy configuration data types shared with the LLM crate

pub mod error;
pub mod proxy;
pub mod task;
pub mod timestamp;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Task Model ─────────────────────────────────────────────────────────
pub use task::{
    ExecutionOutcome, Step, StepKind, StepResult, StepStatus, Task, TaskStatus, TaskSummary,
};

// ── Proxy Types ────────────────────────────────────────────────────────
pub use proxy::{ProxyConfig, ProxyProtocol};
