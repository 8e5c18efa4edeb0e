//! Runtime support for deferred work.
//!
//! This module provides the task queue that batched stores flush on, plus the
//! thread-local stack that decides which queue is current.

mod context;

pub use context::{Runtime, DEFAULT_MAX_TASKS_PER_TICK};

/// Errors raised while running queued tasks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A single tick kept queuing new work past its budget.
    #[error("tick ran {ran} tasks without draining the queue ({remaining} still queued)")]
    Livelock { ran: usize, remaining: usize },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
