use thiserror::Error;

use crate::domain::WorkerState;

/// Failure raised by a handler while computing one item.
///
/// It only ever reaches the producer that submitted the item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpindleError {
    #[error("queue capacity must be between 1 and {max} (got {0})", max = crate::queue::MAX_CAPACITY)]
    InvalidCapacity(usize),

    #[error("queue is closed")]
    QueueClosed,

    #[error("queue is full")]
    QueueFull,

    #[error("cannot {op} a worker in state {state}")]
    InvalidState { op: &'static str, state: WorkerState },

    #[error("completion was already fulfilled")]
    DoubleFulfillment,

    #[error("worker did not stop before the deadline")]
    ShutdownTimedOut,

    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("request was dropped before it was fulfilled")]
    Abandoned,
}

impl SpindleError {
    /// Lifecycle and construction errors are caller bugs; the rest can be
    /// handled at runtime.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            SpindleError::InvalidCapacity(_)
                | SpindleError::InvalidState { .. }
                | SpindleError::DoubleFulfillment
        )
    }
}
