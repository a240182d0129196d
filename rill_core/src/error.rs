use std::fmt::{self, Display};

#[derive(Debug, Clone)]
pub struct RillError {
    pub message: String,
    pub error_type: RillErrorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RillErrorType {
    /// The scheduler needed a runnable process and the ready ring was empty.
    EmptyQueue,
    /// A structural invariant was violated, either by the core or by
    /// externally supplied resumption logic. Always fatal for the run.
    Invariant,
}

impl RillError {
    pub fn empty_queue() -> Self {
        Self {
            message: "no runnable process in the ready ring".to_string(),
            error_type: RillErrorType::EmptyQueue,
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: RillErrorType::Invariant,
        }
    }

    pub fn is_empty_queue(&self) -> bool {
        self.error_type == RillErrorType::EmptyQueue
    }
}

impl Display for RillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_type {
            RillErrorType::EmptyQueue => write!(f, "empty queue: {}", self.message),
            RillErrorType::Invariant => write!(f, "invariant violation: {}", self.message),
        }
    }
}

impl std::error::Error for RillError {}
