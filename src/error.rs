use std::fmt;
use std::io;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Find string is empty")]
    EmptyQuery,

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid escape sequence '{sequence}' at offset {position}")]
    InvalidEscape { position: usize, sequence: String },

    #[error("Invalid replacement reference '{reference}': {reason}")]
    InvalidReplacementReference { reference: String, reason: String },

    #[error("Scope {}..{} is out of range for a buffer of {buffer_len} bytes", scope.start, scope.end)]
    ScopeOutOfRange {
        scope: Range<usize>,
        buffer_len: usize,
    },

    #[error("Search cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("No focused text buffer")]
    NoFocusedBuffer,

    #[error("No query has been set")]
    NoQuery,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("An unexpected error occurred: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Why a scan stopped before reaching the end of its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Requested,
    BudgetExhausted { limit: usize },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancellation requested"),
            CancelReason::BudgetExhausted { limit } => {
                write!(f, "scan budget of {limit} bytes exhausted")
            }
        }
    }
}

impl From<regex::Error> for FinderError {
    fn from(err: regex::Error) -> Self {
        FinderError::InvalidPattern(err.to_string())
    }
}

impl FinderError {
    /// Errors raised while turning user input into a matcher or template.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            FinderError::EmptyQuery
                | FinderError::InvalidPattern(_)
                | FinderError::InvalidEscape { .. }
                | FinderError::InvalidReplacementReference { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FinderError>;
