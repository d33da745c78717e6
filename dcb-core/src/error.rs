//! The error taxonomy shared by every engine.
//!
//! Every fallible operation in this crate returns [`Error`]. Callers discriminate by
//! [`Error::kind`], never by matching on the `Display` string. Every error names the
//! operation that raised it (`"query"`, `"append"`, `"project"`, ...) via
//! [`Error::operation`], and a concurrency error additionally carries the condition that
//! was violated via [`Error::condition`].
use std::fmt;

use crate::condition::AppendCondition;

/// A coarse, string-free discriminant for [`Error`]'s four kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: empty type, empty tags, invalid JSON data, batch too large.
    /// Deterministic, not retryable.
    Validation,
    /// `FailIfEventsMatch` tripped inside the transaction, or a serialization failure
    /// under `Serializable` isolation. Retryable at the caller's discretion.
    Concurrency,
    /// Connection failure, timeout, cancellation, or an unexpected database error.
    /// Possibly retryable.
    Resource,
    /// A projector panicked, or the engine detected an invariant violation. Not
    /// retryable without a code fix.
    Internal,
}

/// The error type returned by every operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input failed validation before reaching the database.
    #[error("{operation}: validation error: {message}")]
    Validation {
        /// The operation that rejected the input, e.g. `"append"` or `"InputEvent::new"`.
        operation: &'static str,
        message: String,
    },
    /// An append condition was violated, or a concurrent writer won the race.
    #[error("{operation}: concurrency error: append condition violated")]
    Concurrency {
        /// The operation whose condition was violated. Always `"append"` today.
        operation: &'static str,
        condition: Box<AppendCondition>,
    },
    /// A resource (connection, timeout, cancellation) failed independently of the
    /// caller's input.
    #[error("{operation}: resource error: {source}")]
    Resource {
        /// The operation that was abandoned, e.g. `"query"` or `"query_stream"`.
        operation: &'static str,
        #[source]
        source: crate::BoxDynError,
    },
    /// An invariant the engine itself is responsible for was violated, or a projector
    /// transition panicked.
    #[error("{operation}: internal error: {message}")]
    Internal {
        /// The operation in which the engine's own invariant was broken.
        operation: &'static str,
        message: String,
    },
}

impl Error {
    /// The coarse kind of this error, for string-free discrimination.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Concurrency { .. } => ErrorKind::Concurrency,
            Error::Resource { .. } => ErrorKind::Resource,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The name of the operation that raised this error, e.g. `"query"`, `"append"`,
    /// `"project"`. Never matched on by callers doing kind discrimination — use
    /// [`Error::kind`] for that — but useful for logs and diagnostics.
    pub fn operation(&self) -> &'static str {
        match self {
            Error::Validation { operation, .. }
            | Error::Concurrency { operation, .. }
            | Error::Resource { operation, .. }
            | Error::Internal { operation, .. } => operation,
        }
    }

    /// The condition that was violated, if this is a [`Error::Concurrency`].
    pub fn condition(&self) -> Option<&AppendCondition> {
        match self {
            Error::Concurrency { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Builds a [`Error::Validation`] naming the operation that rejected the input.
    pub fn validation(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            operation,
            message: message.into(),
        }
    }

    /// Builds a [`Error::Resource`] from any boxable error, naming the operation that
    /// was abandoned.
    pub fn resource(operation: &'static str, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Resource {
            operation,
            source: Box::new(err),
        }
    }

    /// Builds a [`Error::Concurrency`] carrying the condition that was violated.
    pub fn concurrency(operation: &'static str, condition: AppendCondition) -> Self {
        Error::Concurrency {
            operation,
            condition: Box::new(condition),
        }
    }

    /// Builds a [`Error::Internal`] naming the operation in which the engine's own
    /// invariant was broken.
    pub fn internal(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Internal {
            operation,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Resource => "resource",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{name}")
    }
}
