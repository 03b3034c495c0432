//! Error handling.

use ndarray::ShapeError;
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::types::DValue;

/// Shareable underlying cause of an error.
///
/// Causes are reference counted so that [ActiveStorageError] can be cloned, which allows a
/// failed [DeferredResult](crate::deferred::DeferredResult) to return the same error every time
/// it is materialised.
pub type Cause = Arc<dyn Error + Send + Sync>;

/// Active storage error type
///
/// This type encapsulates the various errors that may occur while planning, executing or
/// combining a reduction.
#[derive(Clone, Debug, Error)]
pub enum ActiveStorageError {
    /// Active mode requested from a dispatcher without an active storage backend
    #[error("no active storage backend is configured")]
    ActiveStorageUnavailable,

    /// Finalising an operation would divide by zero
    #[error("division by zero while finalising {operation}")]
    DivisionByZero { operation: &'static str },

    /// Every element of the selection was masked or missing
    #[error("cannot perform {operation} when all selected elements are masked")]
    EmptyChunk { operation: &'static str },

    /// The requested selection contains no elements
    #[error("cannot perform {operation} on empty selection")]
    EmptyRange { operation: &'static str },

    /// Error converting from bytes to a type
    #[error("failed to convert from bytes to {type_name}")]
    FromBytes { type_name: &'static str },

    /// Incompatible missing data descriptor
    #[error("Incompatible value {0} for missing")]
    IncompatibleMissing(DValue),

    /// Insufficient memory to process request
    #[error("Insufficient memory to process request ({requested} > {total})")]
    InsufficientMemory { requested: usize, total: usize },

    /// Requested selection or chunk hint is not valid for the variable
    #[error("invalid selection: {reason}")]
    InvalidSlice { reason: String },

    /// Mask does not line up with the data it masks
    #[error("mask shape {mask:?} does not match data shape {data:?}")]
    MaskAlignment { mask: Vec<usize>, data: Vec<usize> },

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquire(#[source] Arc<AcquireError>),

    /// Error creating ndarray ArrayView from Shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// Error opening a source
    #[error("error opening source {identifier}")]
    SourceOpen {
        identifier: String,
        #[source]
        cause: Cause,
    },

    /// Error reading a variable from a source
    #[error("error reading variable {variable} from {identifier}")]
    SourceRead {
        identifier: String,
        variable: String,
        #[source]
        cause: Cause,
    },

    /// A chunk task panicked or was cancelled
    #[error("chunk task failed: {reason}")]
    TaskJoin { reason: String },

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Unsupported operation requested
    #[error("unsupported operation {operation}")]
    UnsupportedOperation { operation: String },

    /// Error validating a VariableRef
    #[error("variable description is not valid")]
    VariableValidation(#[from] validator::ValidationErrors),
}

/// Category of an [ActiveStorageError].
///
/// Callers that only care about which class of failure occurred can match on this rather
/// than on the individual variants.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DivisionByZero,
    EmptyChunk,
    EmptyRange,
    Internal,
    InvalidSlice,
    InvalidVariable,
    MaskAlignment,
    SourceRead,
    UnsupportedOperation,
}

impl ActiveStorageError {
    /// Return a [ActiveStorageError::SourceRead] error.
    ///
    /// # Arguments
    ///
    /// * `identifier`: Source identifier
    /// * `variable`: Name of the variable being read
    /// * `cause`: Underlying error or message
    pub fn source_read(
        identifier: &str,
        variable: &str,
        cause: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::SourceRead {
            identifier: identifier.to_string(),
            variable: variable.to_string(),
            cause: Arc::from(cause.into()),
        }
    }

    /// Return a [ActiveStorageError::SourceOpen] error.
    pub fn source_open(identifier: &str, cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::SourceOpen {
            identifier: identifier.to_string(),
            cause: Arc::from(cause.into()),
        }
    }

    /// Return an [ActiveStorageError::InvalidSlice] error.
    pub fn invalid_slice(reason: impl Into<String>) -> Self {
        Self::InvalidSlice {
            reason: reason.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DivisionByZero { operation: _ } => ErrorKind::DivisionByZero,
            Self::EmptyChunk { operation: _ } => ErrorKind::EmptyChunk,
            Self::EmptyRange { operation: _ } => ErrorKind::EmptyRange,
            Self::InvalidSlice { reason: _ } => ErrorKind::InvalidSlice,
            Self::MaskAlignment { mask: _, data: _ } => ErrorKind::MaskAlignment,
            // Malformed data is reported as a read failure.
            Self::FromBytes { type_name: _ }
            | Self::ShapeInvalid(_)
            | Self::SourceOpen {
                identifier: _,
                cause: _,
            }
            | Self::SourceRead {
                identifier: _,
                variable: _,
                cause: _,
            } => ErrorKind::SourceRead,
            Self::UnsupportedOperation { operation: _ } => ErrorKind::UnsupportedOperation,
            Self::VariableValidation(_) => ErrorKind::InvalidVariable,
            Self::ActiveStorageUnavailable
            | Self::IncompatibleMissing(_)
            | Self::InsufficientMemory {
                requested: _,
                total: _,
            }
            | Self::SemaphoreAcquire(_)
            | Self::TaskJoin { reason: _ }
            | Self::TryFromInt(_) => ErrorKind::Internal,
        }
    }

    /// Returns the messages of the chain of errors that caused this one, outermost first.
    ///
    /// Consecutive duplicate messages are removed.
    pub fn caused_by(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = self.source();
        while let Some(source) = current {
            causes.push(source.to_string());
            current = source.source();
        }
        causes.dedup();
        causes
    }

    /// Log this error and its causes.
    pub fn log(&self) {
        event!(Level::ERROR, kind = %self.kind(), "{}", self);
        for cause in self.caused_by() {
            event!(Level::ERROR, "Caused by: {}", cause);
        }
    }
}

impl From<AcquireError> for ActiveStorageError {
    fn from(error: AcquireError) -> Self {
        Self::SemaphoreAcquire(Arc::new(error))
    }
}

impl From<tokio::task::JoinError> for ActiveStorageError {
    fn from(error: tokio::task::JoinError) -> Self {
        // JoinError may carry a panic payload which is neither Clone nor Sync.
        Self::TaskJoin {
            reason: error.to_string(),
        }
    }
}
