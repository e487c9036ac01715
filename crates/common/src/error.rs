//! Return codes and error types (thiserror-based).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a public API call or of one decode result.
///
/// Values match the public C header so they can be passed through unchanged.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnCode {
    Success = 0,
    /// Not an error: a queue is full or empty, retry later.
    Again = -1,
    /// Not an error: a query found nothing.
    NotFound = -2,
    Error = -3,
    Uninitialized = -4,
    Initialized = -5,
    InvalidParam = -6,
    NotSupported = -7,
    /// The result was discarded by an explicit flush.
    Flushed = -8,
    /// The base arrived but its enhancement did not, within budget.
    Timeout = -9,
}

impl ReturnCode {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Convert from the raw C value.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            -1 => Some(Self::Again),
            -2 => Some(Self::NotFound),
            -3 => Some(Self::Error),
            -4 => Some(Self::Uninitialized),
            -5 => Some(Self::Initialized),
            -6 => Some(Self::InvalidParam),
            -7 => Some(Self::NotSupported),
            -8 => Some(Self::Flushed),
            -9 => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl<T> From<Result<T, DecoderError>> for ReturnCode {
    fn from(result: Result<T, DecoderError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.return_code(),
        }
    }
}

/// Result alias used across the decoder.
pub type DecoderResult<T> = Result<T, DecoderError>;

/// Failure of a decoder API call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    #[error("Queue is full or empty, try again later")]
    Again,

    #[error("Not found")]
    NotFound,

    #[error("Decoder error: {reason}")]
    Error { reason: String },

    #[error("Decoder has not been initialized")]
    Uninitialized,

    #[error("Decoder has already been initialized")]
    Initialized,

    #[error("Invalid parameter: {reason}")]
    InvalidParam { reason: String },

    #[error("Not supported")]
    NotSupported,

    #[error("Flushed")]
    Flushed,

    #[error("Timed out")]
    Timeout,
}

impl DecoderError {
    /// Shorthand for [`DecoderError::Error`].
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DecoderError::InvalidParam`].
    pub fn invalid_param(reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            reason: reason.into(),
        }
    }

    /// The public return code this error is reported as.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Self::Again => ReturnCode::Again,
            Self::NotFound => ReturnCode::NotFound,
            Self::Error { .. } => ReturnCode::Error,
            Self::Uninitialized => ReturnCode::Uninitialized,
            Self::Initialized => ReturnCode::Initialized,
            Self::InvalidParam { .. } => ReturnCode::InvalidParam,
            Self::NotSupported => ReturnCode::NotSupported,
            Self::Flushed => ReturnCode::Flushed,
            Self::Timeout => ReturnCode::Timeout,
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid decoder config: {}", problems.join("; "))]
    Invalid { problems: Vec<String> },

    #[error("JSON config must be an object, got {found}")]
    NotAnObject { found: String },

    #[error("Failed to parse JSON config: {0}")]
    Json(String),
}

impl From<ConfigError> for DecoderError {
    fn from(e: ConfigError) -> Self {
        DecoderError::error(e.to_string())
    }
}
