//! Extension trait shared by every error type in the workspace.

use std::any::Any;
use std::error::Error;
use std::fmt;

use crate::status_code::StatusCode;

/// Common behavior for workspace errors.
pub trait ErrorExt: Error {
    /// Status code classifying this error.
    fn status_code(&self) -> StatusCode {
        StatusCode::Unknown
    }

    /// Returns the error as [`Any`] so callers can downcast.
    fn as_any(&self) -> &dyn Any;

    /// Whether retrying the failed operation may succeed.
    fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }

    /// Message suitable for surfacing to a user.
    ///
    /// Internal failures only expose their numeric code.
    fn output_msg(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => {
                format!("Internal error: {}", self.status_code() as i32)
            }
            _ => self.to_string(),
        }
    }
}

/// An error carrying just a message and a status code.
#[derive(Debug, Clone)]
pub struct PlainError {
    message: String,
    status_code: StatusCode,
}

impl PlainError {
    pub fn new(message: impl Into<String>, status_code: StatusCode) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }
}

impl fmt::Display for PlainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for PlainError {}

impl ErrorExt for PlainError {
    fn status_code(&self) -> StatusCode {
        self.status_code
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "ext.test.rs"]
mod tests;
