use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON error body of a failed REST call.
///
/// Spring-style bodies (`{"status":403,"error":"Forbidden","message":...}`)
/// carry the reason phrase in `error`, which lands in `details`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, alias = "error")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Body synthesized from a status reason and a non-JSON response text.
    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {details}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
