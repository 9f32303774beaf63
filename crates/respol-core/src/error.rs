//! Shared error type across respol crates.

use thiserror::Error;

/// Response class of an error at the admission boundary (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller sent something malformed; retrying the same request cannot help.
    Client,
    /// Infrastructure or engine fault on our side.
    Server,
}

impl ErrorClass {
    /// Machine-readable reason carried next to the status code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Client => "BadRequest",
            ErrorClass::Server => "InternalError",
        }
    }

    /// HTTP status code carried in admission responses.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorClass::Client => 400,
            ErrorClass::Server => 500,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Unified error type used by core and operator.
///
/// `Compile` and `Evaluation` are engine failures and are never the same thing
/// as a deny verdict; callers decide how to surface them.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Displayed verbatim; admission surfaces it unchanged.
    #[error("{0}")]
    Decode(String),
    #[error("cluster store: {0}")]
    Store(String),
    #[error("failed to prepare policy query: {0}")]
    Compile(String),
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
    #[error("evaluation deadline exceeded")]
    Timeout,
    #[error("invalid config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl PolicyError {
    /// Map internal error to a stable response class.
    pub fn class(&self) -> ErrorClass {
        match self {
            PolicyError::BadRequest(_) | PolicyError::Decode(_) | PolicyError::Config(_) => {
                ErrorClass::Client
            }
            PolicyError::Store(_)
            | PolicyError::Compile(_)
            | PolicyError::Evaluation(_)
            | PolicyError::Timeout
            | PolicyError::Internal(_) => ErrorClass::Server,
        }
    }

    /// True for errors raised by the decision engine rather than infrastructure.
    pub fn is_engine_error(&self) -> bool {
        matches!(self, PolicyError::Compile(_) | PolicyError::Evaluation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_map_to_http_status() {
        assert_eq!(PolicyError::Decode("x".into()).class().http_status(), 400);
        assert_eq!(PolicyError::Store("x".into()).class().http_status(), 500);
        assert_eq!(PolicyError::Timeout.class().http_status(), 500);
        assert_eq!(PolicyError::Config("x".into()).class(), ErrorClass::Client);
    }

    #[test]
    fn decode_message_is_verbatim() {
        let err = PolicyError::Decode("object has no metadata.name".into());
        assert_eq!(err.to_string(), "object has no metadata.name");
        assert_eq!(err.class().as_str(), "BadRequest");
    }

    #[test]
    fn engine_errors_are_flagged() {
        assert!(PolicyError::Compile("x".into()).is_engine_error());
        assert!(PolicyError::Evaluation("x".into()).is_engine_error());
        assert!(!PolicyError::Store("x".into()).is_engine_error());
    }
}
