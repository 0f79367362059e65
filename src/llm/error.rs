//! Model call failures
//!
//! Every failure is classified once, where it happens, so callers can tell
//! a run worth retrying from one that never will succeed.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// The provider could not be reached or the exchange was cut short
    Transport,
    /// Provider asked us to slow down
    RateLimited,
    /// Provider failed on its side
    Upstream,
    /// Credentials missing, wrong or without access to the model
    Rejected,
    /// Provider refused the request as built
    InvalidRequest,
    /// Provider answered with something we cannot read
    Malformed,
    /// No model configured for this process
    Unavailable,
}

impl LlmErrorKind {
    /// Whether a later identical request could succeed
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transport | Self::RateLimited | Self::Upstream)
    }
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Transport, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Upstream, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Malformed, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unavailable, message)
    }

    /// Classify a non-success HTTP status from the provider
    pub fn from_status(status: u16, detail: &str) -> Self {
        match status {
            401 | 403 => Self::new(
                LlmErrorKind::Rejected,
                format!("Model provider rejected credentials: {detail}"),
            ),
            429 => Self::new(
                LlmErrorKind::RateLimited,
                format!("Model provider rate limit exceeded: {detail}"),
            ),
            400 | 404 | 422 => Self::new(
                LlmErrorKind::InvalidRequest,
                format!("Model provider refused request: {detail}"),
            ),
            _ => Self::upstream(format!("Model provider failed with HTTP {status}: {detail}")),
        }
    }

    /// Classify a failure to complete the HTTP exchange
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::transport(format!("Model request timed out: {error}"))
        } else if error.is_connect() {
            Self::transport(format!("Could not reach model provider: {error}"))
        } else if error.is_decode() || error.is_body() {
            Self::transport(format!("Model response interrupted: {error}"))
        } else {
            Self::transport(format!("Model request failed: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let cases = [
            (401, LlmErrorKind::Rejected),
            (403, LlmErrorKind::Rejected),
            (429, LlmErrorKind::RateLimited),
            (400, LlmErrorKind::InvalidRequest),
            (404, LlmErrorKind::InvalidRequest),
            (500, LlmErrorKind::Upstream),
            (503, LlmErrorKind::Upstream),
            (418, LlmErrorKind::Upstream),
        ];
        for (status, kind) in cases {
            assert_eq!(LlmError::from_status(status, "x").kind, kind, "status {status}");
        }

        let err = LlmError::from_status(502, "bad gateway");
        assert_eq!(err.to_string(), "Model provider failed with HTTP 502: bad gateway");
    }

    #[test]
    fn test_only_provider_side_failures_are_transient() {
        assert!(LlmErrorKind::Transport.is_transient());
        assert!(LlmErrorKind::RateLimited.is_transient());
        assert!(LlmErrorKind::Upstream.is_transient());
        assert!(!LlmErrorKind::Rejected.is_transient());
        assert!(!LlmErrorKind::InvalidRequest.is_transient());
        assert!(!LlmErrorKind::Malformed.is_transient());
        assert!(!LlmErrorKind::Unavailable.is_transient());
    }
}
