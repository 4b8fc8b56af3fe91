use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerErrorCode {
    InvalidArgument,
    Internal,
    Environment,
    Network,
}

impl TrackerErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerErrorCode::InvalidArgument => "tracker/invalid-argument",
            TrackerErrorCode::Internal => "tracker/internal",
            TrackerErrorCode::Environment => "tracker/environment",
            TrackerErrorCode::Network => "tracker/network",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackerError {
    pub code: TrackerErrorCode,
    message: String,
}

impl TrackerError {
    pub fn new(code: TrackerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for TrackerError {}

pub type TrackerResult<T> = Result<T, TrackerError>;

pub fn invalid_argument(message: impl Into<String>) -> TrackerError {
    TrackerError::new(TrackerErrorCode::InvalidArgument, message)
}

pub fn internal_error(message: impl Into<String>) -> TrackerError {
    TrackerError::new(TrackerErrorCode::Internal, message)
}

/// The host does not offer a capability the tracker needs (no window, no body, no history).
pub fn environment_error(message: impl Into<String>) -> TrackerError {
    TrackerError::new(TrackerErrorCode::Environment, message)
}

pub fn network_error(message: impl Into<String>) -> TrackerError {
    TrackerError::new(TrackerErrorCode::Network, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = invalid_argument("site id must not be empty");
        assert_eq!(
            err.to_string(),
            "site id must not be empty (tracker/invalid-argument)"
        );
        assert_eq!(err.code, TrackerErrorCode::InvalidArgument);
    }
}
