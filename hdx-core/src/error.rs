use crate::status::Status;
use thiserror::Error;

/// Error raised for every failed client operation.
///
/// Local validation failures (decoded from a negative request id) and
/// remote failures (a non-success completion) share this one type. They
/// differ only in the attached status, attribute and engine message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render(.status, .attribute, .message))]
pub struct ClientError {
    status: Status,
    attribute: Option<String>,
    message: Option<String>,
}

fn render(status: &Status, attribute: &Option<String>, message: &Option<String>) -> String {
    let mut text = match attribute {
        Some(attr) if status.template().contains("%s") => status.template().replace("%s", attr),
        _ => status.description().to_string(),
    };

    if let Some(msg) = message {
        if !msg.is_empty() {
            text.push_str(": ");
            text.push_str(msg);
        }
    }

    text
}

impl ClientError {
    /// Status-only error
    pub fn new(status: Status) -> Self {
        Self {
            status,
            attribute: None,
            message: None,
        }
    }

    /// Attach the name of the attribute that caused the failure
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Attach diagnostic text reported by the engine
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns a stable error code for this error.
    /// These codes are stable and can be used by callers for error classification.
    pub fn code(&self) -> &'static str {
        match self.status {
            Status::Success => "SUCCESS",
            Status::NotFound => "NOT_FOUND",
            Status::SearchDone => "SEARCH_DONE",
            Status::CmpFail => "COMPARISON_FAILED",
            Status::ReadOnly => "READ_ONLY",
            Status::UnknownSpace => "UNKNOWN_SPACE",
            Status::CoordFail => "COORDINATOR_FAILURE",
            Status::ServerError => "SERVER_ERROR",
            Status::PollFailed => "POLL_FAILED",
            Status::Overflow => "OVERFLOW",
            Status::Reconfigure => "RECONFIGURE",
            Status::Timeout => "TIMEOUT",
            Status::UnknownAttr => "UNKNOWN_ATTRIBUTE",
            Status::DupeAttr => "DUPLICATE_ATTRIBUTE",
            Status::NonePending => "NONE_PENDING",
            Status::DontUseKey => "DONT_USE_KEY",
            Status::WrongType => "WRONG_TYPE",
            Status::NoMem => "NO_MEMORY",
            Status::Interrupted => "INTERRUPTED",
            Status::ClusterJump => "CLUSTER_JUMP",
            Status::Offline => "OFFLINE",
            Status::Unauthorized => "UNAUTHORIZED",
            Status::Internal => "INTERNAL_ERROR",
            Status::Exception => "EXCEPTION",
            Status::Garbage => "GARBAGE",
        }
    }

    /// Returns true if this error is potentially retryable.
    ///
    /// Transient cluster and loop conditions are retryable; errors that
    /// describe the request itself (unknown attribute, wrong type, ...) are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status,
            Status::Timeout
                | Status::Interrupted
                | Status::Reconfigure
                | Status::CoordFail
                | Status::PollFailed
                | Status::Offline
                | Status::ClusterJump
        )
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::new(status)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitutes_attribute() {
        let err = ClientError::new(Status::UnknownAttr).with_attribute("colour");
        assert_eq!(err.to_string(), "Unknown attribute \"colour\"");
        assert_eq!(err.attribute(), Some("colour"));
    }

    #[test]
    fn test_status_only_message() {
        let err = ClientError::new(Status::UnknownAttr);
        assert_eq!(err.to_string(), "Unknown attribute");
        assert!(err.attribute().is_none());
    }

    #[test]
    fn test_attribute_ignored_without_slot() {
        let err = ClientError::new(Status::Timeout).with_attribute("v");
        assert_eq!(err.to_string(), "Timeout");
        assert_eq!(err.attribute(), Some("v"));
    }

    #[test]
    fn test_engine_message_appended() {
        let err = ClientError::new(Status::ServerError).with_message("disk full");
        assert_eq!(err.to_string(), "Server error: disk full");

        let empty = ClientError::new(Status::ServerError).with_message("");
        assert_eq!(empty.to_string(), "Server error");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::new(Status::Timeout).is_retryable());
        assert!(ClientError::new(Status::Reconfigure).is_retryable());
        assert!(!ClientError::new(Status::UnknownAttr).is_retryable());
        assert!(!ClientError::new(Status::NoMem).is_retryable());
    }

    #[test]
    fn test_codes() {
        assert_eq!(ClientError::new(Status::NoMem).code(), "NO_MEMORY");
        assert_eq!(ClientError::new(Status::WrongType).code(), "WRONG_TYPE");
        assert_eq!(ClientError::from(Status::Internal).code(), "INTERNAL_ERROR");
    }
}
