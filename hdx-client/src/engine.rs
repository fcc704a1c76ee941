/// The seam between the client and whatever executes requests.
///
/// An engine accepts submissions and hands back completions one at a time.
/// It knows nothing about handles or the operation table; the client does
/// all correlation.

use crate::request::Request;
use hdx_core::{ClientError, Record, Status};
use std::fmt;
use std::time::Duration;

/// Identifier of an accepted request. Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(i64);

impl RequestId {
    /// Wrap a raw id, rejecting negative values
    pub fn new(raw: i64) -> Option<Self> {
        (raw >= 0).then_some(RequestId(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an engine returns from `submit`.
///
/// A negative `id` is a local rejection whose magnitude encodes the position
/// of the offending entry; `status` then says what was wrong with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSubmission {
    pub id: i64,
    pub status: Status,
}

impl RawSubmission {
    pub fn accepted(id: i64) -> Self {
        Self {
            id,
            status: Status::Success,
        }
    }

    pub fn rejected(id: i64, status: Status) -> Self {
        Self { id, status }
    }

    pub fn is_rejected(&self) -> bool {
        self.id < 0
    }

    /// Convert the raw form into a tagged result.
    ///
    /// Rejections are decoded against `request`'s arrays; `message` is the
    /// engine's diagnostic for the failure, if any.
    pub fn into_result(
        self,
        request: &Request,
        message: Option<String>,
    ) -> Result<RequestId, ClientError> {
        if let Some(id) = RequestId::new(self.id) {
            return Ok(id);
        }

        let status = if self.status.is_error() {
            self.status
        } else {
            Status::Internal
        };
        let err = request.resolver().error_for(self.id, status);
        Err(match message {
            Some(msg) => err.with_message(msg),
            None => err,
        })
    }
}

/// Data carried by a completion
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Record(Record),
    Count(u64),
    Description(String),
}

/// One completed event for an outstanding request
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub request_id: RequestId,
    pub status: Status,
    pub payload: Option<Payload>,
    /// Engine diagnostic for failed events
    pub message: Option<String>,
}

impl Completion {
    pub fn new(request_id: RequestId, status: Status) -> Self {
        Self {
            request_id,
            status,
            payload: None,
            message: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Error for a non-success status, carrying the engine diagnostic
    pub fn to_error(&self) -> ClientError {
        let err = ClientError::new(self.status);
        match &self.message {
            Some(msg) => err.with_message(msg.clone()),
            None => err,
        }
    }
}

/// Executes requests on behalf of a `Client`
pub trait Engine: Send {
    /// Submit a request. Must not block on the network.
    fn submit(&mut self, request: &Request) -> RawSubmission;

    /// Block until one completion is ready, or fail with a loop status
    /// (TIMEOUT, INTERRUPTED, NONEPENDING, POLLFAILED, ...).
    fn pump(&mut self, timeout: Option<Duration>) -> Result<Completion, Status>;

    /// Diagnostic text for the most recent failure
    fn error_message(&self) -> Option<String> {
        None
    }
}
