/// Single-result operations
///
/// A `Deferred<T>` is the caller's handle for a request that completes
/// exactly once. Waiting pumps the shared event loop, which may complete
/// other outstanding operations along the way.

use crate::client::Shared;
use crate::engine::{Completion, Payload, RequestId};
use crate::operation::PendingOperation;
use crate::table::OperationTable;
use hdx_core::{ClientError, Record, Result, Status};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Final state of a single-result operation, consumed by an encoder
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub status: Status,
    pub payload: Option<Payload>,
    pub message: Option<String>,
}

impl Outcome {
    fn error(&self) -> ClientError {
        let err = ClientError::new(self.status);
        match &self.message {
            Some(msg) => err.with_message(msg.clone()),
            None => err,
        }
    }
}

/// Turns an outcome into the value a caller sees
pub(crate) type Encoder<T> = fn(Outcome) -> Result<T>;

/// SUCCESS is true; NOTFOUND and CMPFAIL are false
pub(crate) fn encode_bool(outcome: Outcome) -> Result<bool> {
    match outcome.status {
        Status::Success => Ok(true),
        Status::NotFound | Status::CmpFail => Ok(false),
        _ => Err(outcome.error()),
    }
}

/// SUCCESS carries the row; NOTFOUND is `None`
pub(crate) fn encode_record(outcome: Outcome) -> Result<Option<Record>> {
    match (outcome.status, outcome.payload) {
        (Status::Success, Some(Payload::Record(record))) => Ok(Some(record)),
        (Status::Success, _) => Err(ClientError::new(Status::Internal).with_message("get completed without a row")),
        (Status::NotFound, _) => Ok(None),
        (status, _) => Err(Outcome {
            status,
            payload: None,
            message: outcome.message,
        }
        .error()),
    }
}

pub(crate) fn encode_count(outcome: Outcome) -> Result<u64> {
    match (outcome.status, &outcome.payload) {
        (Status::Success, Some(Payload::Count(n))) => Ok(*n),
        (Status::Success, _) => Err(ClientError::new(Status::Internal).with_message("count completed without a total")),
        _ => Err(outcome.error()),
    }
}

pub(crate) fn encode_description(outcome: Outcome) -> Result<String> {
    match (outcome.status, outcome.payload) {
        (Status::Success, Some(Payload::Description(text))) => Ok(text),
        (Status::Success, _) => Err(ClientError::new(Status::Internal).with_message("describe completed without text")),
        (status, _) => Err(Outcome {
            status,
            payload: None,
            message: outcome.message,
        }
        .error()),
    }
}

struct DeferredState {
    finished: bool,
    status: Status,
    payload: Option<Payload>,
    message: Option<String>,
}

/// Table entry for a single-result request
pub(crate) struct DeferredOp {
    id: RequestId,
    state: Mutex<DeferredState>,
}

impl DeferredOp {
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            state: Mutex::new(DeferredState {
                finished: false,
                status: Status::Garbage,
                payload: None,
                message: None,
            }),
        }
    }

    fn take_outcome(&self) -> Outcome {
        let mut state = self.state.lock();
        Outcome {
            status: state.status,
            payload: state.payload.take(),
            message: state.message.take(),
        }
    }
}

impl PendingOperation for DeferredOp {
    fn request_id(&self) -> RequestId {
        self.id
    }

    fn callback(&self, completion: Completion, table: &OperationTable) {
        let mut state = self.state.lock();
        if state.finished {
            warn!(request_id = %self.id, status = %completion.status, "extra completion for finished operation");
            return;
        }

        state.status = completion.status;
        state.payload = completion.payload;
        state.message = completion.message;
        state.finished = true;
        table.remove(self.id);

        debug!(request_id = %self.id, status = %state.status, "operation completed");
    }

    fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    fn abandon(&self, table: &OperationTable) {
        let state = self.state.lock();
        if !state.finished && table.remove(self.id).is_some() {
            debug!(request_id = %self.id, "abandoned unfinished operation");
        }
    }
}

/// Handle for a request that resolves to exactly one `T`.
///
/// Dropping an unfinished handle deregisters its request; a completion that
/// arrives afterwards is discarded.
#[must_use = "a deferred does nothing unless waited on"]
pub struct Deferred<T> {
    shared: Arc<Shared>,
    op: Arc<DeferredOp>,
    encode: Encoder<T>,
}

impl<T> Deferred<T> {
    pub(crate) fn new(shared: Arc<Shared>, op: Arc<DeferredOp>, encode: Encoder<T>) -> Self {
        Self { shared, op, encode }
    }

    pub fn request_id(&self) -> RequestId {
        self.op.id
    }

    /// True once the completion has been dispatched
    pub fn is_ready(&self) -> bool {
        self.op.is_finished()
    }

    /// Block until the request completes and decode its outcome.
    ///
    /// Pumping may dispatch completions for other operations. A loop failure
    /// (for example TIMEOUT from a bounded pump) is returned as an error and
    /// the request is abandoned.
    pub fn wait(self) -> Result<T> {
        let op = &self.op;
        self.shared.pump_until(|| op.is_finished())?;
        (self.encode)(self.op.take_outcome())
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// `wait` on tokio's blocking pool
    pub async fn wait_async(self) -> Result<T> {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .map_err(|e| ClientError::new(Status::Exception).with_message(e.to_string()))?
    }
}

impl<T> Drop for Deferred<T> {
    fn drop(&mut self) {
        self.op.abandon(&self.shared.table);
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("request_id", &self.op.id)
            .field("ready", &self.is_ready())
            .finish()
    }
}
