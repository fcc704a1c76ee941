/// Streaming search results
///
/// A search completes with zero or more rows followed by one SEARCHDONE.
/// Rows and row-level errors are buffered in a bounded backlog until the
/// caller drains them through the `Search` iterator.

use crate::client::Shared;
use crate::config::BacklogOrder;
use crate::engine::{Completion, Payload, RequestId};
use crate::operation::PendingOperation;
use crate::table::OperationTable;
use hdx_core::{ClientError, Record, Result, Status};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

struct SearchState {
    finished: bool,
    backlog: VecDeque<Result<Record>>,
    overflowed: bool,
    rows: u64,
    dropped: u64,
}

impl SearchState {
    fn push(&mut self, entry: Result<Record>, capacity: usize) {
        if self.overflowed {
            self.dropped += 1;
            return;
        }
        if self.backlog.len() >= capacity {
            self.backlog.push_back(Err(ClientError::new(Status::NoMem)
                .with_message(format!("search backlog exceeded {} entries", capacity))));
            self.overflowed = true;
            self.dropped += 1;
            return;
        }
        self.backlog.push_back(entry);
    }
}

/// Table entry for a streaming request
pub(crate) struct SearchOp {
    id: RequestId,
    capacity: usize,
    state: Mutex<SearchState>,
}

impl SearchOp {
    pub fn new(id: RequestId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            state: Mutex::new(SearchState {
                finished: false,
                backlog: VecDeque::new(),
                overflowed: false,
                rows: 0,
                dropped: 0,
            }),
        }
    }

    fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.finished || !state.backlog.is_empty()
    }

    fn has_buffered(&self) -> bool {
        !self.state.lock().backlog.is_empty()
    }

    fn pop(&self, order: BacklogOrder) -> Option<Result<Record>> {
        let mut state = self.state.lock();
        match order {
            BacklogOrder::Fifo => state.backlog.pop_front(),
            BacklogOrder::Lifo => state.backlog.pop_back(),
        }
    }

    /// Stop the stream after a fatal loop failure; buffered entries stay
    fn fuse(&self, table: &OperationTable) {
        let mut state = self.state.lock();
        if !state.finished {
            state.finished = true;
            table.remove(self.id);
            debug!(request_id = %self.id, "search fused after loop failure");
        }
    }
}

impl PendingOperation for SearchOp {
    fn request_id(&self) -> RequestId {
        self.id
    }

    fn callback(&self, completion: Completion, table: &OperationTable) {
        let mut state = self.state.lock();
        if state.finished {
            warn!(request_id = %self.id, status = %completion.status, "event for finished search");
            return;
        }

        match completion.status {
            Status::SearchDone => {
                state.finished = true;
                table.remove(self.id);
                if state.dropped > 0 {
                    warn!(
                        request_id = %self.id,
                        rows = state.rows,
                        dropped = state.dropped,
                        "search backlog overflowed"
                    );
                }
                debug!(request_id = %self.id, rows = state.rows, "search done");
            }
            Status::Success => {
                state.rows += 1;
                let entry = match completion.payload {
                    Some(Payload::Record(record)) => Ok(record),
                    _ => Err(ClientError::new(Status::Internal).with_message("search row without attributes")),
                };
                state.push(entry, self.capacity);
            }
            _ => {
                let err = completion.to_error();
                state.push(Err(err), self.capacity);
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    fn abandon(&self, table: &OperationTable) {
        let state = self.state.lock();
        if !state.finished && table.remove(self.id).is_some() {
            debug!(request_id = %self.id, "abandoned unfinished search");
        }
    }
}

/// Pull-based handle over a streaming search.
///
/// Yields `Ok(row)` for each result and `Err` for row-level failures, then
/// `None` once SEARCHDONE has arrived and the backlog is drained. Dropping
/// the handle early deregisters the search.
#[must_use = "a search does nothing unless iterated"]
pub struct Search {
    shared: Arc<Shared>,
    op: Arc<SearchOp>,
    order: BacklogOrder,
}

impl Search {
    pub(crate) fn new(shared: Arc<Shared>, op: Arc<SearchOp>, order: BacklogOrder) -> Self {
        Self { shared, op, order }
    }

    pub fn request_id(&self) -> RequestId {
        self.op.id
    }

    /// True once SEARCHDONE has been dispatched (entries may remain buffered)
    pub fn is_finished(&self) -> bool {
        self.op.is_finished()
    }

    /// Entries currently buffered
    pub fn buffered(&self) -> usize {
        self.op.state.lock().backlog.len()
    }

    /// Block until an entry is buffered or the search is finished.
    ///
    /// TIMEOUT and INTERRUPTED from the loop are returned and the search
    /// stays usable. Any other loop failure fuses the search.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.op.has_buffered() {
            return Ok(true);
        }
        self.fill()?;
        Ok(self.op.has_buffered())
    }

    /// Drain every row, stopping at the first error
    pub fn collect_rows(self) -> Result<Vec<Record>> {
        self.collect()
    }

    fn fill(&self) -> Result<()> {
        let op = &self.op;
        match self.shared.pump_until(|| op.is_ready()) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.status(), Status::Timeout | Status::Interrupted) => Err(e),
            Err(e) => {
                self.op.fuse(&self.shared.table);
                Err(e)
            }
        }
    }
}

impl Iterator for Search {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            return Some(Err(e));
        }
        self.op.pop(self.order)
    }
}

impl Drop for Search {
    fn drop(&mut self) {
        self.op.abandon(&self.shared.table);
    }
}

impl std::fmt::Debug for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("request_id", &self.op.id)
            .field("order", &self.order)
            .field("buffered", &self.buffered())
            .field("finished", &self.is_finished())
            .finish()
    }
}
