use crate::engine::{Completion, RequestId};
use crate::table::OperationTable;

/// An outstanding request awaiting completions.
///
/// Implementations own their status, finished flag and any buffered
/// results behind their own lock. `callback` runs once per completion for
/// this request id; on a terminal completion it removes the operation from
/// `table`.
pub trait PendingOperation: Send + Sync {
    fn request_id(&self) -> RequestId;

    fn callback(&self, completion: Completion, table: &OperationTable);

    fn is_finished(&self) -> bool;

    /// Deregister an unfinished operation whose handle went away
    fn abandon(&self, table: &OperationTable);
}
