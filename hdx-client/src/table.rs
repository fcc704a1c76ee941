/// Operation table
///
/// Maps request ids to the operations waiting on them. An id is present
/// from successful submission until its terminal completion, or until its
/// handle is dropped.

use crate::engine::RequestId;
use crate::operation::PendingOperation;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct OperationTable {
    ops: Mutex<HashMap<RequestId, Arc<dyn PendingOperation>>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under its request id.
    ///
    /// Returns false, leaving the table unchanged, if the id is already taken.
    pub fn insert(&self, op: Arc<dyn PendingOperation>) -> bool {
        let mut ops = self.ops.lock();
        let id = op.request_id();
        if ops.contains_key(&id) {
            return false;
        }
        ops.insert(id, op);
        true
    }

    /// Look up an operation; the table lock is released before returning
    pub fn get(&self, id: RequestId) -> Option<Arc<dyn PendingOperation>> {
        self.ops.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: RequestId) -> Option<Arc<dyn PendingOperation>> {
        self.ops.lock().remove(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.ops.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Outstanding ids in ascending order
    pub fn ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self.ops.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTable")
            .field("outstanding", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Completion;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        id: RequestId,
        calls: AtomicUsize,
    }

    impl PendingOperation for Counting {
        fn request_id(&self) -> RequestId {
            self.id
        }

        fn callback(&self, _completion: Completion, table: &OperationTable) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            table.remove(self.id);
        }

        fn is_finished(&self) -> bool {
            self.calls.load(Ordering::SeqCst) > 0
        }

        fn abandon(&self, table: &OperationTable) {
            table.remove(self.id);
        }
    }

    fn op(raw: i64) -> Arc<Counting> {
        Arc::new(Counting {
            id: RequestId::new(raw).unwrap(),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_insert_and_lookup() {
        let table = OperationTable::new();
        assert!(table.is_empty());

        let a = op(1);
        assert!(table.insert(a.clone()));
        assert!(table.contains(a.id));
        assert_eq!(table.len(), 1);
        assert!(table.get(a.id).is_some());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let table = OperationTable::new();
        assert!(table.insert(op(5)));
        assert!(!table.insert(op(5)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_callback_removes_itself() {
        let table = OperationTable::new();
        let a = op(2);
        table.insert(a.clone());

        let found = table.get(a.id).unwrap();
        found.callback(Completion::new(a.id, hdx_core::Status::Success), &table);

        assert!(a.is_finished());
        assert!(!table.contains(a.id));
        assert!(table.get(a.id).is_none());
    }

    #[test]
    fn test_ids_sorted() {
        let table = OperationTable::new();
        table.insert(op(9));
        table.insert(op(3));
        table.insert(op(6));
        let ids: Vec<i64> = table.ids().into_iter().map(RequestId::get).collect();
        assert_eq!(ids, vec![3, 6, 9]);
    }
}
