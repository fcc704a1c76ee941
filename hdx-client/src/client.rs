/// HDX client
///
/// One `Client` multiplexes any number of outstanding requests over a single
/// engine. Every operation comes in two forms: `async_<op>` submits and
/// returns a handle, `<op>` submits and waits.
use crate::config::ClientConfig;
use crate::deferred::{
    encode_bool, encode_count, encode_description, encode_record, Deferred, DeferredOp, Encoder,
};
use crate::engine::{Completion, Engine, RequestId};
use crate::operation::PendingOperation;
use crate::request::{MapWriteKind, Request, SortOrder, WriteKind};
use crate::search::{Search, SearchOp};
use crate::table::OperationTable;
use hdx_core::{Attribute, ClientError, MapAttribute, Predicate, Record, Result, Status, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by a client and every handle it hands out.
///
/// Lock order: engine, then an operation's state, then the table.
pub(crate) struct Shared {
    pub(crate) engine: Mutex<Box<dyn Engine>>,
    pub(crate) table: OperationTable,
    pub(crate) config: ClientConfig,
}

impl Shared {
    /// Pump the engine until `done` holds.
    ///
    /// `done` is re-checked under the engine lock so a waiter never pumps
    /// after another thread already dispatched its completion.
    pub(crate) fn pump_until(&self, done: impl Fn() -> bool) -> Result<()> {
        loop {
            if done() {
                return Ok(());
            }
            let mut engine = self.engine.lock();
            if done() {
                return Ok(());
            }
            self.pump_locked(&mut **engine)?;
        }
    }

    /// Pump one completion and dispatch it; the engine lock is held
    fn pump_locked(&self, engine: &mut dyn Engine) -> Result<RequestId> {
        match engine.pump(self.config.loop_timeout) {
            Ok(mut completion) => {
                if completion.status.is_error() && completion.message.is_none() {
                    completion.message = engine.error_message();
                }
                let id = completion.request_id;
                self.dispatch(completion);
                Ok(id)
            }
            Err(status) => {
                let err = ClientError::new(status);
                Err(match engine.error_message() {
                    Some(msg) => err.with_message(msg),
                    None => err,
                })
            }
        }
    }

    fn dispatch(&self, completion: Completion) {
        match self.table.get(completion.request_id) {
            Some(op) => op.callback(completion, &self.table),
            None => warn!(
                request_id = %completion.request_id,
                status = %completion.status,
                "discarding completion for unknown request"
            ),
        }
    }
}

/// Generates `async_<op>`, `<op>`, `async_cond_<op>` and `cond_<op>` for
/// writes over plain attributes.
macro_rules! keyed_writes {
    ($($kind:ident => $async_name:ident, $name:ident, $async_cond:ident, $cond:ident;)*) => {
        $(
            pub fn $async_name(
                &self,
                space: &str,
                key: impl Into<Value>,
                attributes: Vec<Attribute>,
            ) -> Result<Deferred<bool>> {
                self.async_write(space, key.into(), WriteKind::$kind, Vec::new(), attributes)
            }

            pub fn $name(
                &self,
                space: &str,
                key: impl Into<Value>,
                attributes: Vec<Attribute>,
            ) -> Result<bool> {
                self.$async_name(space, key, attributes)?.wait()
            }

            pub fn $async_cond(
                &self,
                space: &str,
                key: impl Into<Value>,
                checks: Vec<Predicate>,
                attributes: Vec<Attribute>,
            ) -> Result<Deferred<bool>> {
                self.async_write(space, key.into(), WriteKind::$kind, checks, attributes)
            }

            pub fn $cond(
                &self,
                space: &str,
                key: impl Into<Value>,
                checks: Vec<Predicate>,
                attributes: Vec<Attribute>,
            ) -> Result<bool> {
                self.$async_cond(space, key, checks, attributes)?.wait()
            }
        )*
    };
}

/// Same as `keyed_writes` for writes addressed to individual map entries
macro_rules! map_writes {
    ($($kind:ident => $async_name:ident, $name:ident, $async_cond:ident, $cond:ident;)*) => {
        $(
            pub fn $async_name(
                &self,
                space: &str,
                key: impl Into<Value>,
                entries: Vec<MapAttribute>,
            ) -> Result<Deferred<bool>> {
                self.async_map_write(space, key.into(), MapWriteKind::$kind, Vec::new(), entries)
            }

            pub fn $name(
                &self,
                space: &str,
                key: impl Into<Value>,
                entries: Vec<MapAttribute>,
            ) -> Result<bool> {
                self.$async_name(space, key, entries)?.wait()
            }

            pub fn $async_cond(
                &self,
                space: &str,
                key: impl Into<Value>,
                checks: Vec<Predicate>,
                entries: Vec<MapAttribute>,
            ) -> Result<Deferred<bool>> {
                self.async_map_write(space, key.into(), MapWriteKind::$kind, checks, entries)
            }

            pub fn $cond(
                &self,
                space: &str,
                key: impl Into<Value>,
                checks: Vec<Predicate>,
                entries: Vec<MapAttribute>,
            ) -> Result<bool> {
                self.$async_cond(space, key, checks, entries)?.wait()
            }
        )*
    };
}

/// Handle to one engine. Clones share the engine and the operation table.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a client with the default configuration
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::from_parts(Box::new(engine), ClientConfig::default())
    }

    /// Create a client with a custom configuration
    pub fn with_config(engine: impl Engine + 'static, config: ClientConfig) -> Result<Self> {
        config.validate().map_err(|e| {
            ClientError::new(Status::Internal).with_message(format!("invalid client config: {}", e))
        })?;
        Ok(Self::from_parts(Box::new(engine), config))
    }

    fn from_parts(engine: Box<dyn Engine>, config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                table: OperationTable::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Number of requests still waiting for a terminal completion
    pub fn outstanding(&self) -> usize {
        self.shared.table.len()
    }

    /// Ids of requests still waiting for a terminal completion
    pub fn outstanding_ids(&self) -> Vec<RequestId> {
        self.shared.table.ids()
    }

    /// Pump exactly one completion from the engine and dispatch it.
    ///
    /// Returns the id the completion belonged to, whether or not a handle
    /// was still waiting for it.
    pub fn loop_once(&self) -> Result<RequestId> {
        let mut engine = self.shared.engine.lock();
        self.shared.pump_locked(&mut **engine)
    }

    /// Submit `request` and register the operation built for its id.
    ///
    /// The engine lock is held across submit and register so no completion
    /// can be pumped for an id that is not yet in the table.
    fn register<O>(&self, request: &Request, make: impl FnOnce(RequestId) -> O) -> Result<Arc<O>>
    where
        O: PendingOperation + 'static,
    {
        let mut engine = self.shared.engine.lock();
        let raw = engine.submit(request);
        let message = if raw.is_rejected() {
            engine.error_message()
        } else {
            None
        };

        let id = match raw.into_result(request, message) {
            Ok(id) => id,
            Err(e) => {
                debug!(
                    op = request.name(),
                    space = request.space(),
                    status = %e.status(),
                    attribute = ?e.attribute(),
                    "submission rejected"
                );
                return Err(e);
            }
        };

        let op = Arc::new(make(id));
        if !self.shared.table.insert(op.clone()) {
            return Err(ClientError::new(Status::Internal)
                .with_message(format!("request id {} is already outstanding", id)));
        }
        drop(engine);

        debug!(request_id = %id, op = request.name(), space = request.space(), "submitted");
        Ok(op)
    }

    fn deferred<T>(&self, request: Request, encode: Encoder<T>) -> Result<Deferred<T>> {
        let op = self.register(&request, DeferredOp::new)?;
        Ok(Deferred::new(self.shared.clone(), op, encode))
    }

    fn streaming(&self, request: Request) -> Result<Search> {
        let capacity = self.shared.config.backlog_capacity;
        let op = self.register(&request, |id| SearchOp::new(id, capacity))?;
        Ok(Search::new(
            self.shared.clone(),
            op,
            self.shared.config.backlog_order,
        ))
    }

    fn async_write(
        &self,
        space: &str,
        key: Value,
        kind: WriteKind,
        checks: Vec<Predicate>,
        attributes: Vec<Attribute>,
    ) -> Result<Deferred<bool>> {
        self.deferred(
            Request::Write {
                space: space.to_string(),
                key,
                kind,
                checks,
                attributes,
            },
            encode_bool,
        )
    }

    fn async_map_write(
        &self,
        space: &str,
        key: Value,
        kind: MapWriteKind,
        checks: Vec<Predicate>,
        entries: Vec<MapAttribute>,
    ) -> Result<Deferred<bool>> {
        self.deferred(
            Request::MapWrite {
                space: space.to_string(),
                key,
                kind,
                checks,
                entries,
            },
            encode_bool,
        )
    }

    // Reads

    /// Fetch every attribute of an object; `None` if the key is absent
    pub fn async_get(&self, space: &str, key: impl Into<Value>) -> Result<Deferred<Option<Record>>> {
        self.deferred(
            Request::Get {
                space: space.to_string(),
                key: key.into(),
            },
            encode_record,
        )
    }

    pub fn get(&self, space: &str, key: impl Into<Value>) -> Result<Option<Record>> {
        self.async_get(space, key)?.wait()
    }

    /// Fetch only the named attributes
    pub fn async_get_partial<I, S>(
        &self,
        space: &str,
        key: impl Into<Value>,
        names: I,
    ) -> Result<Deferred<Option<Record>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deferred(
            Request::GetPartial {
                space: space.to_string(),
                key: key.into(),
                names: names.into_iter().map(Into::into).collect(),
            },
            encode_record,
        )
    }

    pub fn get_partial<I, S>(&self, space: &str, key: impl Into<Value>, names: I) -> Result<Option<Record>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.async_get_partial(space, key, names)?.wait()
    }

    // Writes

    keyed_writes! {
        Put => async_put, put, async_cond_put, cond_put;
        AtomicAdd => async_atomic_add, atomic_add, async_cond_atomic_add, cond_atomic_add;
        AtomicSub => async_atomic_sub, atomic_sub, async_cond_atomic_sub, cond_atomic_sub;
        AtomicMul => async_atomic_mul, atomic_mul, async_cond_atomic_mul, cond_atomic_mul;
        AtomicDiv => async_atomic_div, atomic_div, async_cond_atomic_div, cond_atomic_div;
        AtomicMod => async_atomic_mod, atomic_mod, async_cond_atomic_mod, cond_atomic_mod;
        AtomicAnd => async_atomic_and, atomic_and, async_cond_atomic_and, cond_atomic_and;
        AtomicOr => async_atomic_or, atomic_or, async_cond_atomic_or, cond_atomic_or;
        AtomicXor => async_atomic_xor, atomic_xor, async_cond_atomic_xor, cond_atomic_xor;
        StringPrepend => async_string_prepend, string_prepend, async_cond_string_prepend, cond_string_prepend;
        StringAppend => async_string_append, string_append, async_cond_string_append, cond_string_append;
        ListLpush => async_list_lpush, list_lpush, async_cond_list_lpush, cond_list_lpush;
        ListRpush => async_list_rpush, list_rpush, async_cond_list_rpush, cond_list_rpush;
        SetAdd => async_set_add, set_add, async_cond_set_add, cond_set_add;
        SetRemove => async_set_remove, set_remove, async_cond_set_remove, cond_set_remove;
        SetIntersect => async_set_intersect, set_intersect, async_cond_set_intersect, cond_set_intersect;
        SetUnion => async_set_union, set_union, async_cond_set_union, cond_set_union;
        MapRemove => async_map_remove, map_remove, async_cond_map_remove, cond_map_remove;
    }

    map_writes! {
        Add => async_map_add, map_add, async_cond_map_add, cond_map_add;
        AtomicAdd => async_map_atomic_add, map_atomic_add, async_cond_map_atomic_add, cond_map_atomic_add;
        AtomicSub => async_map_atomic_sub, map_atomic_sub, async_cond_map_atomic_sub, cond_map_atomic_sub;
        AtomicMul => async_map_atomic_mul, map_atomic_mul, async_cond_map_atomic_mul, cond_map_atomic_mul;
        AtomicDiv => async_map_atomic_div, map_atomic_div, async_cond_map_atomic_div, cond_map_atomic_div;
        AtomicMod => async_map_atomic_mod, map_atomic_mod, async_cond_map_atomic_mod, cond_map_atomic_mod;
        AtomicAnd => async_map_atomic_and, map_atomic_and, async_cond_map_atomic_and, cond_map_atomic_and;
        AtomicOr => async_map_atomic_or, map_atomic_or, async_cond_map_atomic_or, cond_map_atomic_or;
        AtomicXor => async_map_atomic_xor, map_atomic_xor, async_cond_map_atomic_xor, cond_map_atomic_xor;
        StringPrepend => async_map_string_prepend, map_string_prepend, async_cond_map_string_prepend, cond_map_string_prepend;
        StringAppend => async_map_string_append, map_string_append, async_cond_map_string_append, cond_map_string_append;
    }

    /// Create the object only if the key is absent; `false` if it exists
    pub fn async_put_if_not_exist(
        &self,
        space: &str,
        key: impl Into<Value>,
        attributes: Vec<Attribute>,
    ) -> Result<Deferred<bool>> {
        self.async_write(space, key.into(), WriteKind::PutIfNotExist, Vec::new(), attributes)
    }

    pub fn put_if_not_exist(
        &self,
        space: &str,
        key: impl Into<Value>,
        attributes: Vec<Attribute>,
    ) -> Result<bool> {
        self.async_put_if_not_exist(space, key, attributes)?.wait()
    }

    /// Delete an object; `false` if the key is absent
    pub fn async_del(&self, space: &str, key: impl Into<Value>) -> Result<Deferred<bool>> {
        self.async_cond_del(space, key, Vec::new())
    }

    pub fn del(&self, space: &str, key: impl Into<Value>) -> Result<bool> {
        self.async_del(space, key)?.wait()
    }

    pub fn async_cond_del(
        &self,
        space: &str,
        key: impl Into<Value>,
        checks: Vec<Predicate>,
    ) -> Result<Deferred<bool>> {
        self.deferred(
            Request::Delete {
                space: space.to_string(),
                key: key.into(),
                checks,
            },
            encode_bool,
        )
    }

    pub fn cond_del(&self, space: &str, key: impl Into<Value>, checks: Vec<Predicate>) -> Result<bool> {
        self.async_cond_del(space, key, checks)?.wait()
    }

    // Searches

    /// Stream every object matching `checks`
    pub fn search(&self, space: &str, checks: Vec<Predicate>) -> Result<Search> {
        self.streaming(Request::Search {
            space: space.to_string(),
            checks,
        })
    }

    /// Stream at most `limit` matching objects ordered by `sort_by`
    pub fn sorted_search(
        &self,
        space: &str,
        checks: Vec<Predicate>,
        sort_by: &str,
        limit: u64,
        order: SortOrder,
    ) -> Result<Search> {
        self.streaming(Request::SortedSearch {
            space: space.to_string(),
            checks,
            sort_by: sort_by.to_string(),
            limit,
            order,
        })
    }

    /// Describe how a search would execute
    pub fn async_search_describe(&self, space: &str, checks: Vec<Predicate>) -> Result<Deferred<String>> {
        self.deferred(
            Request::SearchDescribe {
                space: space.to_string(),
                checks,
            },
            encode_description,
        )
    }

    pub fn search_describe(&self, space: &str, checks: Vec<Predicate>) -> Result<String> {
        self.async_search_describe(space, checks)?.wait()
    }

    /// Delete every object matching `checks`
    pub fn async_group_del(&self, space: &str, checks: Vec<Predicate>) -> Result<Deferred<bool>> {
        self.deferred(
            Request::GroupDelete {
                space: space.to_string(),
                checks,
            },
            encode_bool,
        )
    }

    pub fn group_del(&self, space: &str, checks: Vec<Predicate>) -> Result<bool> {
        self.async_group_del(space, checks)?.wait()
    }

    /// Count objects matching `checks`
    pub fn async_count(&self, space: &str, checks: Vec<Predicate>) -> Result<Deferred<u64>> {
        self.deferred(
            Request::Count {
                space: space.to_string(),
                checks,
            },
            encode_count,
        )
    }

    pub fn count(&self, space: &str, checks: Vec<Predicate>) -> Result<u64> {
        self.async_count(space, checks)?.wait()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.shared.config)
            .field("table", &self.shared.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacklogOrder;
    use crate::engine::{Payload, RawSubmission};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Engine that accepts everything and replays queued events
    #[derive(Default)]
    struct Replay {
        next_id: i64,
        events: Arc<Mutex<VecDeque<std::result::Result<Completion, Status>>>>,
        reject: Option<(i64, Status)>,
    }

    impl Engine for Replay {
        fn submit(&mut self, _request: &Request) -> RawSubmission {
            if let Some((id, status)) = self.reject.take() {
                return RawSubmission::rejected(id, status);
            }
            let id = self.next_id;
            self.next_id += 1;
            RawSubmission::accepted(id)
        }

        fn pump(&mut self, _timeout: Option<Duration>) -> std::result::Result<Completion, Status> {
            self.events.lock().pop_front().unwrap_or(Err(Status::NonePending))
        }

        fn error_message(&self) -> Option<String> {
            Some("replay".to_string())
        }
    }

    fn id(raw: i64) -> RequestId {
        RequestId::new(raw).unwrap()
    }

    fn row(req: i64, v: i64) -> std::result::Result<Completion, Status> {
        let mut record = Record::new();
        record.insert("v".into(), v.into());
        Ok(Completion::new(id(req), Status::Success).with_payload(Payload::Record(record)))
    }

    fn replay() -> (Client, Arc<Mutex<VecDeque<std::result::Result<Completion, Status>>>>) {
        let engine = Replay::default();
        let events = engine.events.clone();
        (Client::new(engine), events)
    }

    #[test]
    fn test_put_registers_until_completion() {
        let (client, events) = replay();
        let d = client.async_put("kv", "k", vec![Attribute::new("v", "v1")]).unwrap();
        assert_eq!(client.outstanding(), 1);

        events.lock().push_back(Ok(Completion::new(id(0), Status::Success)));
        assert!(d.wait().unwrap());
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn test_waiting_on_one_completes_another() {
        let (client, events) = replay();
        let a = client.async_del("kv", "a").unwrap();
        let b = client.async_del("kv", "b").unwrap();

        events.lock().push_back(Ok(Completion::new(id(1), Status::NotFound)));
        events.lock().push_back(Ok(Completion::new(id(0), Status::Success)));

        assert!(a.wait().unwrap());
        assert!(b.is_ready());
        assert!(!b.wait().unwrap());
    }

    #[test]
    fn test_rejection_is_never_registered() {
        let mut engine = Replay::default();
        engine.reject = Some((-3, Status::UnknownAttr));
        let client = Client::new(engine);

        let attrs = vec![Attribute::new("v", "x"), Attribute::new("bogus", "y")];
        let err = client.async_put("kv", "k", attrs).unwrap_err();
        assert_eq!(err.status(), Status::UnknownAttr);
        assert_eq!(err.attribute(), Some("bogus"));
        assert_eq!(err.message(), Some("replay"));
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn test_drop_deregisters() {
        let (client, events) = replay();
        let d = client.async_get("kv", "k").unwrap();
        assert_eq!(client.outstanding(), 1);
        drop(d);
        assert_eq!(client.outstanding(), 0);

        // late completion is discarded
        events.lock().push_back(Ok(Completion::new(id(0), Status::Success)));
        assert_eq!(client.loop_once().unwrap(), id(0));
    }

    #[test]
    fn test_loop_failure_surfaces() {
        let (client, events) = replay();
        let d = client.async_count("kv", vec![]).unwrap();
        events.lock().push_back(Err(Status::Timeout));

        let err = d.wait().unwrap_err();
        assert_eq!(err.status(), Status::Timeout);
        assert!(err.is_retryable());
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn test_search_streams_rows_fifo() {
        let (client, events) = replay();
        let mut search = client.search("kv", vec![]).unwrap();
        events.lock().extend([row(0, 1), row(0, 2), Ok(Completion::new(id(0), Status::SearchDone))]);

        assert!(search.has_next().unwrap());
        let rows: Vec<i64> = search
            .by_ref()
            .map(|r| r.unwrap()["v"].as_int().unwrap())
            .collect();
        assert_eq!(rows, vec![1, 2]);
        assert!(!search.has_next().unwrap());
        assert!(search.next().is_none());
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn test_search_lifo_order() {
        let engine = Replay::default();
        let events = engine.events.clone();
        let config = ClientConfig::new().with_backlog_order(BacklogOrder::Lifo);
        let client = Client::with_config(engine, config).unwrap();

        let search = client.search("kv", vec![]).unwrap();
        let later = client.async_put("kv", "k", vec![]).unwrap();
        events.lock().extend([
            row(0, 1),
            row(0, 2),
            row(0, 3),
            Ok(Completion::new(id(1), Status::Success)),
            Ok(Completion::new(id(0), Status::SearchDone)),
        ]);
        // buffer all three rows before draining
        assert!(later.wait().unwrap());

        let rows: Vec<i64> = search.map(|r| r.unwrap()["v"].as_int().unwrap()).collect();
        assert_eq!(rows, vec![3, 2, 1]);
    }

    #[test]
    fn test_search_timeout_keeps_stream() {
        let (client, events) = replay();
        let mut search = client.search("kv", vec![]).unwrap();
        events.lock().extend([Err(Status::Timeout), row(0, 9), Ok(Completion::new(id(0), Status::SearchDone))]);

        assert_eq!(search.has_next().unwrap_err().status(), Status::Timeout);
        assert!(search.has_next().unwrap());
        assert_eq!(search.next().unwrap().unwrap()["v"], Value::from(9i64));
        assert!(search.next().is_none());
    }

    #[test]
    fn test_search_fatal_loop_failure_fuses() {
        let (client, events) = replay();
        let mut search = client.search("kv", vec![]).unwrap();
        events.lock().push_back(Err(Status::PollFailed));

        assert_eq!(search.next().unwrap().unwrap_err().status(), Status::PollFailed);
        assert!(search.is_finished());
        assert!(search.next().is_none());
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClientConfig::new().with_backlog_capacity(0);
        assert!(Client::with_config(Replay::default(), config).is_err());
    }
}
