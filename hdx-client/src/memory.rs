/// In-memory engine
///
/// Executes requests against local space schemas and object maps. Submission
/// validates the request the way a native client library does before
/// touching the network: bad requests are rejected with a negative id that
/// points at the offending entry. Accepted requests are executed immediately
/// and their completions queued; `pump` hands them out in submission order.

use crate::engine::{Completion, Engine, Payload, RawSubmission, RequestId};
use crate::request::{MapWriteKind, Request, SortOrder, WriteKind};
use hdx_core::{Attribute, Datatype, MapAttribute, Predicate, Record, SpaceSchema, Status, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Local rejection of a submission
#[derive(Debug)]
struct Rejection {
    status: Status,
    position: Option<usize>,
    message: String,
}

impl Rejection {
    fn at(status: Status, position: usize, message: impl Into<String>) -> Self {
        Self {
            status,
            position: Some(position),
            message: message.into(),
        }
    }

    fn unattributed(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            position: None,
            message: message.into(),
        }
    }
}

/// One completion produced by executing a request
#[derive(Debug)]
struct Event {
    status: Status,
    payload: Option<Payload>,
    message: Option<String>,
}

impl Event {
    fn status(status: Status) -> Self {
        Self {
            status,
            payload: None,
            message: None,
        }
    }

    fn with(payload: Payload) -> Self {
        Self {
            status: Status::Success,
            payload: Some(payload),
            message: None,
        }
    }

    fn failed(status: Status, message: String) -> Self {
        Self {
            status,
            payload: None,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
}

impl Arith {
    fn from_write(kind: WriteKind) -> Option<Arith> {
        Some(match kind {
            WriteKind::AtomicAdd => Arith::Add,
            WriteKind::AtomicSub => Arith::Sub,
            WriteKind::AtomicMul => Arith::Mul,
            WriteKind::AtomicDiv => Arith::Div,
            WriteKind::AtomicMod => Arith::Mod,
            WriteKind::AtomicAnd => Arith::And,
            WriteKind::AtomicOr => Arith::Or,
            WriteKind::AtomicXor => Arith::Xor,
            _ => return None,
        })
    }

    fn from_map_write(kind: MapWriteKind) -> Option<Arith> {
        Some(match kind {
            MapWriteKind::AtomicAdd => Arith::Add,
            MapWriteKind::AtomicSub => Arith::Sub,
            MapWriteKind::AtomicMul => Arith::Mul,
            MapWriteKind::AtomicDiv => Arith::Div,
            MapWriteKind::AtomicMod => Arith::Mod,
            MapWriteKind::AtomicAnd => Arith::And,
            MapWriteKind::AtomicOr => Arith::Or,
            MapWriteKind::AtomicXor => Arith::Xor,
            _ => return None,
        })
    }

    /// Float operands support add, sub, mul and div only
    fn accepts(self, datatype: &Datatype) -> bool {
        match self {
            Arith::Add | Arith::Sub | Arith::Mul | Arith::Div => {
                matches!(datatype, Datatype::Int64 | Datatype::Float)
            }
            _ => *datatype == Datatype::Int64,
        }
    }

    fn apply(self, current: &Value, operand: &Value) -> Result<Value, Status> {
        match (current, operand) {
            (Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                let result = match self {
                    Arith::Add => a.checked_add(b),
                    Arith::Sub => a.checked_sub(b),
                    Arith::Mul => a.checked_mul(b),
                    Arith::Div => a.checked_div(b),
                    Arith::Mod => a.checked_rem(b),
                    Arith::And => Some(a & b),
                    Arith::Or => Some(a | b),
                    Arith::Xor => Some(a ^ b),
                };
                result.map(Value::Int).ok_or(Status::Overflow)
            }
            (Value::Float(a), Value::Float(b)) => match self {
                Arith::Add => Ok(Value::Float(a + b)),
                Arith::Sub => Ok(Value::Float(a - b)),
                Arith::Mul => Ok(Value::Float(a * b)),
                Arith::Div if *b == 0.0 => Err(Status::Overflow),
                Arith::Div => Ok(Value::Float(a / b)),
                _ => Err(Status::WrongType),
            },
            _ => Err(Status::WrongType),
        }
    }
}

fn concat(current: &Value, operand: &Value, prepend: bool) -> Result<Value, Status> {
    let (Some(cur), Some(op)) = (current.as_bytes(), operand.as_bytes()) else {
        return Err(Status::WrongType);
    };
    let mut out = Vec::with_capacity(cur.len() + op.len());
    if prepend {
        out.extend_from_slice(op);
        out.extend_from_slice(cur);
    } else {
        out.extend_from_slice(cur);
        out.extend_from_slice(op);
    }
    Ok(Value::string(out))
}

fn accepts_write(datatype: &Datatype, kind: WriteKind, value: &Value) -> bool {
    if let Some(op) = Arith::from_write(kind) {
        return op.accepts(datatype) && datatype.matches(value);
    }
    match kind {
        WriteKind::Put | WriteKind::PutIfNotExist => datatype.matches(value),
        WriteKind::StringPrepend | WriteKind::StringAppend => {
            *datatype == Datatype::String && datatype.matches(value)
        }
        WriteKind::ListLpush | WriteKind::ListRpush => match datatype {
            Datatype::List(elem) => elem.matches(value),
            _ => false,
        },
        WriteKind::SetAdd | WriteKind::SetRemove => match datatype {
            Datatype::Set(elem) => elem.matches(value),
            _ => false,
        },
        WriteKind::SetIntersect | WriteKind::SetUnion => {
            matches!(datatype, Datatype::Set(_)) && datatype.matches(value)
        }
        WriteKind::MapRemove => datatype.map_types().is_some_and(|(k, _)| k.matches(value)),
        _ => false,
    }
}

fn accepts_map_write(datatype: &Datatype, kind: MapWriteKind, entry: &MapAttribute) -> bool {
    let Some((key_type, value_type)) = datatype.map_types() else {
        return false;
    };
    if !key_type.matches(&entry.map_key) {
        return false;
    }
    if let Some(op) = Arith::from_map_write(kind) {
        return op.accepts(value_type) && value_type.matches(&entry.value);
    }
    match kind {
        MapWriteKind::StringPrepend | MapWriteKind::StringAppend => {
            *value_type == Datatype::String && value_type.matches(&entry.value)
        }
        _ => value_type.matches(&entry.value),
    }
}

/// Apply one plain-attribute write to a stored value
fn apply_write(current: &mut Value, kind: WriteKind, operand: &Value) -> Result<(), Status> {
    if let Some(op) = Arith::from_write(kind) {
        *current = op.apply(current, operand)?;
        return Ok(());
    }
    match kind {
        WriteKind::Put | WriteKind::PutIfNotExist => {
            *current = operand.clone();
            return Ok(());
        }
        WriteKind::StringPrepend | WriteKind::StringAppend => {
            *current = concat(current, operand, kind == WriteKind::StringPrepend)?;
            return Ok(());
        }
        _ => {}
    }
    match (kind, current) {
        (WriteKind::ListLpush, Value::List(items)) => items.insert(0, operand.clone()),
        (WriteKind::ListRpush, Value::List(items)) => items.push(operand.clone()),
        (WriteKind::SetAdd, Value::Set(items)) => {
            items.insert(operand.clone());
        }
        (WriteKind::SetRemove, Value::Set(items)) => {
            items.remove(operand);
        }
        (WriteKind::SetIntersect, Value::Set(items)) => {
            let other = operand.as_set().ok_or(Status::WrongType)?;
            items.retain(|v| other.contains(v));
        }
        (WriteKind::SetUnion, Value::Set(items)) => {
            let other = operand.as_set().ok_or(Status::WrongType)?;
            items.extend(other.iter().cloned());
        }
        (WriteKind::MapRemove, Value::Map(entries)) => {
            entries.remove(operand);
        }
        _ => return Err(Status::WrongType),
    }
    Ok(())
}

/// Apply one map-entry write to a stored map
fn apply_map_write(
    current: &mut Value,
    kind: MapWriteKind,
    entry: &MapAttribute,
    value_default: Value,
) -> Result<(), Status> {
    let Value::Map(entries) = current else {
        return Err(Status::WrongType);
    };
    let slot = entries
        .entry(entry.map_key.clone())
        .or_insert(value_default);

    if let Some(op) = Arith::from_map_write(kind) {
        *slot = op.apply(slot, &entry.value)?;
        return Ok(());
    }
    match kind {
        MapWriteKind::StringPrepend => *slot = concat(slot, &entry.value, true)?,
        MapWriteKind::StringAppend => *slot = concat(slot, &entry.value, false)?,
        _ => *slot = entry.value.clone(),
    }
    Ok(())
}

#[derive(Debug)]
struct Space {
    schema: SpaceSchema,
    objects: BTreeMap<Value, Record>,
}

impl Space {
    fn new(schema: SpaceSchema) -> Self {
        Self {
            schema,
            objects: BTreeMap::new(),
        }
    }

    /// Object with every attribute at its default
    fn blank(&self) -> Record {
        self.schema
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.datatype.default_value()))
            .collect()
    }

    fn matches(&self, key: &Value, obj: &Record, checks: &[Predicate]) -> bool {
        checks.iter().all(|check| {
            let stored = if self.schema.is_key(&check.attribute) {
                Some(key)
            } else {
                obj.get(&check.attribute)
            };
            stored.is_some_and(|v| check.evaluate(v))
        })
    }

    /// Search row: the object's attributes plus its key
    fn row(&self, key: &Value, obj: &Record) -> Record {
        let mut row = obj.clone();
        row.insert(self.schema.key.name.clone(), key.clone());
        row
    }

    fn get(&self, key: &Value, names: Option<&[String]>) -> Event {
        let Some(obj) = self.objects.get(key) else {
            return Event::status(Status::NotFound);
        };
        let record = match names {
            None => obj.clone(),
            Some(names) => {
                let full = self.row(key, obj);
                names
                    .iter()
                    .filter_map(|n| full.get(n).map(|v| (n.clone(), v.clone())))
                    .collect()
            }
        };
        Event::with(Payload::Record(record))
    }

    /// Start from the stored object, or a blank one for creating writes.
    /// `Err` carries the event to report instead.
    fn prepare(&self, key: &Value, creates: bool, exclusive: bool, checks: &[Predicate]) -> Result<Record, Event> {
        match self.objects.get(key) {
            Some(_) if exclusive => Err(Event::status(Status::CmpFail)),
            Some(obj) if !self.matches(key, obj, checks) => Err(Event::status(Status::CmpFail)),
            Some(obj) => Ok(obj.clone()),
            None if creates && checks.is_empty() => Ok(self.blank()),
            None => Err(Event::status(Status::NotFound)),
        }
    }

    fn write(&mut self, key: &Value, kind: WriteKind, checks: &[Predicate], attributes: &[Attribute]) -> Event {
        let exclusive = kind == WriteKind::PutIfNotExist;
        let mut obj = match self.prepare(key, kind.creates(), exclusive, checks) {
            Ok(obj) => obj,
            Err(event) => return event,
        };

        for attr in attributes {
            let Some(datatype) = self.schema.attribute(&attr.name).map(|a| &a.datatype) else {
                return Event::status(Status::UnknownAttr);
            };
            let current = obj
                .entry(attr.name.clone())
                .or_insert_with(|| datatype.default_value());
            if let Err(status) = apply_write(current, kind, &attr.value) {
                return Event::failed(status, format!("{} failed on attribute \"{}\"", kind.name(), attr.name));
            }
        }

        self.objects.insert(key.clone(), obj);
        Event::status(Status::Success)
    }

    fn map_write(
        &mut self,
        key: &Value,
        kind: MapWriteKind,
        checks: &[Predicate],
        entries: &[MapAttribute],
    ) -> Event {
        let mut obj = match self.prepare(key, false, false, checks) {
            Ok(obj) => obj,
            Err(event) => return event,
        };

        for entry in entries {
            let Some(datatype) = self.schema.attribute(&entry.name).map(|a| &a.datatype) else {
                return Event::status(Status::UnknownAttr);
            };
            let Some((_, value_type)) = datatype.map_types() else {
                return Event::status(Status::WrongType);
            };
            let current = obj
                .entry(entry.name.clone())
                .or_insert_with(|| datatype.default_value());
            if let Err(status) = apply_map_write(current, kind, entry, value_type.default_value()) {
                return Event::failed(status, format!("{} failed on attribute \"{}\"", kind.name(), entry.name));
            }
        }

        self.objects.insert(key.clone(), obj);
        Event::status(Status::Success)
    }

    fn delete(&mut self, key: &Value, checks: &[Predicate]) -> Event {
        match self.objects.get(key) {
            None => Event::status(Status::NotFound),
            Some(obj) if !self.matches(key, obj, checks) => Event::status(Status::CmpFail),
            Some(_) => {
                self.objects.remove(key);
                Event::status(Status::Success)
            }
        }
    }

    fn matching(&self, checks: &[Predicate]) -> Vec<Record> {
        self.objects
            .iter()
            .filter(|(key, obj)| self.matches(key, obj, checks))
            .map(|(key, obj)| self.row(key, obj))
            .collect()
    }

    fn search(&self, checks: &[Predicate], sort: Option<(&str, u64, SortOrder)>) -> Vec<Event> {
        let mut rows = self.matching(checks);

        if let Some((sort_by, limit, order)) = sort {
            rows.sort_by(|a, b| {
                let ord = a.get(sort_by).cmp(&b.get(sort_by));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        let mut events: Vec<Event> = rows.into_iter().map(|r| Event::with(Payload::Record(r))).collect();
        events.push(Event::status(Status::SearchDone));
        events
    }

    fn group_delete(&mut self, checks: &[Predicate]) -> usize {
        let doomed: Vec<Value> = self
            .objects
            .iter()
            .filter(|(key, obj)| self.matches(key, obj, checks))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.objects.remove(key);
        }
        doomed.len()
    }

    fn describe(&self, checks: &[Predicate]) -> String {
        let mut text = format!("space {}\n", self.schema.name);
        for check in checks {
            text.push_str(&format!("check {} {:?} {:?}\n", check.attribute, check.op, check.value));
        }
        text.push_str(&format!(
            "scanned {} objects, {} matched",
            self.objects.len(),
            self.matching(checks).len()
        ));
        text
    }
}

/// Engine that keeps every space in process memory
#[derive(Debug, Default)]
pub struct MemoryEngine {
    spaces: HashMap<String, Space>,
    next_id: i64,
    ready: VecDeque<Completion>,
    last_error: Option<String>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a space, replacing any space of the same name
    pub fn with_space(mut self, schema: SpaceSchema) -> Self {
        self.add_space(schema);
        self
    }

    pub fn add_space(&mut self, schema: SpaceSchema) {
        self.spaces.insert(schema.name.clone(), Space::new(schema));
    }

    /// Completions queued but not yet pumped
    pub fn queued(&self) -> usize {
        self.ready.len()
    }

    /// Objects currently stored in `space`
    pub fn object_count(&self, space: &str) -> Option<usize> {
        self.spaces.get(space).map(|s| s.objects.len())
    }

    fn check_attributes(
        schema: &SpaceSchema,
        kind: WriteKind,
        attributes: &[Attribute],
        offset: usize,
    ) -> Result<(), Rejection> {
        let mut seen = BTreeSet::new();
        for (i, attr) in attributes.iter().enumerate() {
            let pos = offset + i;
            let target = schema.writable(&attr.name).map_err(|status| {
                Rejection::at(status, pos, format!("cannot write attribute \"{}\"", attr.name))
            })?;
            if !seen.insert(attr.name.as_str()) {
                return Err(Rejection::at(Status::DupeAttr, pos, format!("\"{}\" repeated", attr.name)));
            }
            if !accepts_write(&target.datatype, kind, &attr.value) {
                return Err(Rejection::at(
                    Status::WrongType,
                    pos,
                    format!("{} does not apply to attribute \"{}\"", kind.name(), attr.name),
                ));
            }
        }
        Ok(())
    }

    fn check_map_entries(
        schema: &SpaceSchema,
        kind: MapWriteKind,
        entries: &[MapAttribute],
        offset: usize,
    ) -> Result<(), Rejection> {
        let mut seen = BTreeSet::new();
        for (i, entry) in entries.iter().enumerate() {
            let pos = offset + i;
            let target = schema.writable(&entry.name).map_err(|status| {
                Rejection::at(status, pos, format!("cannot write attribute \"{}\"", entry.name))
            })?;
            if !seen.insert((entry.name.as_str(), &entry.map_key)) {
                return Err(Rejection::at(Status::DupeAttr, pos, format!("\"{}\" key repeated", entry.name)));
            }
            if !accepts_map_write(&target.datatype, kind, entry) {
                return Err(Rejection::at(
                    Status::WrongType,
                    pos,
                    format!("{} does not apply to attribute \"{}\"", kind.name(), entry.name),
                ));
            }
        }
        Ok(())
    }

    fn execute(&mut self, request: &Request) -> Result<Vec<Event>, Rejection> {
        let space = self.spaces.get_mut(request.space()).ok_or_else(|| {
            Rejection::unattributed(
                Status::UnknownSpace,
                format!("space \"{}\" does not exist", request.space()),
            )
        })?;

        if let Some(key) = request.key() {
            space.schema.check_key(key).map_err(|status| {
                Rejection::unattributed(status, format!("key \"{}\" has the wrong type", space.schema.key.name))
            })?;
        }

        space
            .schema
            .check_predicates(request.checks())
            .map_err(|(status, idx)| Rejection::at(status, idx, "invalid check"))?;

        let events = match request {
            Request::Get { key, .. } => vec![space.get(key, None)],
            Request::GetPartial { key, names, .. } => {
                for (i, name) in names.iter().enumerate() {
                    space.schema.checkable(name).map_err(|status| {
                        Rejection::at(status, i, format!("cannot read attribute \"{}\"", name))
                    })?;
                }
                vec![space.get(key, Some(names))]
            }
            Request::Write {
                key,
                kind,
                checks,
                attributes,
                ..
            } => {
                Self::check_attributes(&space.schema, *kind, attributes, checks.len())?;
                vec![space.write(key, *kind, checks, attributes)]
            }
            Request::MapWrite {
                key,
                kind,
                checks,
                entries,
                ..
            } => {
                Self::check_map_entries(&space.schema, *kind, entries, checks.len())?;
                vec![space.map_write(key, *kind, checks, entries)]
            }
            Request::Delete { key, checks, .. } => vec![space.delete(key, checks)],
            Request::Search { checks, .. } => space.search(checks, None),
            Request::SortedSearch {
                checks,
                sort_by,
                limit,
                order,
                ..
            } => {
                space.schema.checkable(sort_by).map_err(|status| {
                    Rejection::unattributed(status, format!("cannot sort by \"{}\"", sort_by))
                })?;
                space.search(checks, Some((sort_by.as_str(), *limit, *order)))
            }
            Request::SearchDescribe { checks, .. } => {
                vec![Event::with(Payload::Description(space.describe(checks)))]
            }
            Request::GroupDelete { checks, .. } => {
                let removed = space.group_delete(checks);
                debug!(space = %space.schema.name, removed, "group delete");
                vec![Event::status(Status::Success)]
            }
            Request::Count { checks, .. } => {
                let n = space.matching(checks).len() as u64;
                vec![Event::with(Payload::Count(n))]
            }
        };
        Ok(events)
    }
}

impl Engine for MemoryEngine {
    fn submit(&mut self, request: &Request) -> RawSubmission {
        let events = match self.execute(request) {
            Ok(events) => events,
            Err(rejection) => {
                debug!(
                    op = request.name(),
                    status = %rejection.status,
                    position = ?rejection.position,
                    "rejected locally"
                );
                let raw = request.rejection_id(rejection.position);
                self.last_error = Some(rejection.message);
                return RawSubmission::rejected(raw, rejection.status);
            }
        };

        let Some(id) = RequestId::new(self.next_id) else {
            self.last_error = Some("request ids exhausted".to_string());
            return RawSubmission::rejected(request.rejection_id(None), Status::Internal);
        };
        self.next_id = self.next_id.saturating_add(1);
        self.last_error = None;

        for event in events {
            self.ready.push_back(Completion {
                request_id: id,
                status: event.status,
                payload: event.payload,
                message: event.message,
            });
        }
        RawSubmission::accepted(id.get())
    }

    fn pump(&mut self, _timeout: Option<Duration>) -> Result<Completion, Status> {
        self.ready.pop_front().ok_or(Status::NonePending)
    }

    fn error_message(&self) -> Option<String> {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdx_core::AttributesBuilder;

    fn kv() -> MemoryEngine {
        MemoryEngine::new().with_space(
            SpaceSchema::new("kv", "k", Datatype::String)
                .with_attribute("v", Datatype::String)
                .with_attribute("n", Datatype::Int64)
                .with_attribute("f", Datatype::Float)
                .with_attribute("l", Datatype::list(Datatype::Int64))
                .with_attribute("s", Datatype::set(Datatype::String))
                .with_attribute("m", Datatype::map(Datatype::String, Datatype::Int64)),
        )
    }

    fn write(kind: WriteKind, key: &str, attributes: Vec<Attribute>) -> Request {
        Request::Write {
            space: "kv".into(),
            key: Value::from(key),
            kind,
            checks: vec![],
            attributes,
        }
    }

    fn run(engine: &mut MemoryEngine, request: Request) -> Completion {
        let raw = engine.submit(&request);
        assert!(!raw.is_rejected(), "rejected: {:?} {:?}", raw, engine.error_message());
        engine.pump(None).unwrap()
    }

    fn stored(engine: &mut MemoryEngine, key: &str) -> Record {
        let request = Request::Get {
            space: "kv".into(),
            key: Value::from(key),
        };
        match run(engine, request).payload {
            Some(Payload::Record(r)) => r,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_put_then_get() {
        let mut engine = kv();
        let done = run(&mut engine, write(WriteKind::Put, "a", AttributesBuilder::new().string("v", "x").build()));
        assert_eq!(done.status, Status::Success);

        let row = stored(&mut engine, "a");
        assert_eq!(row["v"], Value::from("x"));
        assert_eq!(row["n"], Value::Int(0));
        assert!(!row.contains_key("k"));
    }

    #[test]
    fn test_unknown_space() {
        let mut engine = kv();
        let request = Request::Get {
            space: "nope".into(),
            key: Value::from("a"),
        };
        let raw = engine.submit(&request);
        assert_eq!(raw.status, Status::UnknownSpace);
        assert_eq!(request.resolver().resolve(raw.id), None);
        assert!(engine.error_message().unwrap().contains("nope"));
    }

    #[test]
    fn test_rejections_point_at_entry() {
        let mut engine = kv();
        let cases = vec![
            (AttributesBuilder::new().string("v", "x").int("n", 1).string("bogus", "y").build(), Status::UnknownAttr, "bogus"),
            (AttributesBuilder::new().string("v", "x").string("v", "y").build(), Status::DupeAttr, "v"),
            (AttributesBuilder::new().int("v", 1).build(), Status::WrongType, "v"),
            (AttributesBuilder::new().string("k", "x").build(), Status::DontUseKey, "k"),
        ];

        for (attrs, status, name) in cases {
            let request = write(WriteKind::Put, "a", attrs);
            let raw = engine.submit(&request);
            assert!(raw.is_rejected());
            assert_eq!(raw.status, status);
            assert_eq!(request.resolver().resolve(raw.id), Some(name));
        }
        assert_eq!(engine.queued(), 0);
    }

    #[test]
    fn test_atomic_ops() {
        let mut engine = kv();
        run(&mut engine, write(WriteKind::Put, "a", AttributesBuilder::new().int("n", 10).build()));
        run(&mut engine, write(WriteKind::AtomicAdd, "a", AttributesBuilder::new().int("n", 5).build()));
        run(&mut engine, write(WriteKind::AtomicMul, "a", AttributesBuilder::new().int("n", 3).build()));
        run(&mut engine, write(WriteKind::AtomicXor, "a", AttributesBuilder::new().int("n", 1).build()));
        assert_eq!(stored(&mut engine, "a")["n"], Value::Int(44));
    }

    #[test]
    fn test_overflow_and_divide_by_zero() {
        let mut engine = kv();
        run(&mut engine, write(WriteKind::Put, "a", AttributesBuilder::new().int("n", i64::MAX).build()));

        let done = run(&mut engine, write(WriteKind::AtomicAdd, "a", AttributesBuilder::new().int("n", 1).build()));
        assert_eq!(done.status, Status::Overflow);
        assert!(done.message.unwrap().contains("\"n\""));

        let done = run(&mut engine, write(WriteKind::AtomicDiv, "a", AttributesBuilder::new().int("n", 0).build()));
        assert_eq!(done.status, Status::Overflow);
        assert_eq!(stored(&mut engine, "a")["n"], Value::Int(i64::MAX));
    }

    #[test]
    fn test_mod_rejected_for_float() {
        let mut engine = kv();
        let raw = engine.submit(&write(WriteKind::AtomicMod, "a", AttributesBuilder::new().float("f", 2.0).build()));
        assert_eq!(raw.status, Status::WrongType);
    }

    #[test]
    fn test_atomic_on_missing_object() {
        let mut engine = kv();
        let done = run(&mut engine, write(WriteKind::AtomicAdd, "ghost", AttributesBuilder::new().int("n", 1).build()));
        assert_eq!(done.status, Status::NotFound);
    }

    #[test]
    fn test_put_if_not_exist() {
        let mut engine = kv();
        let attrs = AttributesBuilder::new().string("v", "first").build();
        assert_eq!(run(&mut engine, write(WriteKind::PutIfNotExist, "a", attrs.clone())).status, Status::Success);
        assert_eq!(run(&mut engine, write(WriteKind::PutIfNotExist, "a", attrs)).status, Status::CmpFail);
    }

    #[test]
    fn test_string_list_set_ops() {
        let mut engine = kv();
        run(&mut engine, write(WriteKind::Put, "a", AttributesBuilder::new().string("v", "mid").build()));
        run(&mut engine, write(WriteKind::StringPrepend, "a", AttributesBuilder::new().string("v", "<").build()));
        run(&mut engine, write(WriteKind::StringAppend, "a", AttributesBuilder::new().string("v", ">").build()));
        run(&mut engine, write(WriteKind::ListRpush, "a", AttributesBuilder::new().int("l", 2).build()));
        run(&mut engine, write(WriteKind::ListLpush, "a", AttributesBuilder::new().int("l", 1).build()));
        run(&mut engine, write(WriteKind::SetAdd, "a", AttributesBuilder::new().string("s", "x").build()));
        run(&mut engine, write(WriteKind::SetAdd, "a", AttributesBuilder::new().string("s", "y").build()));
        run(&mut engine, write(
            WriteKind::SetIntersect,
            "a",
            vec![Attribute::new("s", Value::set(vec![Value::from("y"), Value::from("z")]))],
        ));

        let row = stored(&mut engine, "a");
        assert_eq!(row["v"], Value::from("<mid>"));
        assert_eq!(row["l"], Value::list(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(row["s"], Value::set(vec![Value::from("y")]));
    }

    #[test]
    fn test_map_ops() {
        let mut engine = kv();
        run(&mut engine, write(WriteKind::Put, "a", vec![]));

        let entries = vec![MapAttribute::new("m", "x", 2i64), MapAttribute::new("m", "y", 5i64)];
        let add = Request::MapWrite {
            space: "kv".into(),
            key: Value::from("a"),
            kind: MapWriteKind::Add,
            checks: vec![],
            entries,
        };
        run(&mut engine, add);

        let bump = Request::MapWrite {
            space: "kv".into(),
            key: Value::from("a"),
            kind: MapWriteKind::AtomicAdd,
            checks: vec![],
            entries: vec![MapAttribute::new("m", "x", 10i64), MapAttribute::new("m", "z", 1i64)],
        };
        run(&mut engine, bump);
        run(&mut engine, write(WriteKind::MapRemove, "a", vec![Attribute::new("m", "y")]));

        let row = stored(&mut engine, "a");
        let m = row["m"].as_map().unwrap();
        assert_eq!(m.get(&Value::from("x")), Some(&Value::Int(12)));
        assert_eq!(m.get(&Value::from("z")), Some(&Value::Int(1)));
        assert!(m.get(&Value::from("y")).is_none());
    }

    #[test]
    fn test_map_entry_rejection_position() {
        let mut engine = kv();
        let request = Request::MapWrite {
            space: "kv".into(),
            key: Value::from("a"),
            kind: MapWriteKind::Add,
            checks: vec![Predicate::equals("v", "x")],
            entries: vec![MapAttribute::new("m", "ok", 1i64), MapAttribute::new("m", "bad", "str")],
        };
        let raw = engine.submit(&request);
        assert_eq!(raw.status, Status::WrongType);
        assert_eq!(raw.id, -4);
        assert_eq!(request.resolver().resolve(raw.id), Some("m"));
    }

    #[test]
    fn test_conditional_write_and_delete() {
        let mut engine = kv();
        run(&mut engine, write(WriteKind::Put, "a", AttributesBuilder::new().string("v", "old").build()));

        let cond = Request::Write {
            space: "kv".into(),
            key: Value::from("a"),
            kind: WriteKind::Put,
            checks: vec![Predicate::equals("v", "other")],
            attributes: AttributesBuilder::new().string("v", "new").build(),
        };
        assert_eq!(run(&mut engine, cond).status, Status::CmpFail);

        let del = Request::Delete {
            space: "kv".into(),
            key: Value::from("a"),
            checks: vec![Predicate::equals("v", "old")],
        };
        assert_eq!(run(&mut engine, del.clone()).status, Status::Success);
        assert_eq!(run(&mut engine, del).status, Status::NotFound);
    }

    #[test]
    fn test_search_and_sorted_search() {
        let mut engine = kv();
        for (k, n) in [("a", 3), ("b", 1), ("c", 2)] {
            run(&mut engine, write(WriteKind::Put, k, AttributesBuilder::new().int("n", n).build()));
        }

        let search = Request::Search {
            space: "kv".into(),
            checks: vec![Predicate::greater_equal("n", 2i64)],
        };
        engine.submit(&search);
        let mut rows = Vec::new();
        loop {
            let c = engine.pump(None).unwrap();
            if c.status == Status::SearchDone {
                break;
            }
            if let Some(Payload::Record(r)) = c.payload {
                rows.push(r);
            }
        }
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.contains_key("k")));

        let sorted = Request::SortedSearch {
            space: "kv".into(),
            checks: vec![],
            sort_by: "n".into(),
            limit: 2,
            order: SortOrder::Descending,
        };
        engine.submit(&sorted);
        let first = engine.pump(None).unwrap();
        let second = engine.pump(None).unwrap();
        let done = engine.pump(None).unwrap();
        let n = |c: &Completion| match &c.payload {
            Some(Payload::Record(r)) => r["n"].as_int().unwrap(),
            _ => -1,
        };
        assert_eq!((n(&first), n(&second)), (3, 2));
        assert_eq!(done.status, Status::SearchDone);
    }

    #[test]
    fn test_count_group_del_describe() {
        let mut engine = kv();
        for k in ["a", "b", "c"] {
            run(&mut engine, write(WriteKind::Put, k, AttributesBuilder::new().string("v", k).build()));
        }
        let count = Request::Count {
            space: "kv".into(),
            checks: vec![],
        };
        assert_eq!(run(&mut engine, count.clone()).payload, Some(Payload::Count(3)));

        let group = Request::GroupDelete {
            space: "kv".into(),
            checks: vec![Predicate::regex("v", "^[ab]$")],
        };
        assert_eq!(run(&mut engine, group).status, Status::Success);
        assert_eq!(engine.object_count("kv"), Some(1));

        let describe = Request::SearchDescribe {
            space: "kv".into(),
            checks: vec![],
        };
        match run(&mut engine, describe).payload {
            Some(Payload::Description(text)) => assert!(text.contains("1 matched")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_check_rejected_with_predicate_base() {
        let mut engine = kv();
        let request = Request::Search {
            space: "kv".into(),
            checks: vec![Predicate::equals("v", "x"), Predicate::equals("missing", "y")],
        };
        let raw = engine.submit(&request);
        assert_eq!(raw.id, -2);
        assert_eq!(raw.status, Status::UnknownAttr);
        assert_eq!(request.resolver().resolve(raw.id), Some("missing"));
    }

    #[test]
    fn test_empty_pump() {
        let mut engine = kv();
        assert_eq!(engine.pump(None).unwrap_err(), Status::NonePending);
    }
}
