/// Requests handed to an engine
///
/// A `Request` owns everything a submission carries. It also knows the
/// arrays a negative id is decoded against, in call order.

use hdx_core::{Attribute, EntryArray, ErrorIndexResolver, IndexBase, MapAttribute, Predicate, Value};
use serde::{Deserialize, Serialize};

/// Write applied to plain attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteKind {
    Put,
    PutIfNotExist,
    AtomicAdd,
    AtomicSub,
    AtomicMul,
    AtomicDiv,
    AtomicMod,
    AtomicAnd,
    AtomicOr,
    AtomicXor,
    StringPrepend,
    StringAppend,
    ListLpush,
    ListRpush,
    SetAdd,
    SetRemove,
    SetIntersect,
    SetUnion,
    /// Remove the keys named by each attribute's value from that map attribute
    MapRemove,
}

impl WriteKind {
    pub fn name(self) -> &'static str {
        match self {
            WriteKind::Put => "put",
            WriteKind::PutIfNotExist => "put_if_not_exist",
            WriteKind::AtomicAdd => "atomic_add",
            WriteKind::AtomicSub => "atomic_sub",
            WriteKind::AtomicMul => "atomic_mul",
            WriteKind::AtomicDiv => "atomic_div",
            WriteKind::AtomicMod => "atomic_mod",
            WriteKind::AtomicAnd => "atomic_and",
            WriteKind::AtomicOr => "atomic_or",
            WriteKind::AtomicXor => "atomic_xor",
            WriteKind::StringPrepend => "string_prepend",
            WriteKind::StringAppend => "string_append",
            WriteKind::ListLpush => "list_lpush",
            WriteKind::ListRpush => "list_rpush",
            WriteKind::SetAdd => "set_add",
            WriteKind::SetRemove => "set_remove",
            WriteKind::SetIntersect => "set_intersect",
            WriteKind::SetUnion => "set_union",
            WriteKind::MapRemove => "map_remove",
        }
    }

    /// Whether this write creates the object when it is missing
    pub fn creates(self) -> bool {
        matches!(self, WriteKind::Put | WriteKind::PutIfNotExist)
    }
}

/// Write applied to individual map entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapWriteKind {
    Add,
    AtomicAdd,
    AtomicSub,
    AtomicMul,
    AtomicDiv,
    AtomicMod,
    AtomicAnd,
    AtomicOr,
    AtomicXor,
    StringPrepend,
    StringAppend,
}

impl MapWriteKind {
    pub fn name(self) -> &'static str {
        match self {
            MapWriteKind::Add => "map_add",
            MapWriteKind::AtomicAdd => "map_atomic_add",
            MapWriteKind::AtomicSub => "map_atomic_sub",
            MapWriteKind::AtomicMul => "map_atomic_mul",
            MapWriteKind::AtomicDiv => "map_atomic_div",
            MapWriteKind::AtomicMod => "map_atomic_mod",
            MapWriteKind::AtomicAnd => "map_atomic_and",
            MapWriteKind::AtomicOr => "map_atomic_or",
            MapWriteKind::AtomicXor => "map_atomic_xor",
            MapWriteKind::StringPrepend => "map_string_prepend",
            MapWriteKind::StringAppend => "map_string_append",
        }
    }
}

/// Direction of a sorted search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest values first
    #[default]
    Ascending,
    /// Largest values first
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Get {
        space: String,
        key: Value,
    },
    GetPartial {
        space: String,
        key: Value,
        names: Vec<String>,
    },
    Write {
        space: String,
        key: Value,
        kind: WriteKind,
        checks: Vec<Predicate>,
        attributes: Vec<Attribute>,
    },
    MapWrite {
        space: String,
        key: Value,
        kind: MapWriteKind,
        checks: Vec<Predicate>,
        entries: Vec<MapAttribute>,
    },
    Delete {
        space: String,
        key: Value,
        checks: Vec<Predicate>,
    },
    Search {
        space: String,
        checks: Vec<Predicate>,
    },
    SortedSearch {
        space: String,
        checks: Vec<Predicate>,
        sort_by: String,
        limit: u64,
        order: SortOrder,
    },
    SearchDescribe {
        space: String,
        checks: Vec<Predicate>,
    },
    GroupDelete {
        space: String,
        checks: Vec<Predicate>,
    },
    Count {
        space: String,
        checks: Vec<Predicate>,
    },
}

impl Request {
    pub fn space(&self) -> &str {
        match self {
            Request::Get { space, .. }
            | Request::GetPartial { space, .. }
            | Request::Write { space, .. }
            | Request::MapWrite { space, .. }
            | Request::Delete { space, .. }
            | Request::Search { space, .. }
            | Request::SortedSearch { space, .. }
            | Request::SearchDescribe { space, .. }
            | Request::GroupDelete { space, .. }
            | Request::Count { space, .. } => space,
        }
    }

    /// Key for keyed calls
    pub fn key(&self) -> Option<&Value> {
        match self {
            Request::Get { key, .. }
            | Request::GetPartial { key, .. }
            | Request::Write { key, .. }
            | Request::MapWrite { key, .. }
            | Request::Delete { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Checks carried by the request (empty for unconditional calls)
    pub fn checks(&self) -> &[Predicate] {
        match self {
            Request::Get { .. } | Request::GetPartial { .. } => &[],
            Request::Write { checks, .. }
            | Request::MapWrite { checks, .. }
            | Request::Delete { checks, .. }
            | Request::Search { checks, .. }
            | Request::SortedSearch { checks, .. }
            | Request::SearchDescribe { checks, .. }
            | Request::GroupDelete { checks, .. }
            | Request::Count { checks, .. } => checks,
        }
    }

    /// Operation name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::GetPartial { .. } => "get_partial",
            Request::Write { kind, .. } => kind.name(),
            Request::MapWrite { kind, .. } => kind.name(),
            Request::Delete { .. } => "del",
            Request::Search { .. } => "search",
            Request::SortedSearch { .. } => "sorted_search",
            Request::SearchDescribe { .. } => "search_describe",
            Request::GroupDelete { .. } => "group_del",
            Request::Count { .. } => "count",
        }
    }

    pub fn index_base(&self) -> IndexBase {
        match self {
            Request::Get { .. }
            | Request::GetPartial { .. }
            | Request::Write { .. }
            | Request::MapWrite { .. }
            | Request::Delete { .. } => IndexBase::Keyed,
            _ => IndexBase::Predicates,
        }
    }

    /// Resolver over this request's arrays, in call order
    pub fn resolver(&self) -> ErrorIndexResolver<'_> {
        let resolver = ErrorIndexResolver::new(self.index_base());
        match self {
            Request::Get { .. } => resolver,
            Request::GetPartial { names, .. } => resolver.with(EntryArray::Names(names)),
            Request::Write {
                checks, attributes, ..
            } => resolver
                .with(EntryArray::Checks(checks))
                .with(EntryArray::Attributes(attributes)),
            Request::MapWrite { checks, entries, .. } => resolver
                .with(EntryArray::Checks(checks))
                .with(EntryArray::MapAttributes(entries)),
            _ => resolver.with(EntryArray::Checks(self.checks())),
        }
    }

    /// Combined length of the arrays the resolver walks
    pub fn entry_count(&self) -> usize {
        match self {
            Request::Get { .. } => 0,
            Request::GetPartial { names, .. } => names.len(),
            Request::Write {
                checks, attributes, ..
            } => checks.len() + attributes.len(),
            Request::MapWrite { checks, entries, .. } => checks.len() + entries.len(),
            _ => self.checks().len(),
        }
    }

    /// Negative id an engine returns to reject this request.
    ///
    /// `Some(position)` points into the concatenated arrays; `None` yields an
    /// id that resolves to no attribute.
    pub fn rejection_id(&self, position: Option<usize>) -> i64 {
        let position = position.unwrap_or_else(|| self.entry_count());
        let position = i64::try_from(position).unwrap_or(i64::MAX - 2);
        -self.index_base().offset() - position
    }

    /// Streaming calls complete with rows and a terminal SEARCHDONE
    pub fn is_streaming(&self) -> bool {
        matches!(self, Request::Search { .. } | Request::SortedSearch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdx_core::AttributesBuilder;

    fn cond_put() -> Request {
        Request::Write {
            space: "kv".into(),
            key: Value::from("k"),
            kind: WriteKind::Put,
            checks: vec![Predicate::equals("v", "old")],
            attributes: AttributesBuilder::new().string("v", "new").string("w", "x").build(),
        }
    }

    #[test]
    fn test_checks_then_attributes() {
        let request = cond_put();
        let resolver = request.resolver();
        assert_eq!(resolver.resolve(-2), Some("v"));
        assert_eq!(resolver.resolve(-4), Some("w"));
        assert_eq!(request.entry_count(), 3);
    }

    #[test]
    fn test_rejection_id_round_trips() {
        let request = cond_put();
        for position in 0..3 {
            let raw = request.rejection_id(Some(position));
            assert!(raw < 0);
            assert!(request.resolver().resolve(raw).is_some());
        }
        assert_eq!(request.resolver().resolve(request.rejection_id(None)), None);
    }

    #[test]
    fn test_search_uses_predicate_base() {
        let request = Request::Search {
            space: "kv".into(),
            checks: vec![Predicate::equals("v", "1")],
        };
        assert_eq!(request.index_base(), IndexBase::Predicates);
        assert_eq!(request.rejection_id(Some(0)), -1);
        assert_eq!(request.rejection_id(None), -2);
        assert!(request.is_streaming());
        assert!(request.key().is_none());
    }

    #[test]
    fn test_get_has_no_entries() {
        let request = Request::Get {
            space: "kv".into(),
            key: Value::from("k"),
        };
        assert_eq!(request.rejection_id(None), -2);
        assert_eq!(request.resolver().resolve(-2), None);
        assert_eq!(request.name(), "get");
    }

    #[test]
    fn test_names() {
        assert_eq!(WriteKind::AtomicXor.name(), "atomic_xor");
        assert_eq!(MapWriteKind::StringAppend.name(), "map_string_append");
        assert!(WriteKind::Put.creates());
        assert!(!WriteKind::AtomicAdd.creates());
    }
}
