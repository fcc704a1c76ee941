/// HDX client library
///
/// Multiplexes single-result (`Deferred`) and streaming (`Search`)
/// operations over one engine and one cooperative event loop.

pub mod config;
pub mod engine;
pub mod request;
pub mod table;
pub mod operation;
pub mod deferred;
pub mod search;
pub mod client;
pub mod memory; // in-process engine

// Re-export key types
pub use client::Client;
pub use config::{BacklogOrder, ClientConfig};
pub use deferred::Deferred;
pub use engine::{Completion, Engine, Payload, RawSubmission, RequestId};
pub use hdx_core::{
    Attribute, AttributesBuilder, ClientError, Datatype, MapAttribute, MapAttributesBuilder,
    Predicate, PredicateOp, Record, Result, SpaceSchema, Status, Value,
};
pub use memory::MemoryEngine;
pub use request::{MapWriteKind, Request, SortOrder, WriteKind};
pub use search::Search;
