pub mod status;
pub mod error;
pub mod types;
pub mod predicate;
pub mod schema;
pub mod error_index; // negative request id decoding

pub use error::{ClientError, Result};
pub use error_index::{EntryArray, ErrorIndexResolver, IndexBase};
pub use predicate::{Predicate, PredicateOp};
pub use schema::{AttributeSchema, Datatype, SpaceSchema};
pub use status::Status;
pub use types::*;
