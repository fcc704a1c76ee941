/// Decoding of negative request identifiers
///
/// When an engine rejects a submission locally it returns a negative id
/// instead of a request handle. The magnitude, minus a call-shape constant,
/// is a zero-based position into the concatenation of the arrays that were
/// sent, in call order. `ErrorIndexResolver` walks those arrays to recover
/// the offending attribute's name.
///
/// Map calls flatten every map entry into its own slot, so their positions
/// are computed with arbitrary-precision integers. Everything else uses
/// checked `i64` arithmetic.

use crate::error::ClientError;
use crate::predicate::Predicate;
use crate::status::Status;
use crate::types::{Attribute, MapAttribute};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

/// Offset subtracted from the magnitude of a negative id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBase {
    /// Calls addressed by key (get, put, del, atomic and map ops)
    Keyed,
    /// Predicate-only calls (search, sorted_search, count, group_del, search_describe)
    Predicates,
}

impl IndexBase {
    pub fn offset(self) -> i64 {
        match self {
            IndexBase::Keyed => 2,
            IndexBase::Predicates => 1,
        }
    }
}

/// One array sent with a submission
#[derive(Debug, Clone, Copy)]
pub enum EntryArray<'a> {
    Attributes(&'a [Attribute]),
    Checks(&'a [Predicate]),
    MapAttributes(&'a [MapAttribute]),
    Names(&'a [String]),
}

impl<'a> EntryArray<'a> {
    pub fn len(&self) -> usize {
        match self {
            EntryArray::Attributes(a) => a.len(),
            EntryArray::Checks(c) => c.len(),
            EntryArray::MapAttributes(m) => m.len(),
            EntryArray::Names(n) => n.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attribute name at `idx`
    pub fn name(&self, idx: usize) -> Option<&'a str> {
        match *self {
            EntryArray::Attributes(a) => a.get(idx).map(|x| x.name.as_str()),
            EntryArray::Checks(c) => c.get(idx).map(|x| x.attribute.as_str()),
            EntryArray::MapAttributes(m) => m.get(idx).map(|x| x.name.as_str()),
            EntryArray::Names(n) => n.get(idx).map(|x| x.as_str()),
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, EntryArray::MapAttributes(_))
    }
}

/// Resolves a negative request id against the arrays of one submission
#[derive(Debug, Clone)]
pub struct ErrorIndexResolver<'a> {
    base: IndexBase,
    arrays: Vec<EntryArray<'a>>,
}

impl<'a> ErrorIndexResolver<'a> {
    pub fn new(base: IndexBase) -> Self {
        Self {
            base,
            arrays: Vec::new(),
        }
    }

    /// Append the next array in call order
    pub fn with(mut self, array: EntryArray<'a>) -> Self {
        self.arrays.push(array);
        self
    }

    pub fn base(&self) -> IndexBase {
        self.base
    }

    /// Name of the attribute a negative id points at.
    ///
    /// Returns `None` for non-negative ids and for positions past the end of
    /// every array.
    pub fn resolve(&self, raw_id: i64) -> Option<&'a str> {
        if raw_id >= 0 {
            return None;
        }
        if self.arrays.iter().any(EntryArray::is_wide) {
            self.resolve_wide(raw_id)
        } else {
            self.resolve_narrow(raw_id)
        }
    }

    fn resolve_narrow(&self, raw_id: i64) -> Option<&'a str> {
        let idx = (-self.base.offset()).checked_sub(raw_id)?;
        let mut idx = usize::try_from(idx).ok()?;

        for array in &self.arrays {
            if idx < array.len() {
                return array.name(idx);
            }
            idx -= array.len();
        }
        None
    }

    fn resolve_wide(&self, raw_id: i64) -> Option<&'a str> {
        let mut idx = BigInt::from(-self.base.offset()) - BigInt::from(raw_id);
        if idx.is_negative() {
            return None;
        }

        for array in &self.arrays {
            let len = BigInt::from(array.len());
            if idx < len {
                return array.name(idx.to_usize()?);
            }
            idx -= len;
        }
        None
    }

    /// Build the error for a locally rejected submission
    pub fn error_for(&self, raw_id: i64, status: Status) -> ClientError {
        match self.resolve(raw_id) {
            Some(name) => ClientError::new(status).with_attribute(name),
            None => ClientError::new(status),
        }
    }
}
