/// Search and condition predicates
///
/// A predicate checks one attribute of a stored object. Searches, counts,
/// group deletes and every `cond_*` write carry an ordered list of them.

use crate::types::Value;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredicateOp {
    Fail,
    Equals,
    LessThan,
    LessEqual,
    GreaterEqual,
    GreaterThan,
    Regex,
    LengthEquals,
    LengthLessEqual,
    LengthGreaterEqual,
    Contains,
}

impl PredicateOp {
    /// True for the ordered comparisons
    pub fn is_range(self) -> bool {
        matches!(
            self,
            PredicateOp::LessThan
                | PredicateOp::LessEqual
                | PredicateOp::GreaterEqual
                | PredicateOp::GreaterThan
        )
    }

    /// True for the LENGTH_* family, which always takes an integer operand
    pub fn is_length(self) -> bool {
        matches!(
            self,
            PredicateOp::LengthEquals | PredicateOp::LengthLessEqual | PredicateOp::LengthGreaterEqual
        )
    }
}

/// A single attribute check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub attribute: String,
    pub op: PredicateOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(attribute: impl Into<String>, op: PredicateOp, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, PredicateOp::Equals, value)
    }

    pub fn less_than(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, PredicateOp::LessThan, value)
    }

    pub fn less_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, PredicateOp::LessEqual, value)
    }

    pub fn greater_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, PredicateOp::GreaterEqual, value)
    }

    pub fn greater_than(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, PredicateOp::GreaterThan, value)
    }

    pub fn regex(attribute: impl Into<String>, pattern: &str) -> Self {
        Self::new(attribute, PredicateOp::Regex, pattern)
    }

    pub fn contains(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, PredicateOp::Contains, value)
    }

    pub fn length_equals(attribute: impl Into<String>, len: i64) -> Self {
        Self::new(attribute, PredicateOp::LengthEquals, len)
    }

    /// Inclusive range as a pair of checks, `lower <= attr <= upper`
    pub fn range(
        attribute: impl Into<String>,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> [Predicate; 2] {
        let attribute = attribute.into();
        [
            Self::greater_equal(attribute.clone(), lower),
            Self::less_equal(attribute, upper),
        ]
    }

    /// Compile the operand of a REGEX check.
    ///
    /// Returns `None` when the operand is not a string or not a valid pattern.
    pub fn compile_regex(&self) -> Option<Regex> {
        let pattern = self.value.as_str()?;
        Regex::new(pattern).ok()
    }

    /// Evaluate this check against a stored value.
    ///
    /// Comparisons across different datatypes are false rather than ordered
    /// by datatype rank.
    pub fn evaluate(&self, stored: &Value) -> bool {
        let same_kind = std::mem::discriminant(stored) == std::mem::discriminant(&self.value);

        match self.op {
            PredicateOp::Fail => false,
            PredicateOp::Equals => same_kind && *stored == self.value,
            PredicateOp::LessThan => same_kind && *stored < self.value,
            PredicateOp::LessEqual => same_kind && *stored <= self.value,
            PredicateOp::GreaterEqual => same_kind && *stored >= self.value,
            PredicateOp::GreaterThan => same_kind && *stored > self.value,
            PredicateOp::Regex => match (stored.as_bytes(), self.compile_regex()) {
                (Some(haystack), Some(re)) => re.is_match(haystack),
                _ => false,
            },
            PredicateOp::LengthEquals
            | PredicateOp::LengthLessEqual
            | PredicateOp::LengthGreaterEqual => {
                let (Some(len), Some(want)) = (stored.length(), self.value.as_int()) else {
                    return false;
                };
                let Ok(len) = i64::try_from(len) else {
                    return false;
                };
                match self.op {
                    PredicateOp::LengthEquals => len == want,
                    PredicateOp::LengthLessEqual => len <= want,
                    _ => len >= want,
                }
            }
            PredicateOp::Contains => match stored {
                Value::List(items) => items.contains(&self.value),
                Value::Set(items) => items.contains(&self.value),
                Value::Map(entries) => entries.contains_key(&self.value),
                Value::String(haystack) => match self.value.as_bytes() {
                    Some(needle) if needle.is_empty() => true,
                    Some(needle) => haystack.windows(needle.len()).any(|w| w == needle),
                    None => false,
                },
                Value::Int(_) | Value::Float(_) => false,
            },
        }
    }
}
