/// Space schemas
///
/// Describes the key and typed attributes of a space. Engines use this to
/// reject writes and predicates before anything is sent.

use crate::predicate::{Predicate, PredicateOp};
use crate::status::Status;
use crate::types::Value;
use serde::{Deserialize, Serialize};

/// Datatype of an attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datatype {
    String,
    Int64,
    Float,
    List(Box<Datatype>),
    Set(Box<Datatype>),
    Map(Box<Datatype>, Box<Datatype>),
}

impl Datatype {
    pub fn list(elem: Datatype) -> Self {
        Datatype::List(Box::new(elem))
    }

    pub fn set(elem: Datatype) -> Self {
        Datatype::Set(Box::new(elem))
    }

    pub fn map(key: Datatype, value: Datatype) -> Self {
        Datatype::Map(Box::new(key), Box::new(value))
    }

    /// Check if a value matches this type, including every container element
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Datatype::String, Value::String(_)) => true,
            (Datatype::Int64, Value::Int(_)) => true,
            (Datatype::Float, Value::Float(_)) => true,
            (Datatype::List(elem), Value::List(items)) => items.iter().all(|v| elem.matches(v)),
            (Datatype::Set(elem), Value::Set(items)) => items.iter().all(|v| elem.matches(v)),
            (Datatype::Map(k, v), Value::Map(entries)) => {
                entries.iter().all(|(ek, ev)| k.matches(ek) && v.matches(ev))
            }
            _ => false,
        }
    }

    /// Value an attribute takes when an object is created without it
    pub fn default_value(&self) -> Value {
        match self {
            Datatype::String => Value::string(""),
            Datatype::Int64 => Value::Int(0),
            Datatype::Float => Value::Float(0.0),
            Datatype::List(_) => Value::List(Vec::new()),
            Datatype::Set(_) => Value::Set(Default::default()),
            Datatype::Map(_, _) => Value::Map(Default::default()),
        }
    }

    /// Element type for lists and sets
    pub fn element(&self) -> Option<&Datatype> {
        match self {
            Datatype::List(e) | Datatype::Set(e) => Some(e),
            _ => None,
        }
    }

    /// Key and value types for maps
    pub fn map_types(&self) -> Option<(&Datatype, &Datatype)> {
        match self {
            Datatype::Map(k, v) => Some((k, v)),
            _ => None,
        }
    }

    /// Whether a predicate with `op` and `operand` can be applied to this type
    pub fn accepts_predicate(&self, op: PredicateOp, operand: &Value) -> bool {
        match op {
            PredicateOp::Fail => true,
            PredicateOp::Equals => self.matches(operand),
            PredicateOp::LessThan
            | PredicateOp::LessEqual
            | PredicateOp::GreaterEqual
            | PredicateOp::GreaterThan => {
                matches!(self, Datatype::String | Datatype::Int64 | Datatype::Float)
                    && self.matches(operand)
            }
            PredicateOp::Regex => *self == Datatype::String && operand.as_str().is_some(),
            PredicateOp::LengthEquals
            | PredicateOp::LengthLessEqual
            | PredicateOp::LengthGreaterEqual => {
                !matches!(self, Datatype::Int64 | Datatype::Float) && operand.as_int().is_some()
            }
            PredicateOp::Contains => match self {
                Datatype::String => operand.as_bytes().is_some(),
                Datatype::List(e) | Datatype::Set(e) => e.matches(operand),
                Datatype::Map(k, _) => k.matches(operand),
                Datatype::Int64 | Datatype::Float => false,
            },
        }
    }
}

/// Schema definition for an attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    pub datatype: Datatype,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

/// Schema of one space: a key attribute plus named, typed attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSchema {
    pub name: String,
    pub key: AttributeSchema,
    pub attributes: Vec<AttributeSchema>,
}

impl SpaceSchema {
    /// Create a space keyed by `key_name` of type `key_type`
    pub fn new(name: impl Into<String>, key_name: impl Into<String>, key_type: Datatype) -> Self {
        Self {
            name: name.into(),
            key: AttributeSchema::new(key_name, key_type),
            attributes: Vec::new(),
        }
    }

    /// Add a typed attribute
    pub fn with_attribute(mut self, name: impl Into<String>, datatype: Datatype) -> Self {
        self.attributes.push(AttributeSchema::new(name, datatype));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key.name == name
    }

    /// Validate the key's type
    pub fn check_key(&self, key: &Value) -> Result<(), Status> {
        if self.key.datatype.matches(key) {
            Ok(())
        } else {
            Err(Status::WrongType)
        }
    }

    /// Resolve an attribute named in a write.
    ///
    /// Naming the key is DONTUSEKEY, an unknown name is UNKNOWNATTR.
    pub fn writable(&self, name: &str) -> Result<&AttributeSchema, Status> {
        if self.is_key(name) {
            return Err(Status::DontUseKey);
        }
        self.attribute(name).ok_or(Status::UnknownAttr)
    }

    /// Resolve an attribute named in a predicate; the key may be checked.
    pub fn checkable(&self, name: &str) -> Result<&AttributeSchema, Status> {
        if self.is_key(name) {
            return Ok(&self.key);
        }
        self.attribute(name).ok_or(Status::UnknownAttr)
    }

    /// Validate a predicate list, returning the status and position of the
    /// first bad check.
    pub fn check_predicates(&self, checks: &[Predicate]) -> Result<(), (Status, usize)> {
        for (idx, check) in checks.iter().enumerate() {
            let schema = self.checkable(&check.attribute).map_err(|s| (s, idx))?;
            if !schema.datatype.accepts_predicate(check.op, &check.value) {
                return Err((Status::WrongType, idx));
            }
            if check.op == PredicateOp::Regex && check.compile_regex().is_none() {
                return Err((Status::WrongType, idx));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> SpaceSchema {
        SpaceSchema::new("people", "username", Datatype::String)
            .with_attribute("first", Datatype::String)
            .with_attribute("age", Datatype::Int64)
            .with_attribute("tags", Datatype::set(Datatype::String))
    }

    #[test]
    fn test_datatype_matches() {
        assert!(Datatype::String.matches(&Value::from("x")));
        assert!(Datatype::Int64.matches(&Value::from(1i64)));
        assert!(!Datatype::String.matches(&Value::from(1i64)));

        let list = Datatype::list(Datatype::Int64);
        assert!(list.matches(&Value::list(vec![Value::from(1i64)])));
        assert!(!list.matches(&Value::list(vec![Value::from("x")])));

        let map = Datatype::map(Datatype::String, Datatype::Float);
        assert!(map.matches(&Value::map(vec![(Value::from("k"), Value::from(1.0))])));
        assert!(!map.matches(&Value::map(vec![(Value::from(1i64), Value::from(1.0))])));
    }

    #[test]
    fn test_default_values() {
        assert_eq!(Datatype::Int64.default_value(), Value::Int(0));
        assert_eq!(Datatype::set(Datatype::String).default_value().length(), Some(0));
    }

    #[test]
    fn test_writable_attribute() {
        let schema = people();
        assert!(schema.writable("first").is_ok());
        assert_eq!(schema.writable("username"), Err(Status::DontUseKey));
        assert_eq!(schema.writable("nope"), Err(Status::UnknownAttr));
    }

    #[test]
    fn test_key_is_checkable() {
        let schema = people();
        assert_eq!(schema.checkable("username").unwrap().datatype, Datatype::String);
    }

    #[test]
    fn test_check_predicates_reports_position() {
        let schema = people();
        let checks = vec![
            Predicate::equals("first", "jane"),
            Predicate::greater_than("age", 10i64),
            Predicate::equals("colour", "red"),
        ];
        assert_eq!(schema.check_predicates(&checks), Err((Status::UnknownAttr, 2)));

        let wrong = vec![Predicate::less_than("age", "ten")];
        assert_eq!(schema.check_predicates(&wrong), Err((Status::WrongType, 0)));

        let range_on_set = vec![Predicate::less_than("tags", "a")];
        assert_eq!(schema.check_predicates(&range_on_set), Err((Status::WrongType, 0)));

        let ok = vec![Predicate::contains("tags", "a"), Predicate::regex("first", "^j")];
        assert!(schema.check_predicates(&ok).is_ok());
    }
}
