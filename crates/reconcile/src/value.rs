//! Tri-state attribute values and resource states.
//!
//! Every attribute is either null, unknown (to be computed during apply), or
//! a concrete value of its declared [`Kind`]. Sets are stored in a canonical
//! order (sorted, deduplicated) so that equal sets compare equal regardless of
//! how they were written.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int,
    Float,
    String,
    Set(Box<Kind>),
    List(Box<Kind>),
    /// An object whose fields are described by the attribute's nested model.
    Object,
}

impl Kind {
    /// Shorthand for a set of strings.
    pub fn string_set() -> Self {
        Self::Set(Box::new(Self::String))
    }

    /// Shorthand for a set of integers.
    pub fn int_set() -> Self {
        Self::Set(Box::new(Self::Int))
    }

    /// Shorthand for a list of strings.
    pub fn string_list() -> Self {
        Self::List(Box::new(Self::String))
    }

    /// Shorthand for a list of objects.
    pub fn object_list() -> Self {
        Self::List(Box::new(Self::Object))
    }

    /// The element kind of a collection.
    pub fn element(&self) -> Option<&Kind> {
        match self {
            Self::Set(inner) | Self::List(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int64"),
            Self::Float => f.write_str("float64"),
            Self::String => f.write_str("string"),
            Self::Set(inner) => write!(f, "set({inner})"),
            Self::List(inner) => write!(f, "list({inner})"),
            Self::Object => f.write_str("object"),
        }
    }
}

/// Errors from reading or decoding attribute values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("attribute \"{0}\" is not set")]
    Missing(String),

    #[error("attribute \"{0}\" is not known until apply")]
    Unknown(String),

    #[error("attribute \"{name}\": expected {expected}, found {found}")]
    Kind {
        name: String,
        expected: String,
        found: String,
    },

    #[error("unsupported attribute \"{0}\"")]
    UnsupportedAttribute(String),

    #[error("expected a JSON object for {0}")]
    NotAnObject(String),
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Not set.
    #[default]
    Null,
    /// Will be known after apply.
    Unknown,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Unordered collection; always kept sorted and deduplicated.
    Set(Vec<Value>),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

static NULL: Value = Value::Null;

impl Value {
    /// Build a set, canonicalizing element order.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut items: Vec<Value> = items.into_iter().collect();
        items.sort_by(Value::total_cmp);
        items.dedup();
        Self::Set(items)
    }

    /// A set of strings.
    pub fn string_set<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Self::set(items.into_iter().map(|s| Self::String(s.into())))
    }

    /// A set of integers.
    pub fn int_set(items: impl IntoIterator<Item = i64>) -> Self {
        Self::set(items.into_iter().map(Self::Int))
    }

    /// A list of strings.
    pub fn string_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Self::List(items.into_iter().map(|s| Self::String(s.into())).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Null, an empty string, or an empty collection. The API reports these
    /// interchangeably.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::Set(items) | Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Neither null nor unknown.
    pub fn is_concrete(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    /// Whether this value, or anything nested in it, is unknown.
    pub fn contains_unknown(&self) -> bool {
        match self {
            Self::Unknown => true,
            Self::Set(items) | Self::List(items) => items.iter().any(Value::contains_unknown),
            Self::Object(fields) => fields.values().any(Value::contains_unknown),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Elements of a set or list.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Self::Set(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int64",
            Self::Float(_) => "float64",
            Self::String(_) => "string",
            Self::Set(_) => "set",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Unknown => 1,
            Self::Bool(_) => 2,
            Self::Int(_) => 3,
            Self::Float(_) => 4,
            Self::String(_) => 5,
            Self::Set(_) => 6,
            Self::List(_) => 7,
            Self::Object(_) => 8,
        }
    }

    /// A total order over values, used for canonical set ordering.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Set(a), Self::Set(b)) | (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Object(a), Self::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b) {
                    let ord = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self::Object(fields)
    }
}

/// The attribute values of one resource instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct State {
    values: BTreeMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `name`, or null when absent.
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    /// Set an attribute. Setting null removes it, so absent and null
    /// attributes compare equal.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.values.remove(&name);
            }
            value => {
                self.values.insert(name, value);
            }
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Value {
        self.values.remove(name).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Whether any attribute is, or contains, an unknown value.
    pub fn has_unknowns(&self) -> bool {
        self.values.values().any(Value::contains_unknown)
    }

    /// Names of attributes that are, or contain, unknown values.
    pub fn unknown_attributes(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(_, v)| v.contains_unknown())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Typed accessors
    // -------------------------------------------------------------------------

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).as_str()
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).as_i64()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).as_bool()
    }

    /// String elements of a set or list attribute; empty when null.
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.get(name)
            .elements()
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect()
    }

    /// Integer elements of a set or list attribute; empty when null.
    pub fn ints(&self, name: &str) -> Vec<i64> {
        self.get(name)
            .elements()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_i64)
            .collect()
    }

    fn require(&self, name: &str) -> Result<&Value, ValueError> {
        match self.get(name) {
            Value::Null => Err(ValueError::Missing(name.to_string())),
            Value::Unknown => Err(ValueError::Unknown(name.to_string())),
            v => Ok(v),
        }
    }

    /// A concrete string attribute.
    pub fn require_str(&self, name: &str) -> Result<&str, ValueError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| ValueError::Kind {
            name: name.to_string(),
            expected: Kind::String.to_string(),
            found: value.type_name().to_string(),
        })
    }

    /// A concrete integer attribute.
    pub fn require_int(&self, name: &str) -> Result<i64, ValueError> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| ValueError::Kind {
            name: name.to_string(),
            expected: Kind::Int.to_string(),
            found: value.type_name().to_string(),
        })
    }

    /// The `id` attribute parsed as a numeric cloud ID.
    pub fn numeric_id(&self) -> Result<i64, ValueError> {
        let id = self.require_str("id")?;
        id.parse().map_err(|_| ValueError::Kind {
            name: "id".to_string(),
            expected: "numeric ID".to_string(),
            found: format!("{id:?}"),
        })
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut state = Self::new();
        for (name, value) in iter {
            state.set(name, value);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_canonical() {
        let a = Value::string_set(["b", "a", "b"]);
        let b = Value::string_set(["a", "b"]);
        assert_eq!(a, b);
        assert_eq!(a.elements().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_attribute_is_null() {
        let state = State::new();
        assert!(state.get("anything").is_null());
        assert_eq!(state.strings("tags"), Vec::<String>::new());
    }

    #[test]
    fn test_contains_unknown_nested() {
        let mut fields = BTreeMap::new();
        fields.insert("label".to_string(), Value::Unknown);
        let v = Value::List(vec![Value::Object(fields)]);
        assert!(v.contains_unknown());
        assert!(!Value::Int(1).contains_unknown());
    }

    #[test]
    fn test_require_accessors() {
        let state = State::new()
            .with("id", "42")
            .with("label", Value::Unknown)
            .with("ttl_sec", 300);

        assert_eq!(state.numeric_id().unwrap(), 42);
        assert_eq!(state.require_int("ttl_sec").unwrap(), 300);
        assert_eq!(
            state.require_str("label"),
            Err(ValueError::Unknown("label".to_string()))
        );
        assert_eq!(
            state.require_str("missing"),
            Err(ValueError::Missing("missing".to_string()))
        );
        assert!(matches!(
            state.require_str("ttl_sec"),
            Err(ValueError::Kind { .. })
        ));
    }

    #[test]
    fn test_null_equals_absent() {
        let a = State::new().with("id", "1").with("description", Value::Null);
        let b = State::new().with("id", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<String> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
    }

    #[test]
    fn test_unknown_attributes() {
        let state = State::new().with("a", 1).with("b", Value::Unknown);
        assert!(state.has_unknowns());
        assert_eq!(state.unknown_attributes(), vec!["b"]);
    }
}
