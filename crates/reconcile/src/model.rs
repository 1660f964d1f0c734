//! Attribute models: the typed schema of a resource or data source.

use crate::semantic::SemanticEq;
use crate::value::{Kind, Value};
use regex::Regex;
use std::net::IpAddr;

/// Who supplies an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be set in configuration.
    Required,
    /// May be set in configuration; null otherwise.
    Optional,
    /// Set by the provider only.
    Computed,
    /// May be set in configuration; computed by the provider otherwise.
    OptionalComputed,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Computed => "computed",
            Self::OptionalComputed => "optional_computed",
        }
    }
}

/// A value constraint checked during validation.
#[derive(Debug, Clone)]
pub enum Validator {
    /// String must be one of the listed values.
    OneOf(&'static [&'static str]),
    /// String length (in characters) within `min..=max`.
    LengthBetween(usize, usize),
    /// Integer within `min..=max`.
    Between(i64, i64),
    /// String must parse as an IP address.
    IpAddress,
    /// String must match the pattern.
    Matches(&'static str),
}

impl Validator {
    /// Check one scalar value. Null and unknown values always pass.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if !value.is_concrete() {
            return Ok(());
        }
        match self {
            Self::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => Ok(()),
                Some(s) => Err(format!(
                    "value {s:?} must be one of: {}",
                    allowed.join(", ")
                )),
                None => Err("expected a string".to_string()),
            },
            Self::LengthBetween(min, max) => match value.as_str() {
                Some(s) => {
                    let len = s.chars().count();
                    if (*min..=*max).contains(&len) {
                        Ok(())
                    } else {
                        Err(format!(
                            "length must be between {min} and {max}, got {len}"
                        ))
                    }
                }
                None => Err("expected a string".to_string()),
            },
            Self::Between(min, max) => match value.as_i64() {
                Some(n) if (*min..=*max).contains(&n) => Ok(()),
                Some(n) => Err(format!("value must be between {min} and {max}, got {n}")),
                None => Err("expected an integer".to_string()),
            },
            Self::IpAddress => match value.as_str() {
                Some(s) if s.parse::<IpAddr>().is_ok() => Ok(()),
                Some(s) => Err(format!("{s:?} is not a valid IP address")),
                None => Err("expected a string".to_string()),
            },
            Self::Matches(pattern) => {
                let re = Regex::new(pattern).map_err(|e| e.to_string())?;
                match value.as_str() {
                    Some(s) if re.is_match(s) => Ok(()),
                    Some(s) => Err(format!("{s:?} must match {pattern}")),
                    None => Err("expected a string".to_string()),
                }
            }
        }
    }
}

/// One attribute of a model.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: Kind,
    pub presence: Presence,
    /// Changing this attribute requires destroying and recreating the
    /// resource.
    pub force_replace: bool,
    /// Value used when configuration leaves the attribute unset.
    pub default: Option<Value>,
    pub semantic: Option<SemanticEq>,
    /// Applied to scalars, or to each element of a collection.
    pub validators: Vec<Validator>,
    /// Fields of an object, or of each object in a collection.
    pub nested: Vec<Attribute>,
    pub description: &'static str,
}

impl Attribute {
    fn new(name: &'static str, kind: Kind, presence: Presence) -> Self {
        Self {
            name,
            kind,
            presence,
            force_replace: false,
            default: None,
            semantic: None,
            validators: Vec::new(),
            nested: Vec::new(),
            description: "",
        }
    }

    pub fn required(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::Required)
    }

    pub fn optional(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::Optional)
    }

    pub fn computed(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::Computed)
    }

    pub fn optional_computed(name: &'static str, kind: Kind) -> Self {
        Self::new(name, kind, Presence::OptionalComputed)
    }

    pub fn force_replace(mut self) -> Self {
        self.force_replace = true;
        self
    }

    /// Set a default. A defaulted attribute is also computed, since the
    /// provider fills it in.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        if self.presence == Presence::Optional {
            self.presence = Presence::OptionalComputed;
        }
        self
    }

    pub fn semantic(mut self, semantic: SemanticEq) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn nested(mut self, attributes: Vec<Attribute>) -> Self {
        self.nested = attributes;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    /// Whether the provider may fill in this attribute.
    pub fn is_computed(&self) -> bool {
        matches!(
            self.presence,
            Presence::Computed | Presence::OptionalComputed
        )
    }

    /// Whether configuration may set this attribute.
    pub fn is_configurable(&self) -> bool {
        self.presence != Presence::Computed
    }

    /// A nested field by name.
    pub fn field(&self, name: &str) -> Option<&Attribute> {
        self.nested.iter().find(|a| a.name == name)
    }
}

/// The schema of a resource type or data source.
#[derive(Debug, Clone)]
pub struct Schema {
    pub type_name: &'static str,
    pub description: &'static str,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(type_name: &'static str, description: &'static str) -> Self {
        Self {
            type_name,
            description,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn attr(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_of() {
        let v = Validator::OneOf(&["master", "slave"]);
        assert!(v.check(&Value::from("master")).is_ok());
        assert!(v.check(&Value::from("primary")).is_err());
        assert!(v.check(&Value::Unknown).is_ok());
        assert!(v.check(&Value::Null).is_ok());
    }

    #[test]
    fn test_length_between_counts_chars() {
        let v = Validator::LengthBetween(3, 5);
        assert!(v.check(&Value::from("abc")).is_ok());
        assert!(v.check(&Value::from("ab")).is_err());
        assert!(v.check(&Value::from("ééééé")).is_ok());
    }

    #[test]
    fn test_between() {
        let v = Validator::Between(0, 255);
        assert!(v.check(&Value::Int(255)).is_ok());
        assert!(v.check(&Value::Int(256)).is_err());
        assert!(v.check(&Value::from("1")).is_err());
    }

    #[test]
    fn test_ip_address() {
        assert!(Validator::IpAddress.check(&Value::from("192.0.2.1")).is_ok());
        assert!(Validator::IpAddress.check(&Value::from("2001:db8::1")).is_ok());
        assert!(Validator::IpAddress.check(&Value::from("192.0.2")).is_err());
    }

    #[test]
    fn test_matches() {
        let v = Validator::Matches(r"^[a-zA-Z0-9_.-]+$");
        assert!(v.check(&Value::from("my-firewall_1")).is_ok());
        assert!(v.check(&Value::from("no spaces")).is_err());
    }

    #[test]
    fn test_default_makes_computed() {
        let attr = Attribute::optional("status", Kind::String).default("active");
        assert!(attr.is_computed());
        assert!(attr.is_configurable());
        assert_eq!(attr.default, Some(Value::from("active")));
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new("test", "")
            .attr(Attribute::computed("id", Kind::String))
            .attr(Attribute::required("label", Kind::String).force_replace());
        assert!(schema.attribute("label").unwrap().force_replace);
        assert!(!schema.attribute("id").unwrap().is_configurable());
        assert!(schema.attribute("missing").is_none());
    }
}
