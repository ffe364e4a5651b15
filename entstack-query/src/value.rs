//! Stack values
//!
//! [`StackValue`] is the tagged union the VM manipulates. [`Kind`] mirrors
//! its variants for overload patterns and adds the [`Kind::Any`] wildcard,
//! which never exists at runtime.

use crate::select::Filter;
use chrono::{DateTime, SecondsFormat, Utc};
use entstack_store::{BitField, Component, ComponentDef, Entity, EntityStore, StoreRef};
use entstack_types::DefId;
use regex::Regex;
use serde_json::{Map as JsonMap, Number, Value as Json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A word-ish token kept unevaluated inside a list literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quoted {
    /// A bare word; dispatched when evaluated
    Word(String),
    /// `$name`
    Ref(String),
    /// `^name` or `^N`
    BackRef(String),
    /// `*name`; the depth counts the stars still to strip
    Escaped(usize, String),
    /// `/uri#pointer`
    AttrPath(String),
}

impl Quoted {
    /// Read the text left after stripping escape stars
    pub fn parse(text: &str) -> Quoted {
        let stars = text.chars().take_while(|c| *c == '*').count();
        let rest = &text[stars..];
        if stars > 0 && !rest.is_empty() {
            return Quoted::Escaped(stars, rest.to_string());
        }
        if let Some(name) = rest.strip_prefix('$') {
            Quoted::Ref(name.to_string())
        } else if let Some(name) = rest.strip_prefix('^') {
            Quoted::BackRef(name.to_string())
        } else if rest.starts_with('/') && rest.contains('#') {
            Quoted::AttrPath(rest.to_string())
        } else {
            Quoted::Word(rest.to_string())
        }
    }

    /// The name as written, without decoration
    pub fn name(&self) -> &str {
        match self {
            Quoted::Word(name)
            | Quoted::Ref(name)
            | Quoted::BackRef(name)
            | Quoted::Escaped(_, name)
            | Quoted::AttrPath(name) => name,
        }
    }
}

impl fmt::Display for Quoted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quoted::Word(name) | Quoted::AttrPath(name) => write!(f, "{}", name),
            Quoted::Ref(name) => write!(f, "${}", name),
            Quoted::BackRef(name) => write!(f, "^{}", name),
            Quoted::Escaped(depth, name) => write!(f, "{}{}", "*".repeat(*depth), name),
        }
    }
}

/// Scalar values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Quoted(Quoted),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text of a string or a quoted word, used for names and identifiers
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Quoted(q) => Some(q.name()),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Quoted(_) => true,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Quoted(q) => Json::String(q.to_string()),
        }
    }

    /// Equality with ints and floats compared numerically
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{}", Json::String(s.clone())),
            Value::Quoted(q) => write!(f, "{}", q),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Reference to a property of one component def
///
/// The bitfield carries exactly the def; the pointer is a field name or a
/// JSON pointer into the component's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentAttr {
    pub bitfield: BitField,
    pub pointer: String,
}

impl ComponentAttr {
    pub fn new(def: DefId, pointer: impl Into<String>) -> Self {
        Self {
            bitfield: BitField::from_ids([def]),
            pointer: pointer.into(),
        }
    }

    pub fn def(&self) -> Option<DefId> {
        self.bitfield.ids().next()
    }
}

impl fmt::Display for ComponentAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(ca {} #{})", self.bitfield, self.pointer)
    }
}

/// Shared store handle as a stack value
#[derive(Clone)]
pub struct StoreHandle {
    pub store: StoreRef,
    uuid: String,
}

impl StoreHandle {
    pub fn new(store: StoreRef) -> Self {
        let uuid = store.read().uuid();
        Self { store, uuid }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl PartialEq for StoreHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreHandle({})", self.uuid)
    }
}

/// Kinds of stack values, as used in overload patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Value,
    List,
    Map,
    Entity,
    EntitySet,
    Component,
    ComponentDef,
    ComponentAttr,
    BitField,
    Regex,
    DateTime,
    Filter,
    /// Pattern wildcard
    Any,
}

impl Kind {
    pub fn matches(&self, value: &StackValue) -> bool {
        *self == Kind::Any || *self == value.kind()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Value => "value",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Entity => "entity",
            Kind::EntitySet => "entity-set",
            Kind::Component => "component",
            Kind::ComponentDef => "def",
            Kind::ComponentAttr => "component-attr",
            Kind::BitField => "bitfield",
            Kind::Regex => "regex",
            Kind::DateTime => "datetime",
            Kind::Filter => "filter",
            Kind::Any => "any",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value on the query stack
#[derive(Debug, Clone)]
pub enum StackValue {
    Value(Value),
    List(Vec<StackValue>),
    Map(BTreeMap<String, StackValue>),
    Entity(Entity),
    EntitySet(StoreHandle),
    Component(Component),
    ComponentDef(ComponentDef),
    ComponentAttr(ComponentAttr),
    BitField(BitField),
    Regex(Regex),
    DateTime(DateTime<Utc>),
    Filter(Filter),
}

impl StackValue {
    pub fn kind(&self) -> Kind {
        match self {
            StackValue::Value(_) => Kind::Value,
            StackValue::List(_) => Kind::List,
            StackValue::Map(_) => Kind::Map,
            StackValue::Entity(_) => Kind::Entity,
            StackValue::EntitySet(_) => Kind::EntitySet,
            StackValue::Component(_) => Kind::Component,
            StackValue::ComponentDef(_) => Kind::ComponentDef,
            StackValue::ComponentAttr(_) => Kind::ComponentAttr,
            StackValue::BitField(_) => Kind::BitField,
            StackValue::Regex(_) => Kind::Regex,
            StackValue::DateTime(_) => Kind::DateTime,
            StackValue::Filter(_) => Kind::Filter,
        }
    }

    pub fn nil() -> Self {
        StackValue::Value(Value::Nil)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            StackValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_list(&self) -> Option<&[StackValue]> {
        match self {
            StackValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// False-like: nil, false, zero, the empty string
    pub fn is_truthy(&self) -> bool {
        match self {
            StackValue::Value(v) => v.is_truthy(),
            _ => true,
        }
    }

    /// Convert to JSON for storage in component fields
    pub fn to_json(&self) -> Json {
        match self {
            StackValue::Value(v) => v.to_json(),
            StackValue::List(items) => Json::Array(items.iter().map(StackValue::to_json).collect()),
            StackValue::Map(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            StackValue::DateTime(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            StackValue::Regex(re) => Json::String(re.as_str().to_string()),
            StackValue::Component(c) => Json::Object(c.to_record(None)),
            StackValue::Entity(e) => Json::from(e.id),
            other => Json::String(other.to_string()),
        }
    }

    pub fn from_json(json: &Json) -> StackValue {
        match json {
            Json::Null => StackValue::nil(),
            Json::Bool(b) => StackValue::Value(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => StackValue::Value(Value::Int(i)),
                None => StackValue::Value(Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Json::String(s) => StackValue::Value(Value::Str(s.clone())),
            Json::Array(items) => StackValue::List(items.iter().map(StackValue::from_json).collect()),
            Json::Object(map) => StackValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), StackValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Component fields from a map value
    pub fn to_json_object(map: &BTreeMap<String, StackValue>) -> JsonMap<String, Json> {
        map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
    }
}

impl PartialEq for StackValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StackValue::Value(a), StackValue::Value(b)) => a.loose_eq(b),
            (StackValue::List(a), StackValue::List(b)) => a == b,
            (StackValue::Map(a), StackValue::Map(b)) => a == b,
            (StackValue::Entity(a), StackValue::Entity(b)) => a == b,
            (StackValue::EntitySet(a), StackValue::EntitySet(b)) => a == b,
            (StackValue::Component(a), StackValue::Component(b)) => a == b,
            (StackValue::ComponentDef(a), StackValue::ComponentDef(b)) => a == b,
            (StackValue::ComponentAttr(a), StackValue::ComponentAttr(b)) => a == b,
            (StackValue::BitField(a), StackValue::BitField(b)) => a == b,
            (StackValue::Regex(a), StackValue::Regex(b)) => a.as_str() == b.as_str(),
            (StackValue::DateTime(a), StackValue::DateTime(b)) => a == b,
            (StackValue::Filter(a), StackValue::Filter(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for StackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackValue::Value(v) => write!(f, "{}", v),
            StackValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(" "))
            }
            StackValue::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{} {}", Json::String(k.clone()), v))
                    .collect();
                write!(f, "{{{}}}", parts.join(" "))
            }
            StackValue::Entity(e) => write!(f, "(e {} {})", e.id, e.bitfield),
            StackValue::EntitySet(handle) => {
                let uuid = handle.uuid();
                write!(f, "(es {})", uuid.get(..8).unwrap_or(uuid))
            }
            StackValue::Component(c) => {
                write!(f, "(c {} {})", c.id(), Json::Object(c.attributes.clone()))
            }
            StackValue::ComponentDef(d) => write!(f, "(d {} {})", d.id, d.uri),
            StackValue::ComponentAttr(ca) => write!(f, "{}", ca),
            StackValue::BitField(bf) => write!(f, "{}", bf),
            StackValue::Regex(re) => write!(f, "~r/{}/", re.as_str()),
            StackValue::DateTime(dt) => {
                write!(f, "~d|{}|", dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            StackValue::Filter(filter) => write!(f, "{}", filter),
        }
    }
}

impl From<Value> for StackValue {
    fn from(v: Value) -> Self {
        StackValue::Value(v)
    }
}

impl From<i64> for StackValue {
    fn from(i: i64) -> Self {
        StackValue::Value(Value::Int(i))
    }
}

impl From<bool> for StackValue {
    fn from(b: bool) -> Self {
        StackValue::Value(Value::Bool(b))
    }
}

impl From<&str> for StackValue {
    fn from(s: &str) -> Self {
        StackValue::Value(Value::Str(s.to_string()))
    }
}

impl From<Vec<StackValue>> for StackValue {
    fn from(items: Vec<StackValue>) -> Self {
        StackValue::List(items)
    }
}

impl From<Entity> for StackValue {
    fn from(e: Entity) -> Self {
        StackValue::Entity(e)
    }
}

impl From<Component> for StackValue {
    fn from(c: Component) -> Self {
        StackValue::Component(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quoted_parse() {
        assert_eq!(Quoted::parse("swap"), Quoted::Word("swap".into()));
        assert_eq!(Quoted::parse("**name"), Quoted::Escaped(2, "name".into()));
        assert_eq!(Quoted::parse("$x"), Quoted::Ref("x".into()));
        assert_eq!(Quoted::parse("^1"), Quoted::BackRef("1".into()));
        assert_eq!(
            Quoted::parse("/component/title#text"),
            Quoted::AttrPath("/component/title#text".into())
        );
        assert_eq!(Quoted::Escaped(2, "name".into()).to_string(), "**name");
    }

    #[test]
    fn test_truthiness() {
        assert!(!StackValue::nil().is_truthy());
        assert!(!StackValue::from(0).is_truthy());
        assert!(!StackValue::from("").is_truthy());
        assert!(!StackValue::from(false).is_truthy());
        assert!(StackValue::List(vec![]).is_truthy());
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(StackValue::from(2), StackValue::Value(Value::Float(2.0)));
        assert_ne!(StackValue::from(2), StackValue::from("2"));
    }

    #[test]
    fn test_json_conversion() {
        let json = json!({ "a": [1, 2.5, "x"], "b": null });
        let value = StackValue::from_json(&json);
        assert_eq!(value.to_json(), json);
        assert_eq!(value.to_string(), r#"{"a" [1 2.5 "x"] "b" nil}"#);
    }
}
