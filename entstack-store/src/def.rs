//! Component definitions (schemas)

use entstack_types::DefId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Declared type of a def property
///
/// Only used for ordering and comparison; values are not coerced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    #[serde(rename = "datetime")]
    DateTime,
    Json,
}

impl PropertyType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Some(PropertyType::String),
            "integer" | "int" => Some(PropertyType::Integer),
            "number" | "float" => Some(PropertyType::Number),
            "boolean" | "bool" => Some(PropertyType::Boolean),
            "datetime" | "date" => Some(PropertyType::DateTime),
            "json" | "object" | "array" | "any" => Some(PropertyType::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::DateTime => "datetime",
            PropertyType::Json => "json",
        }
    }
}

/// One property of a component schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Unregistered schema as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefSchema {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl DefSchema {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.push(PropertySpec::new(name, ty));
        self
    }

    /// Content hash over the normalized schema
    ///
    /// Property order is part of the content; the display name is not.
    pub fn content_hash(&self) -> String {
        let canonical = json!({
            "uri": self.uri,
            "properties": self
                .properties
                .iter()
                .map(|p| json!([p.name, p.ty.as_str(), p.default]))
                .collect::<Vec<_>>(),
        });
        let digest = blake3::hash(canonical.to_string().as_bytes());
        digest.to_hex()[..16].to_string()
    }
}

/// A registered component definition
///
/// Immutable once registered; changed content always gets a fresh id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub id: DefId,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub properties: Vec<PropertySpec>,
    pub hash: String,
}

impl ComponentDef {
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Schema this def was registered from
    pub fn schema(&self) -> DefSchema {
        DefSchema {
            uri: self.uri.clone(),
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }

    /// Fields every fresh component of this def starts with
    pub fn defaults(&self) -> serde_json::Map<String, Value> {
        self.properties
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }
}
