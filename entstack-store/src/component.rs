//! Entities and components

use crate::bitfield::BitField;
use crate::def::ComponentDef;
use entstack_types::{ComponentId, DefId, EntityId, UNASSIGNED};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved field carrying the owning entity id across text boundaries
pub const ENTITY_ID_FIELD: &str = "@e";
/// Reserved field carrying the def id
pub const DEF_ID_FIELD: &str = "@d";
/// Reserved field carrying the def uri
pub const DEF_URI_FIELD: &str = "@du";
/// Reserved field carrying the def content hash
pub const DEF_HASH_FIELD: &str = "@dh";

/// A component: an open record of fields owned by one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub entity: EntityId,
    pub def: DefId,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Component {
    pub fn new(def: DefId) -> Self {
        Self {
            entity: UNASSIGNED,
            def,
            attributes: Map::new(),
        }
    }

    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = entity;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> ComponentId {
        ComponentId::new(self.entity, self.def)
    }

    pub fn has_entity(&self) -> bool {
        self.entity != UNASSIGNED
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Resolve a JSON pointer (`/a/b`) or bare field name against the fields
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        let pointer = pointer.trim_start_matches('#');
        if pointer.starts_with('/') {
            let mut segments = pointer[1..].splitn(2, '/');
            let head = segments.next()?;
            let value = self.attributes.get(head)?;
            match segments.next() {
                Some(rest) => value.pointer(&format!("/{}", rest)),
                None => Some(value),
            }
        } else {
            self.attributes.get(pointer)
        }
    }

    /// Field content equality, ignoring identity
    pub fn same_content(&self, other: &Component) -> bool {
        self.def == other.def && self.attributes == other.attributes
    }

    /// The component as a record with reserved identity fields
    ///
    /// With its def at hand the record also names the def by uri and content
    /// hash, so a shadowed def can still be told apart from the newest one.
    pub fn to_record(&self, def: Option<&ComponentDef>) -> Map<String, Value> {
        let mut record = Map::new();
        if self.has_entity() {
            record.insert(ENTITY_ID_FIELD.to_string(), Value::from(self.entity));
        }
        record.insert(DEF_ID_FIELD.to_string(), Value::from(self.def));
        if let Some(def) = def {
            record.insert(DEF_URI_FIELD.to_string(), Value::from(def.uri.as_str()));
            record.insert(DEF_HASH_FIELD.to_string(), Value::from(def.hash.as_str()));
        }
        for (key, value) in &self.attributes {
            record.insert(key.clone(), value.clone());
        }
        record
    }
}

/// What to hydrate when fetching an entity
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Populate {
    /// Shape only
    #[default]
    None,
    All,
    /// Only components whose def is set in the bitfield
    Only(BitField),
}

impl Populate {
    pub fn includes(&self, def: DefId) -> bool {
        match self {
            Populate::None => false,
            Populate::All => true,
            Populate::Only(bf) => bf.is_all() || bf.get(def),
        }
    }
}

impl From<bool> for Populate {
    fn from(all: bool) -> Self {
        if all {
            Populate::All
        } else {
            Populate::None
        }
    }
}

/// An entity: id, shape, and (possibly partial) components
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub bitfield: BitField,
    pub components: BTreeMap<DefId, Component>,
}

impl Entity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            bitfield: BitField::new(),
            components: BTreeMap::new(),
        }
    }

    /// Attach a component, keeping the bitfield in step
    pub fn add_component(&mut self, mut component: Component) {
        component.entity = self.id;
        self.bitfield.set(component.def);
        self.components.insert(component.def, component);
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.add_component(component);
        self
    }

    pub fn remove_component(&mut self, def: DefId) -> Option<Component> {
        self.bitfield.clear(def);
        self.components.remove(&def)
    }

    pub fn component(&self, def: DefId) -> Option<&Component> {
        self.components.get(&def)
    }

    pub fn size(&self) -> usize {
        self.bitfield.count()
    }

    /// Re-home every component onto a new id
    pub fn set_id(&mut self, id: EntityId) {
        self.id = id;
        for component in self.components.values_mut() {
            component.entity = id;
        }
    }
}
