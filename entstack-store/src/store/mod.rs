//! The storage backend contract
//!
//! `EntityStore` is what every backend (in-memory, file, SQL, ...) provides.
//! The query layer only ever talks to a store through this trait, normally
//! behind a shared [`StoreRef`].

mod memory;

pub use memory::EntitySet;

use crate::bitfield::BitField;
use crate::changeset::ChangeSets;
use crate::component::{Component, Entity, Populate};
use crate::def::{ComponentDef, DefSchema};
use crate::error::{Result, StoreError};
use crate::registry::DefIdent;
use entstack_types::{ComponentId, DefId, EntityId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handle to a store
///
/// Mutations take the write lock for the whole batch, so readers never see
/// a partially applied call.
pub type StoreRef = Arc<RwLock<dyn EntityStore>>;

/// Wrap a store in a shared handle
pub fn shared<S: EntityStore + 'static>(store: S) -> StoreRef {
    Arc::new(RwLock::new(store))
}

/// Store behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Allow a uri to be re-registered with different content under a new id
    #[serde(default = "default_true")]
    pub allow_def_shadowing: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            allow_def_shadowing: true,
        }
    }
}

/// Options for a mutating call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Keep the change sets of the previous call instead of clearing them
    pub retain: bool,
    /// Log every individual change
    pub debug: bool,
}

impl AddOptions {
    pub fn retain() -> Self {
        Self {
            retain: true,
            debug: false,
        }
    }
}

/// Options for cloning a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    pub clone_entities: bool,
    pub clone_defs: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            clone_entities: true,
            clone_defs: true,
        }
    }
}

/// Anything that can be handed to [`EntityStore::add`]
#[derive(Debug, Clone, PartialEq)]
pub enum AddItem {
    Def(DefSchema),
    Entity(Entity),
    Component(Component),
    Many(Vec<AddItem>),
}

impl From<Entity> for AddItem {
    fn from(entity: Entity) -> Self {
        AddItem::Entity(entity)
    }
}

impl From<Component> for AddItem {
    fn from(component: Component) -> Self {
        AddItem::Component(component)
    }
}

impl From<DefSchema> for AddItem {
    fn from(schema: DefSchema) -> Self {
        AddItem::Def(schema)
    }
}

impl<T: Into<AddItem>> From<Vec<T>> for AddItem {
    fn from(items: Vec<T>) -> Self {
        AddItem::Many(items.into_iter().map(Into::into).collect())
    }
}

/// Storage backend contract
pub trait EntityStore: Send + Sync {
    /// Unique id of this store instance
    fn uuid(&self) -> String;

    fn config(&self) -> &StoreConfig;

    /// Register a component schema, idempotent on content
    fn register(&mut self, schema: DefSchema) -> Result<ComponentDef>;

    fn def_by_id(&self, id: DefId) -> Option<ComponentDef>;

    /// The newest def registered under `uri`
    fn def_by_uri(&self, uri: &str) -> Option<ComponentDef>;

    fn def_by_hash(&self, hash: &str) -> Option<ComponentDef>;

    /// All registered defs in id order
    fn defs(&self) -> Vec<ComponentDef>;

    fn def(&self, ident: &DefIdent) -> Option<ComponentDef> {
        match ident {
            DefIdent::Id(id) => self.def_by_id(*id),
            DefIdent::Uri(uri) => self.def_by_uri(uri),
            DefIdent::Hash(hash) => self.def_by_hash(hash),
        }
    }

    /// Build a bitfield from any mixture of identifier forms
    fn resolve_def_ids(&self, idents: &[DefIdent], strict: bool) -> Result<BitField> {
        let mut bf = BitField::new();
        for ident in idents {
            match self.def(ident) {
                Some(def) => bf.set(def.id),
                None if strict => return Err(StoreError::DefNotFound(ident.to_string())),
                None => {}
            }
        }
        Ok(bf)
    }

    /// Apply a batch of defs, entities and components as one step
    fn add(&mut self, item: AddItem, options: AddOptions) -> Result<&ChangeSets>;

    fn remove_components(&mut self, ids: &[ComponentId], options: AddOptions) -> Result<&ChangeSets>;

    /// Remove entities together with all of their components
    fn remove_entities(&mut self, ids: &[EntityId], options: AddOptions) -> Result<&ChangeSets>;

    fn remove_component(&mut self, id: ComponentId) -> Result<&ChangeSets> {
        self.remove_components(&[id], AddOptions::default())
    }

    fn remove_entity(&mut self, id: EntityId) -> Result<&ChangeSets> {
        self.remove_entities(&[id], AddOptions::default())
    }

    fn get_entity(&self, id: EntityId, populate: Populate) -> Option<Entity>;

    fn get_component(&self, id: ComponentId) -> Option<Component>;

    /// Shape of a stored entity
    fn entity_bitfield(&self, id: EntityId) -> Option<BitField>;

    /// Every stored entity id, ascending; a fresh iterator per call
    fn entity_ids(&self) -> Box<dyn Iterator<Item = EntityId> + '_>;

    /// Every stored component, ordered by component id
    fn components(&self) -> Box<dyn Iterator<Item = Component> + '_>;

    fn entity_count(&self) -> usize;

    fn component_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// Change sets produced by the last mutating call(s)
    fn changes(&self) -> &ChangeSets;

    fn clear_changes(&mut self);

    fn clone_store(&self, options: CloneOptions) -> Result<Box<dyn EntityStore>>;
}
