//! # entstack storage model
//!
//! Entities are bare ids whose shape is a [`BitField`] over registered
//! component definitions. Components are open records keyed by
//! `(entity, def)`. Every mutating call is applied as one batch and reports
//! what it did through a pair of [`ChangeSets`].
//!
//! ## Example
//!
//! ```
//! use entstack_store::{AddOptions, Component, DefSchema, Entity, EntitySet, EntityStore, PropertyType, Populate};
//!
//! let mut es = EntitySet::new();
//! let title = es
//!     .register(DefSchema::new("/component/title").property("text", PropertyType::String))
//!     .unwrap();
//!
//! let e = Entity::new(100).with_component(Component::new(title.id).with("text", "get out of bed"));
//! es.add(e.into(), AddOptions::default()).unwrap();
//!
//! assert_eq!(es.get_entity(100, Populate::All).unwrap().size(), 1);
//! ```

pub mod bitfield;
pub mod changeset;
pub mod component;
pub mod def;
pub mod error;
pub mod registry;
pub mod store;

pub use bitfield::{BitField, BitOp};
pub use changeset::{ChangeSet, ChangeSets};
pub use component::{Component, Entity, Populate, DEF_HASH_FIELD, DEF_ID_FIELD, DEF_URI_FIELD, ENTITY_ID_FIELD};
pub use def::{ComponentDef, DefSchema, PropertySpec, PropertyType};
pub use error::{Result, StoreError};
pub use registry::{DefIdent, DefRegistry, Registration};
pub use store::{shared, AddItem, AddOptions, CloneOptions, EntitySet, EntityStore, StoreConfig, StoreRef};

pub use entstack_types::{ComponentId, DefId, EntityId, UNASSIGNED};
