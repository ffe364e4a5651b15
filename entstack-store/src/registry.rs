//! Component definition registry
//!
//! Assigns each registered schema a dense def id starting at 1. Registration
//! is idempotent on content hash. Registering changed content under an
//! existing uri produces a new id (the uri then resolves to the newest def)
//! while components of the old def keep referencing the old id.

use crate::bitfield::BitField;
use crate::def::{ComponentDef, DefSchema};
use crate::error::{Result, StoreError};
use entstack_types::DefId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A def identifier in any of its accepted forms
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefIdent {
    Id(DefId),
    Uri(String),
    Hash(String),
}

impl DefIdent {
    /// Strings starting with `/` are uris, anything else is taken as a hash
    pub fn parse(text: &str) -> Self {
        if text.starts_with('/') {
            DefIdent::Uri(text.to_string())
        } else {
            DefIdent::Hash(text.to_string())
        }
    }
}

impl From<DefId> for DefIdent {
    fn from(id: DefId) -> Self {
        DefIdent::Id(id)
    }
}

impl From<&str> for DefIdent {
    fn from(text: &str) -> Self {
        DefIdent::parse(text)
    }
}

impl fmt::Display for DefIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefIdent::Id(id) => write!(f, "{}", id),
            DefIdent::Uri(uri) => write!(f, "{}", uri),
            DefIdent::Hash(hash) => write!(f, "#{}", hash),
        }
    }
}

/// Outcome of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Content was new; a fresh id was allocated
    Created(DefId),
    /// Identical content was already registered
    Existing(DefId),
    /// The uri existed with other content; the new id shadows the old one
    Shadowed { id: DefId, previous: DefId },
}

impl Registration {
    pub fn id(&self) -> DefId {
        match self {
            Registration::Created(id) | Registration::Existing(id) => *id,
            Registration::Shadowed { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefRegistry {
    defs: Vec<ComponentDef>,
    by_uri: HashMap<String, DefId>,
    by_hash: HashMap<String, DefId>,
}

impl DefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema
    ///
    /// With `allow_shadowing` off, changed content under a known uri is a
    /// `SchemaConflict` instead of a new id.
    pub fn register(&mut self, schema: DefSchema, allow_shadowing: bool) -> Result<Registration> {
        let hash = schema.content_hash();
        if let Some(&id) = self.by_hash.get(&hash) {
            return Ok(Registration::Existing(id));
        }

        let previous = self.by_uri.get(&schema.uri).copied();
        if let (Some(existing), false) = (previous, allow_shadowing) {
            return Err(StoreError::SchemaConflict {
                uri: schema.uri,
                existing,
            });
        }

        let id = DefId::try_from(self.defs.len() + 1).map_err(|_| StoreError::IdsExhausted("def"))?;
        self.by_uri.insert(schema.uri.clone(), id);
        self.by_hash.insert(hash.clone(), id);
        self.defs.push(ComponentDef {
            id,
            uri: schema.uri,
            name: schema.name,
            properties: schema.properties,
            hash,
        });

        Ok(match previous {
            Some(previous) => Registration::Shadowed { id, previous },
            None => Registration::Created(id),
        })
    }

    pub fn get_by_id(&self, id: DefId) -> Option<&ComponentDef> {
        if id == 0 {
            return None;
        }
        self.defs.get(id as usize - 1)
    }

    /// The newest def registered under `uri`
    pub fn get_by_uri(&self, uri: &str) -> Option<&ComponentDef> {
        self.by_uri.get(uri).and_then(|id| self.get_by_id(*id))
    }

    pub fn get_by_hash(&self, hash: &str) -> Option<&ComponentDef> {
        self.by_hash.get(hash).and_then(|id| self.get_by_id(*id))
    }

    pub fn get(&self, ident: &DefIdent) -> Option<&ComponentDef> {
        match ident {
            DefIdent::Id(id) => self.get_by_id(*id),
            DefIdent::Uri(uri) => self.get_by_uri(uri),
            DefIdent::Hash(hash) => self.get_by_hash(hash),
        }
    }

    /// Build a bitfield from a mixture of identifiers
    ///
    /// With `strict`, the first unresolvable identifier is a `DefNotFound`;
    /// otherwise unknown identifiers are skipped.
    pub fn resolve_def_ids(&self, idents: &[DefIdent], strict: bool) -> Result<BitField> {
        let mut bf = BitField::new();
        for ident in idents {
            match self.get(ident) {
                Some(def) => bf.set(def.id),
                None if strict => return Err(StoreError::DefNotFound(ident.to_string())),
                None => {}
            }
        }
        Ok(bf)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
