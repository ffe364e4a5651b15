//! Shared types for entstack
//!
//! This crate provides the identifier types used by both the storage layer
//! and the query language, plus the source span type used for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity identifier
///
/// `0` is reserved to mean "not yet assigned"; stores allocate ids from 1.
pub type EntityId = u32;

/// Component definition identifier
///
/// Def ids are dense, start at 1 and double as bit positions.
pub type DefId = u16;

/// The reserved "no entity" id
pub const UNASSIGNED: EntityId = 0;

/// Compound primary key of a stored component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    pub entity: EntityId,
    pub def: DefId,
}

impl ComponentId {
    pub fn new(entity: EntityId, def: DefId) -> Self {
        Self { entity, def }
    }
}

impl From<(EntityId, DefId)> for ComponentId {
    fn from((entity, def): (EntityId, DefId)) -> Self {
        Self { entity, def }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.def)
    }
}

/// Byte range in query source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
