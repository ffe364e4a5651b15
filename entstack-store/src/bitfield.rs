//! Bitfields over def ids
//!
//! A `BitField` is both an entity's shape (which defs it carries) and a
//! query mask. As a mask it is read through its [`BitOp`]:
//!
//! | op       | an entity matches when it has...     |
//! |----------|--------------------------------------|
//! | `And`    | every set bit                        |
//! | `Or`     | at least one set bit                 |
//! | `Not`    | none of the set bits                 |
//! | `NotAll` | not every set bit (missing one+)     |
//!
//! The `all` sentinel matches every entity regardless of shape.

use entstack_types::DefId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interpretation mode of a bitfield used as a mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitOp {
    #[default]
    And,
    Or,
    Not,
    NotAll,
}

impl BitOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BitOp::And => "and",
            BitOp::Or => "or",
            BitOp::Not => "not",
            BitOp::NotAll => "not-all",
        }
    }
}

/// Set of def ids stored as 64-bit words
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BitField {
    bits: Vec<u64>,
    op: BitOp,
    all: bool,
}

impl BitField {
    /// Creates an empty `And` bitfield
    pub fn new() -> Self {
        Self::default()
    }

    /// The sentinel that matches every entity
    pub fn all() -> Self {
        Self {
            bits: Vec::new(),
            op: BitOp::And,
            all: true,
        }
    }

    pub fn with_op(op: BitOp) -> Self {
        Self {
            bits: Vec::new(),
            op,
            all: false,
        }
    }

    pub fn from_ids(ids: impl IntoIterator<Item = DefId>) -> Self {
        let mut bf = Self::new();
        for id in ids {
            bf.set(id);
        }
        bf
    }

    pub fn op(&self) -> BitOp {
        self.op
    }

    pub fn set_op(&mut self, op: BitOp) {
        self.op = op;
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    /// Sets the bit for `id`
    pub fn set(&mut self, id: DefId) {
        let word_idx = id as usize / 64;
        let bit_idx = id as usize % 64;
        if word_idx >= self.bits.len() {
            self.bits.resize(word_idx + 1, 0);
        }
        self.bits[word_idx] |= 1 << bit_idx;
    }

    /// Clears the bit for `id`
    pub fn clear(&mut self, id: DefId) {
        let word_idx = id as usize / 64;
        let bit_idx = id as usize % 64;
        if let Some(word) = self.bits.get_mut(word_idx) {
            *word &= !(1 << bit_idx);
        }
        while self.bits.last() == Some(&0) {
            self.bits.pop();
        }
    }

    pub fn get(&self, id: DefId) -> bool {
        let word_idx = id as usize / 64;
        let bit_idx = id as usize % 64;
        self.bits
            .get(word_idx)
            .map(|word| word & (1 << bit_idx) != 0)
            .unwrap_or(false)
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Set def ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = DefId> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, word)| {
            (0..64usize).filter_map(move |bit| {
                if word & (1u64 << bit) != 0 {
                    Some((word_idx * 64 + bit) as DefId)
                } else {
                    None
                }
            })
        })
    }

    fn word(&self, idx: usize) -> u64 {
        self.bits.get(idx).copied().unwrap_or(0)
    }

    fn zip_with(&self, other: &BitField, f: impl Fn(u64, u64) -> u64) -> BitField {
        let len = self.bits.len().max(other.bits.len());
        let mut bits: Vec<u64> = (0..len).map(|i| f(self.word(i), other.word(i))).collect();
        while bits.last() == Some(&0) {
            bits.pop();
        }
        BitField {
            bits,
            op: self.op,
            all: false,
        }
    }

    pub fn union(&self, other: &BitField) -> BitField {
        let mut out = self.zip_with(other, |a, b| a | b);
        out.all = self.all || other.all;
        out
    }

    pub fn intersect(&self, other: &BitField) -> BitField {
        self.zip_with(other, |a, b| a & b)
    }

    pub fn difference(&self, other: &BitField) -> BitField {
        self.zip_with(other, |a, b| a & !b)
    }

    /// Does an entity with shape `entity` satisfy this mask?
    pub fn matches(&self, entity: &BitField) -> bool {
        if self.all {
            return true;
        }
        let len = self.bits.len();
        match self.op {
            BitOp::And => (0..len).all(|i| entity.word(i) & self.bits[i] == self.bits[i]),
            BitOp::Or => (0..len).any(|i| entity.word(i) & self.bits[i] != 0),
            BitOp::Not => (0..len).all(|i| entity.word(i) & self.bits[i] == 0),
            BitOp::NotAll => (0..len).any(|i| entity.word(i) & self.bits[i] != self.bits[i]),
        }
    }
}

impl PartialEq for BitField {
    fn eq(&self, other: &Self) -> bool {
        if self.all || other.all {
            return self.all == other.all;
        }
        let len = self.bits.len().max(other.bits.len());
        self.op == other.op && (0..len).all(|i| self.word(i) == other.word(i))
    }
}

impl Eq for BitField {}

impl FromIterator<DefId> for BitField {
    fn from_iter<I: IntoIterator<Item = DefId>>(iter: I) -> Self {
        BitField::from_ids(iter)
    }
}

impl fmt::Debug for BitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for BitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all {
            return write!(f, "bf(all)");
        }
        let ids: Vec<String> = self.ids().map(|id| id.to_string()).collect();
        write!(f, "bf({} {})", self.op.as_str(), ids.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_set_get_clear() {
        let mut bf = BitField::new();
        bf.set(3);
        bf.set(70);
        assert!(bf.get(3));
        assert!(bf.get(70));
        assert!(!bf.get(4));
        assert_eq!(bf.count(), 2);

        bf.clear(70);
        assert!(!bf.get(70));
        assert_eq!(bf.count(), 1);
        assert_eq!(bf.ids().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_match_modes() {
        let entity = BitField::from_ids([1, 2, 3]);

        let and = BitField::from_ids([1, 2]);
        assert!(and.matches(&entity));

        let mut or = BitField::from_ids([4, 3]);
        or.set_op(BitOp::Or);
        assert!(or.matches(&entity));

        let mut not = BitField::from_ids([4, 5]);
        not.set_op(BitOp::Not);
        assert!(not.matches(&entity));
        not.set(1);
        assert!(!not.matches(&entity));

        let mut not_all = BitField::from_ids([1, 4]);
        not_all.set_op(BitOp::NotAll);
        assert!(not_all.matches(&entity));

        assert!(BitField::all().matches(&BitField::new()));
    }

    #[test]
    fn test_display() {
        let bf = BitField::from_ids([2, 1]);
        assert_eq!(bf.to_string(), "bf(and 1,2)");
        assert_eq!(BitField::all().to_string(), "bf(all)");
    }

    proptest! {
        #[test]
        fn prop_count_matches_ids(ids in proptest::collection::btree_set(1u16..300, 0..40)) {
            let bf: BitField = ids.iter().copied().collect();
            prop_assert_eq!(bf.count(), ids.len());
            prop_assert_eq!(bf.ids().collect::<Vec<_>>(), ids.iter().copied().collect::<Vec<_>>());
        }

        #[test]
        fn prop_and_matches_superset(
            a in proptest::collection::btree_set(1u16..200, 0..20),
            b in proptest::collection::btree_set(1u16..200, 0..20),
        ) {
            let mask: BitField = a.iter().copied().collect();
            let entity: BitField = a.union(&b).copied().collect();
            prop_assert!(mask.matches(&entity));

            let diff = entity.difference(&mask);
            prop_assert_eq!(diff.count(), b.difference(&a).count());
        }
    }
}
