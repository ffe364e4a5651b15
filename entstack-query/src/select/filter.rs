//! Compiled filter trees and their evaluation over candidate entities

use crate::stack::parse_datetime;
use crate::value::{ComponentAttr, StackValue};
use crate::words::{compare_values, values_equal};
use chrono::{DateTime, Utc};
use entstack_store::EntityStore;
use entstack_types::{ComponentId, EntityId};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        }
    }
}

/// A predicate over entities built by a select program
///
/// Leaves read one attribute: `attr op operand`. The operand's kind picks
/// the test: a list means membership, a regex a pattern match, a date a
/// timestamp comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Compare {
        op: CompareOp,
        attr: ComponentAttr,
        operand: Box<StackValue>,
    },
}

impl Filter {
    pub fn compare(op: CompareOp, attr: ComponentAttr, operand: StackValue) -> Self {
        Filter::Compare {
            op,
            attr,
            operand: Box::new(operand),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    /// Candidates passing the filter, in candidate order
    pub fn apply(&self, store: &dyn EntityStore, candidates: &[EntityId]) -> Vec<EntityId> {
        match self {
            Filter::And(left, right) => {
                let left = left.apply(store, candidates);
                if left.is_empty() {
                    return left;
                }
                right.apply(store, &left)
            }
            Filter::Or(left, right) => {
                let mut hits: BTreeSet<EntityId> = left.apply(store, candidates).into_iter().collect();
                hits.extend(right.apply(store, candidates));
                candidates.iter().copied().filter(|id| hits.contains(id)).collect()
            }
            Filter::Compare { op, attr, operand } => candidates
                .iter()
                .copied()
                .filter(|&id| compare_entity(store, id, *op, attr, operand))
                .collect(),
        }
    }
}

fn compare_entity(store: &dyn EntityStore, id: EntityId, op: CompareOp, attr: &ComponentAttr, operand: &StackValue) -> bool {
    match store.entity_bitfield(id) {
        Some(shape) if attr.bitfield.matches(&shape) => {}
        _ => return false,
    }
    attr.bitfield.ids().any(|def| {
        store
            .get_component(ComponentId::new(id, def))
            .and_then(|c| c.pointer(&attr.pointer).cloned())
            .map(|field| compare_field(&field, op, operand))
            .unwrap_or(false)
    })
}

/// Test one field value; a missing field never reaches here
pub(crate) fn compare_field(field: &Json, op: CompareOp, operand: &StackValue) -> bool {
    match operand {
        StackValue::List(items) => {
            let found = items.iter().any(|item| values_equal(&StackValue::from_json(field), item));
            match op {
                CompareOp::Eq => found,
                CompareOp::Ne => !found,
                _ => false,
            }
        }
        StackValue::Regex(re) => {
            let found = match field {
                Json::String(s) => re.is_match(s),
                Json::Array(items) => items.iter().any(|i| i.as_str().map(|s| re.is_match(s)).unwrap_or(false)),
                _ => false,
            };
            match op {
                CompareOp::Eq => found,
                CompareOp::Ne => !found,
                _ => false,
            }
        }
        StackValue::DateTime(when) => field_datetime(field)
            .map(|value| op.test(value.cmp(when)))
            .unwrap_or(false),
        StackValue::Value(_) => match field {
            Json::Array(items) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
                let found = items.iter().any(|i| StackValue::from_json(i) == *operand);
                (op == CompareOp::Eq) == found
            }
            _ => {
                let value = StackValue::from_json(field);
                match op {
                    CompareOp::Eq => value == *operand,
                    CompareOp::Ne => value != *operand,
                    _ => compare_values(&value, operand).map(|o| op.test(o)).unwrap_or(false),
                }
            }
        },
        _ => false,
    }
}

/// A date field stored as text or as epoch milliseconds
pub(crate) fn field_datetime(field: &Json) -> Option<DateTime<Utc>> {
    match field {
        Json::String(s) => parse_datetime(s),
        Json::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(l, r) => write!(f, "(and {} {})", l, r),
            Filter::Or(l, r) => write!(f, "(or {} {})", l, r),
            Filter::Compare { op, attr, operand } => {
                write!(f, "({} {} {})", op, attr, operand)
            }
        }
    }
}

impl From<Filter> for StackValue {
    fn from(filter: Filter) -> Self {
        StackValue::Filter(filter)
    }
}
