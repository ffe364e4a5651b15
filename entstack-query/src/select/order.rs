//! Result ordering by a component attribute

use super::filter::field_datetime;
use crate::value::ComponentAttr;
use entstack_store::{EntityStore, PropertyType};
use entstack_types::{ComponentId, EntityId};
use serde_json::Value as Json;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub attr: ComponentAttr,
    pub direction: Direction,
}

/// Sort key extracted once per entity
#[derive(Debug, PartialEq, PartialOrd)]
enum Key {
    Text(String),
    Number(f64),
    Other(String),
}

fn key_for(field: &Json, ty: PropertyType) -> Option<Key> {
    match ty {
        PropertyType::String => field.as_str().map(|s| Key::Text(s.to_lowercase())),
        PropertyType::Integer | PropertyType::Number => field.as_f64().map(Key::Number),
        PropertyType::DateTime => field_datetime(field).map(|dt| Key::Number(dt.timestamp_millis() as f64)),
        PropertyType::Boolean | PropertyType::Json => Some(Key::Other(field.to_string())),
    }
}

impl OrderBy {
    /// Stable sort; entities without the attribute go last either way
    pub fn sort(&self, store: &dyn EntityStore, ids: &mut Vec<EntityId>) {
        let def = match self.attr.def().and_then(|id| store.def_by_id(id)) {
            Some(def) => def,
            None => return,
        };
        let field_name = self.attr.pointer.trim_start_matches('/').split('/').next().unwrap_or("");
        let ty = def.property(field_name).map(|p| p.ty).unwrap_or(PropertyType::Json);

        let mut keyed: Vec<(EntityId, Option<Key>)> = ids
            .iter()
            .map(|&id| {
                let key = store
                    .get_component(ComponentId::new(id, def.id))
                    .and_then(|c| c.pointer(&self.attr.pointer).and_then(|field| key_for(field, ty)));
                (id, key)
            })
            .collect();

        keyed.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => {
                let ordering = a.partial_cmp(b).unwrap_or(Ordering::Equal);
                match self.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        *ids = keyed.into_iter().map(|(id, _)| id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entstack_store::{AddOptions, Component, DefSchema, Entity, EntitySet};
    use serde_json::json;

    fn store() -> EntitySet {
        let mut es = EntitySet::new();
        let def = es
            .register(
                DefSchema::new("/component/note")
                    .property("title", PropertyType::String)
                    .property("rank", PropertyType::Integer)
                    .property("due", PropertyType::DateTime),
            )
            .unwrap();
        let notes = [
            (1, json!({"title": "banana", "rank": 10, "due": "2021-03-01"})),
            (2, json!({"title": "Apple", "rank": 9})),
            (3, json!({"title": "cherry", "due": "2020-01-01T00:00:00Z"})),
        ];
        for (id, fields) in notes {
            let mut c = Component::new(def.id);
            if let Json::Object(map) = fields {
                c.attributes = map;
            }
            es.add(Entity::new(id).with_component(c).into(), AddOptions::default())
                .unwrap();
        }
        es
    }

    fn sorted(pointer: &str, direction: Direction) -> Vec<EntityId> {
        let es = store();
        let order = OrderBy {
            attr: ComponentAttr::new(1, pointer),
            direction,
        };
        let mut ids = vec![1, 2, 3];
        order.sort(&es, &mut ids);
        ids
    }

    #[test]
    fn test_strings_ignore_case() {
        assert_eq!(sorted("title", Direction::Asc), vec![2, 1, 3]);
        assert_eq!(sorted("title", Direction::Desc), vec![3, 1, 2]);
    }

    #[test]
    fn test_numbers_with_missing_last() {
        assert_eq!(sorted("rank", Direction::Asc), vec![2, 1, 3]);
        assert_eq!(sorted("rank", Direction::Desc), vec![1, 2, 3]);
    }

    #[test]
    fn test_dates() {
        assert_eq!(sorted("due", Direction::Asc), vec![3, 1, 2]);
    }
}
