//! Words that build store values or talk to the attached entity set
//!
//! Mutating words (`+`, `-`) leave the entity set on the stack so calls
//! chain; reading words (`get`, `select`, `@defs`) consume it.

use super::Dictionary;
use crate::error::{QueryError, Result};
use crate::select::select_word;
use crate::stack::{Flow, QueryStack};
use crate::value::{ComponentAttr, Kind, StackValue, StoreHandle, Value};
use entstack_store::{
    AddItem, AddOptions, BitField, BitOp, Component, ComponentDef, DefIdent, DefSchema, Entity, EntityStore, Populate,
    PropertySpec, PropertyType, DEF_HASH_FIELD, DEF_ID_FIELD, DEF_URI_FIELD, ENTITY_ID_FIELD,
};
use entstack_types::{ComponentId, EntityId};
use std::collections::BTreeMap;

pub(super) fn register(dict: &mut Dictionary) {
    use Kind::*;
    dict.add("@es", &[], entity_set)
        .add("@defs", &[EntitySet], defs)
        .add("!d", &[List], build_def)
        .add("!d", &[Map], build_def)
        .add("!d", &[Value], build_def)
        .add("!c", &[List], build_components)
        .add("!c", &[Map], build_components)
        .add("!c", &[Value], build_components)
        .add("!c", &[ComponentDef], build_components)
        .add("!e", &[Value], build_entity)
        .add("!e", &[List], build_entity)
        .add("!bf", &[List], build_bitfield)
        .add("!bf", &[Value], build_bitfield)
        .add("!ca", &[BitField, Value], build_attr_from_bitfield)
        .add("!ca", &[List], build_attr)
        .add("!ca", &[Value], build_attr)
        .add("+", &[EntitySet, Any], add)
        .add("+", &[Entity, Component], attach)
        .add("+", &[Entity, List], attach)
        .add("-", &[EntitySet, Any], remove)
        .add("remove", &[EntitySet, Any], remove)
        .add("get", &[EntitySet, Value], get_entity)
        .add("get", &[EntitySet, List], get_entity)
        .add("get", &[Entity, Value], get_component)
        .add("select", &[EntitySet, List], select_word);
}

fn entity_set(stack: &mut QueryStack) -> Result<Flow> {
    let store = stack.store()?;
    stack.push(StackValue::EntitySet(StoreHandle::new(store)));
    Ok(Flow::Continue)
}

fn defs(stack: &mut QueryStack) -> Result<Flow> {
    let handle = stack.pop_store()?;
    let defs = handle.store.read().defs();
    stack.push(StackValue::List(defs.into_iter().map(StackValue::ComponentDef).collect()));
    Ok(Flow::Continue)
}

fn property_spec(stack: &QueryStack, value: &StackValue) -> Result<PropertySpec> {
    match value {
        StackValue::Value(v) => match v.as_name() {
            Some(name) => Ok(PropertySpec::new(name, PropertyType::default())),
            None => Err(stack.invalid(format!("invalid property {}", v))),
        },
        StackValue::Map(map) => {
            let name = map
                .get("name")
                .and_then(|v| v.as_value())
                .and_then(Value::as_name)
                .ok_or_else(|| stack.invalid("property needs a name"))?;
            let ty = match map.get("type").and_then(|v| v.as_value()).and_then(Value::as_name) {
                Some(ty) => PropertyType::parse(ty).ok_or_else(|| stack.invalid(format!("unknown property type '{}'", ty)))?,
                None => PropertyType::default(),
            };
            let mut spec = PropertySpec::new(name, ty);
            if let Some(default) = map.get("default") {
                spec = spec.with_default(default.to_json());
            }
            Ok(spec)
        }
        other => Err(stack.invalid(format!("invalid property {}", other))),
    }
}

fn properties(stack: &QueryStack, value: &StackValue) -> Result<Vec<PropertySpec>> {
    match value {
        StackValue::List(items) => items.iter().map(|item| property_spec(stack, item)).collect(),
        other => Ok(vec![property_spec(stack, other)?]),
    }
}

fn name_of(value: &StackValue) -> Option<&str> {
    value.as_value().and_then(Value::as_name)
}

/// `["/uri" [props]] !d`, `["/uri" "a" "b"] !d`, `{uri: .. properties: [..]} !d` or `"/uri" !d`
fn build_def(stack: &mut QueryStack) -> Result<Flow> {
    let schema = match stack.pop()? {
        StackValue::List(items) => {
            let (first, rest) = items.split_first().ok_or_else(|| stack.invalid("def needs a uri"))?;
            let uri = name_of(first).ok_or_else(|| stack.invalid("def uri must be a string"))?;
            let mut schema = DefSchema::new(uri);
            for item in rest {
                schema.properties.extend(properties(stack, item)?);
            }
            schema
        }
        StackValue::Map(map) => {
            let uri = map
                .get("uri")
                .and_then(name_of)
                .ok_or_else(|| stack.invalid("def needs a uri"))?;
            let mut schema = DefSchema::new(uri);
            schema.name = map.get("name").and_then(name_of).map(str::to_string);
            if let Some(props) = map.get("properties") {
                schema.properties = properties(stack, props)?;
            }
            schema
        }
        StackValue::Value(v) => match v.as_name() {
            Some(uri) => DefSchema::new(uri),
            None => return Err(stack.invalid("def uri must be a string")),
        },
        other => return Err(stack.invalid(format!("cannot build a def from {}", other.kind()))),
    };

    let hash = schema.content_hash();
    stack.push(StackValue::ComponentDef(ComponentDef {
        id: 0,
        uri: schema.uri,
        name: schema.name,
        properties: schema.properties,
        hash,
    }));
    Ok(Flow::Continue)
}

/// Look up a registered def from an id, uri, hash or def value
pub(crate) fn resolve_def(stack: &QueryStack, store: &dyn EntityStore, ident: &StackValue) -> Result<ComponentDef> {
    let found = match ident {
        StackValue::Value(Value::Int(id)) => u16::try_from(*id).ok().and_then(|id| store.def_by_id(id)),
        StackValue::Value(v) => v.as_name().and_then(|name| store.def(&DefIdent::parse(name))),
        StackValue::ComponentDef(def) => store.def_by_hash(&def.hash),
        other => return Err(stack.invalid(format!("cannot identify a def from {}", other.kind()))),
    };
    found.ok_or_else(|| QueryError::DefNotFound(ident.to_string()))
}

/// A component from a record carrying `@dh`, `@du` or `@d`, and optionally `@e`
///
/// The hash names exact content and wins over the uri, which only names the
/// newest def registered under it.
fn component_from_map(
    stack: &QueryStack,
    store: &dyn EntityStore,
    mut map: BTreeMap<String, StackValue>,
) -> Result<Component> {
    let def_hash = map.remove(DEF_HASH_FIELD);
    let def_uri = map.remove(DEF_URI_FIELD);
    let def_id = map.remove(DEF_ID_FIELD);
    let def = match def_hash {
        Some(hash) => hash
            .as_value()
            .and_then(Value::as_name)
            .and_then(|hash| store.def_by_hash(hash))
            .ok_or_else(|| QueryError::DefNotFound(hash.to_string()))?,
        None => {
            let ident = def_uri
                .or(def_id)
                .ok_or_else(|| stack.invalid(format!("component needs {} or {}", DEF_ID_FIELD, DEF_URI_FIELD)))?;
            resolve_def(stack, store, &ident)?
        }
    };

    let mut component = Component::new(def.id);
    component.attributes = def.defaults();
    if let Some(entity) = map.remove(ENTITY_ID_FIELD) {
        let id = entity
            .as_i64()
            .and_then(|id| EntityId::try_from(id).ok())
            .ok_or_else(|| stack.invalid(format!("invalid entity id {}", entity)))?;
        component.entity = id;
    }
    component.attributes.extend(StackValue::to_json_object(&map));
    Ok(component)
}

fn component_from(stack: &QueryStack, store: &dyn EntityStore, value: StackValue) -> Result<Component> {
    match value {
        StackValue::Map(map) => component_from_map(stack, store, map),
        StackValue::Component(c) => Ok(c),
        ident => {
            let def = resolve_def(stack, store, &ident)?;
            let mut component = Component::new(def.id);
            component.attributes = def.defaults();
            Ok(component)
        }
    }
}

fn build_components(stack: &mut QueryStack) -> Result<Flow> {
    let store = stack.store()?;
    let value = stack.pop()?;
    let guard = store.read();
    let result = match value {
        StackValue::List(items) => StackValue::List(
            items
                .into_iter()
                .map(|item| component_from(stack, &*guard, item).map(StackValue::Component))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => StackValue::Component(component_from(stack, &*guard, other)?),
    };
    drop(guard);
    stack.push(result);
    Ok(Flow::Continue)
}

/// `100 !e`, or `[components] !e` for an entity awaiting an id
fn build_entity(stack: &mut QueryStack) -> Result<Flow> {
    let entity = match stack.pop()? {
        StackValue::Value(v) => {
            let id = v
                .as_i64()
                .and_then(|id| EntityId::try_from(id).ok())
                .ok_or_else(|| stack.invalid(format!("invalid entity id {}", v)))?;
            Entity::new(id)
        }
        StackValue::List(items) => {
            let mut entity = Entity::new(0);
            for item in items {
                match item {
                    StackValue::Component(c) => entity.add_component(c),
                    other => return Err(stack.invalid(format!("expected components, got {}", other.kind()))),
                }
            }
            entity
        }
        other => return Err(stack.invalid(format!("cannot build an entity from {}", other.kind()))),
    };
    stack.push(StackValue::Entity(entity));
    Ok(Flow::Continue)
}

/// Bitfield from ids, uris and hashes, with optional `all`, `and`, `or`,
/// `not` and `not-all` markers
pub(crate) fn resolve_bitfield(stack: &QueryStack, items: &[StackValue]) -> Result<BitField> {
    let mut op = BitOp::And;
    let mut idents = Vec::new();
    for item in items {
        match item {
            StackValue::Value(Value::Int(id)) => match u16::try_from(*id) {
                Ok(id) => idents.push(DefIdent::Id(id)),
                Err(_) => return Err(stack.invalid(format!("invalid def id {}", id))),
            },
            StackValue::ComponentDef(def) => idents.push(DefIdent::Hash(def.hash.clone())),
            StackValue::Value(v) => match v.as_name() {
                Some("all") | Some("*") => return Ok(BitField::all()),
                Some("and") => op = BitOp::And,
                Some("or") => op = BitOp::Or,
                Some("not") | Some("none") => op = BitOp::Not,
                Some("not-all") => op = BitOp::NotAll,
                Some(name) => idents.push(DefIdent::parse(name)),
                None => return Err(stack.invalid(format!("cannot resolve a def from {}", v))),
            },
            other => return Err(stack.invalid(format!("cannot resolve a def from {}", other.kind()))),
        }
    }

    if idents.is_empty() {
        return Ok(BitField::with_op(op));
    }
    let store = stack.store()?;
    let mut bf = store.read().resolve_def_ids(&idents, stack.config().strict_defs)?;
    bf.set_op(op);
    Ok(bf)
}

fn build_bitfield(stack: &mut QueryStack) -> Result<Flow> {
    let items = match stack.pop()? {
        StackValue::List(items) => items,
        other => vec![other],
    };
    let bf = resolve_bitfield(stack, &items)?;
    stack.push(StackValue::BitField(bf));
    Ok(Flow::Continue)
}

fn build_attr_from_bitfield(stack: &mut QueryStack) -> Result<Flow> {
    let pointer = stack.pop_name()?;
    let bitfield = stack.pop_bitfield()?;
    stack.push(StackValue::ComponentAttr(ComponentAttr { bitfield, pointer }));
    Ok(Flow::Continue)
}

/// `"/uri#pointer" !ca` or `["/uri" "pointer"] !ca`
fn build_attr(stack: &mut QueryStack) -> Result<Flow> {
    let path = match stack.pop()? {
        StackValue::List(items) => match items.as_slice() {
            [uri, pointer] => match (name_of(uri), name_of(pointer)) {
                (Some(uri), Some(pointer)) => format!("{}#{}", uri, pointer.trim_start_matches('#')),
                _ => return Err(stack.invalid("expected [uri pointer]")),
            },
            _ => return Err(stack.invalid("expected [uri pointer]")),
        },
        StackValue::Value(v) => match v.as_name() {
            Some(path) => path.to_string(),
            None => return Err(stack.invalid("expected \"/uri#pointer\"")),
        },
        other => return Err(stack.invalid(format!("cannot build an attribute from {}", other.kind()))),
    };
    let attr = stack.attr_path(&path)?;
    stack.push(attr);
    Ok(Flow::Continue)
}

fn add_item(stack: &QueryStack, store: &dyn EntityStore, value: StackValue) -> Result<AddItem> {
    Ok(match value {
        StackValue::ComponentDef(def) => AddItem::Def(def.schema()),
        StackValue::Entity(entity) => AddItem::Entity(entity),
        StackValue::Component(c) => AddItem::Component(c),
        StackValue::Map(map) => AddItem::Component(component_from_map(stack, store, map)?),
        StackValue::List(items) => AddItem::Many(
            items
                .into_iter()
                .map(|item| add_item(stack, store, item))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => return Err(stack.invalid(format!("cannot add {} to an entity set", other.kind()))),
    })
}

/// `es value +`
fn add(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    let handle = stack.pop_store()?;
    let item = {
        let guard = handle.store.read();
        add_item(stack, &*guard, value)?
    };
    handle.store.write().add(item, AddOptions::default())?;
    stack.push(StackValue::EntitySet(handle));
    Ok(Flow::Continue)
}

/// `entity component +`
fn attach(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    let mut entity = match stack.pop()? {
        StackValue::Entity(e) => e,
        other => return Err(stack.invalid(format!("expected an entity, got {}", other.kind()))),
    };
    let components = match value {
        StackValue::List(items) => items,
        other => vec![other],
    };
    for item in components {
        match item {
            StackValue::Component(c) => entity.add_component(c),
            other => return Err(stack.invalid(format!("expected a component, got {}", other.kind()))),
        }
    }
    stack.push(StackValue::Entity(entity));
    Ok(Flow::Continue)
}

fn collect_removals(
    stack: &QueryStack,
    value: StackValue,
    entities: &mut Vec<EntityId>,
    components: &mut Vec<ComponentId>,
) -> Result<()> {
    match value {
        StackValue::Entity(e) => entities.push(e.id),
        StackValue::Component(c) => components.push(c.id()),
        StackValue::List(items) => {
            for item in items {
                collect_removals(stack, item, entities, components)?;
            }
        }
        other => match other.as_i64().and_then(|id| EntityId::try_from(id).ok()) {
            Some(id) => entities.push(id),
            None => return Err(stack.invalid(format!("cannot remove {}", other))),
        },
    }
    Ok(())
}

/// `es target -`; targets are entity ids, entities, components or lists of them
fn remove(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    let handle = stack.pop_store()?;
    let mut entities = Vec::new();
    let mut components = Vec::new();
    collect_removals(stack, value, &mut entities, &mut components)?;
    {
        let mut store = handle.store.write();
        store.remove_components(&components, AddOptions::default())?;
        store.remove_entities(&entities, AddOptions::retain())?;
    }
    stack.push(StackValue::EntitySet(handle));
    Ok(Flow::Continue)
}

/// `es id get`; an unknown id leaves nil
fn get_entity(stack: &mut QueryStack) -> Result<Flow> {
    let target = stack.pop()?;
    let handle = stack.pop_store()?;
    let store = handle.store.read();
    let fetch = |value: &StackValue| {
        value
            .as_i64()
            .and_then(|id| EntityId::try_from(id).ok())
            .and_then(|id| store.get_entity(id, Populate::All))
            .map(StackValue::Entity)
            .unwrap_or_else(StackValue::nil)
    };
    let result = match &target {
        StackValue::List(ids) => StackValue::List(ids.iter().map(fetch).collect()),
        other => fetch(other),
    };
    drop(store);
    stack.push(result);
    Ok(Flow::Continue)
}

/// `entity def get`; the def is an id, uri or hash
fn get_component(stack: &mut QueryStack) -> Result<Flow> {
    let ident = stack.pop()?;
    let entity = match stack.pop()? {
        StackValue::Entity(e) => e,
        other => return Err(stack.invalid(format!("expected an entity, got {}", other.kind()))),
    };
    let def = match ident.as_i64() {
        Some(id) => u16::try_from(id).ok(),
        None => {
            let store = stack.store()?;
            let guard = store.read();
            resolve_def(stack, &*guard, &ident).ok().map(|def| def.id)
        }
    };
    let component = def
        .and_then(|def| entity.components.get(&def).cloned())
        .map(StackValue::Component)
        .unwrap_or_else(StackValue::nil);
    stack.push(component);
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use crate::error::QueryError;
    use crate::stack::QueryStack;
    use crate::value::StackValue;
    use entstack_store::{shared, EntitySet, EntityStore, Populate, StoreRef};
    use serde_json::json;

    fn setup() -> (StoreRef, QueryStack) {
        let store = shared(EntitySet::new());
        let stack = QueryStack::new().with_store(store.clone());
        (store, stack)
    }

    const DEFS: &str = r#"
        @es
        ["/component/title" "text"] !d +
        ["/component/completed" [{name: "isComplete" type: "boolean" default: false}]] !d +
        drop
    "#;

    #[test]
    fn test_register_defs() {
        let (store, mut stack) = setup();
        stack.run(DEFS).unwrap();
        let store = store.read();
        assert_eq!(store.defs().len(), 2);
        let completed = store.def_by_uri("/component/completed").unwrap();
        assert_eq!(completed.id, 2);
        assert_eq!(completed.defaults().get("isComplete"), Some(&json!(false)));
    }

    #[test]
    fn test_register_twice_is_idempotent() {
        let (store, mut stack) = setup();
        stack.run(DEFS).unwrap();
        stack.run(DEFS).unwrap();
        assert_eq!(store.read().defs().len(), 2);
    }

    #[test]
    fn test_add_components_and_get() {
        let (store, mut stack) = setup();
        stack.run(DEFS).unwrap();
        stack
            .run(r#"@es [{"@e" 100 "@du" "/component/title" text: "get out of bed"} {"@e" 100 "@d" 2}] !c + drop"#)
            .unwrap();

        let entity = store.read().get_entity(100, Populate::All).unwrap();
        assert_eq!(entity.size(), 2);
        assert_eq!(entity.component(2).unwrap().get("isComplete"), Some(&json!(false)));

        stack.run("@es 100 get").unwrap();
        assert!(matches!(stack.items().last(), Some(StackValue::Entity(e)) if e.id == 100));
    }

    #[test]
    fn test_build_entity_and_attach() {
        let (store, mut stack) = setup();
        stack.run(DEFS).unwrap();
        stack
            .run(r#"@es 7 !e {"@du" "/component/title" text: "hi"} !c + + drop"#)
            .unwrap();
        let entity = store.read().get_entity(7, Populate::All).unwrap();
        assert_eq!(entity.component(1).unwrap().get("text"), Some(&json!("hi")));
    }

    #[test]
    fn test_remove_entity() {
        let (store, mut stack) = setup();
        stack.run(DEFS).unwrap();
        stack
            .run(r#"@es {"@e" 3 "@du" "/component/title"} !c + 3 - drop"#)
            .unwrap();
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_unknown_def() {
        let (_, mut stack) = setup();
        let err = stack.run(r#"{"@du" "/component/missing"} !c"#).unwrap_err();
        assert!(matches!(err, QueryError::DefNotFound(_)));
    }

    #[test]
    fn test_bitfield_and_attr() {
        let (_, mut stack) = setup();
        stack.run(DEFS).unwrap();
        stack
            .run(r#"["/component/title" "/component/completed"] !bf [or "/component/title"] !bf /component/title#text"#)
            .unwrap();
        let items = stack.items();
        assert_eq!(items[0].to_string(), "bf(and 1,2)");
        assert_eq!(items[1].to_string(), "bf(or 1)");
        assert_eq!(items[2].to_string(), "(ca bf(and 1) #text)");
    }

    #[test]
    fn test_defs_listing() {
        let (_, mut stack) = setup();
        stack.run(DEFS).unwrap();
        stack.run("@es @defs size").unwrap();
        assert_eq!(stack.items().last(), Some(&StackValue::from(2)));
    }
}
