//! The `select` word and its scope
//!
//! `es [program] select` runs the program in a child scope where comparison
//! words on component attributes build [`Filter`] trees and reader words
//! (`@e`, `@eid`, `@c`, `@cid`, `@ca`) turn a filter into results:
//!
//! ```text
//! @es [ /component/completed#isComplete true == /component/title !bf @c ] select
//! ```
//!
//! A reader pops, from the top: an optional projection bitfield (or the
//! attribute for `@ca`), an optional filter, then optional candidates (an
//! entity id, an entity, or a list of either). Without candidates every
//! stored entity is considered. A program that never calls a reader is
//! read with `@e`.

mod filter;
mod order;

pub use filter::{CompareOp, Filter};
pub use order::{Direction, OrderBy};

use crate::error::Result;
use crate::stack::{Flow, QueryStack, Word};
use crate::value::{ComponentAttr, Kind, Quoted, StackValue, Value};
use crate::words::Dictionary;
use entstack_store::{BitField, EntityStore, Populate, StoreRef};
use entstack_types::{ComponentId, EntityId};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Settings collected while a select program runs
pub(crate) struct SelectState {
    store: StoreRef,
    order: Option<OrderBy>,
    offset: usize,
    limit: Option<usize>,
    count: bool,
    read: bool,
}

impl SelectState {
    fn new(store: StoreRef) -> Self {
        Self {
            store,
            order: None,
            offset: 0,
            limit: None,
            count: false,
            read: false,
        }
    }
}

static SCOPE: Lazy<HashMap<String, Vec<Word>>> = Lazy::new(|| {
    use Kind::*;
    let mut dict = Dictionary::default();
    dict.add("==", &[ComponentAttr, Any], compare_eq)
        .add("==", &[Any, ComponentAttr], compare_eq)
        .add("!=", &[ComponentAttr, Any], compare_ne)
        .add("!=", &[Any, ComponentAttr], compare_ne)
        .add("<", &[ComponentAttr, Any], compare_lt)
        .add("<", &[Any, ComponentAttr], compare_lt)
        .add("<=", &[ComponentAttr, Any], compare_le)
        .add("<=", &[Any, ComponentAttr], compare_le)
        .add(">", &[ComponentAttr, Any], compare_gt)
        .add(">", &[Any, ComponentAttr], compare_gt)
        .add(">=", &[ComponentAttr, Any], compare_ge)
        .add(">=", &[Any, ComponentAttr], compare_ge)
        .add("and", &[Filter, Filter], and)
        .add("or", &[Filter, Filter], or)
        .add("order", &[ComponentAttr, Value], order)
        .add("order", &[ComponentAttr], order)
        .add("limit", &[List], limit)
        .add("limit", &[Value], limit)
        .add("count", &[], count)
        .add("@e", &[], read_entities)
        .add("@eid", &[], read_entity_ids)
        .add("@c", &[], read_components)
        .add("@cid", &[], read_component_ids)
        .add("@ca", &[ComponentAttr], read_attrs)
        .add("!fil", &[], apply_filter);
    dict.into_words()
});

/// `es [program] select`
pub(crate) fn select_word(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let handle = stack.pop_store()?;
    stack.selects.push(SelectState::new(handle.store));

    let result = run_select(stack, &body);
    let state = stack.selects.pop();
    let mut items = result?;

    let count = state.map(|s| s.count).unwrap_or(false);
    let result = match items.len() {
        0 => StackValue::List(Vec::new()),
        1 if count || matches!(items[0], StackValue::List(_)) => items.remove(0),
        _ => StackValue::List(items),
    };
    stack.push(result);
    Ok(Flow::Continue)
}

fn run_select(stack: &mut QueryStack, body: &[StackValue]) -> Result<Vec<StackValue>> {
    let items = stack.eval_in_child_with(Vec::new(), SCOPE.clone(), body)?;
    if select_state(stack)?.read {
        return Ok(items);
    }
    let implicit = [StackValue::Value(Value::Quoted(Quoted::Word("@e".to_string())))];
    stack.eval_in_child_with(items, SCOPE.clone(), &implicit)
}

fn select_state(stack: &mut QueryStack) -> Result<&mut SelectState> {
    if stack.selects.is_empty() {
        return Err(stack.invalid("only valid inside select"));
    }
    let last = stack.selects.len() - 1;
    Ok(&mut stack.selects[last])
}

fn compare(stack: &mut QueryStack, op: CompareOp) -> Result<Flow> {
    let top = stack.pop()?;
    let below = stack.pop()?;
    let (attr, operand) = match (below, top) {
        (StackValue::ComponentAttr(attr), operand) => (attr, operand),
        (operand, StackValue::ComponentAttr(attr)) => (attr, operand),
        (a, b) => return Err(stack.incompatible(&a, &b)),
    };
    tracing::debug!("filter {} {} {}", attr, op, operand);
    stack.push(Filter::compare(op, attr, operand));
    Ok(Flow::Continue)
}

fn compare_eq(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, CompareOp::Eq)
}

fn compare_ne(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, CompareOp::Ne)
}

fn compare_lt(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, CompareOp::Lt)
}

fn compare_le(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, CompareOp::Le)
}

fn compare_gt(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, CompareOp::Gt)
}

fn compare_ge(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, CompareOp::Ge)
}

fn pop_filter(stack: &mut QueryStack) -> Option<Filter> {
    match stack.pop_if(Kind::Filter) {
        Some(StackValue::Filter(filter)) => Some(filter),
        _ => None,
    }
}

fn and(stack: &mut QueryStack) -> Result<Flow> {
    let right = pop_filter(stack);
    let left = pop_filter(stack);
    match (left, right) {
        (Some(left), Some(right)) => stack.push(left.and(right)),
        _ => return Err(stack.invalid("expected two filters")),
    }
    Ok(Flow::Continue)
}

fn or(stack: &mut QueryStack) -> Result<Flow> {
    let right = pop_filter(stack);
    let left = pop_filter(stack);
    match (left, right) {
        (Some(left), Some(right)) => stack.push(left.or(right)),
        _ => return Err(stack.invalid("expected two filters")),
    }
    Ok(Flow::Continue)
}

/// `attr order` or `attr "desc" order`
fn order(stack: &mut QueryStack) -> Result<Flow> {
    let direction = match stack.pop_if(Kind::Value) {
        Some(value) => {
            let word = value.as_value().and_then(Value::as_name).unwrap_or_default().to_string();
            Direction::parse(&word).ok_or_else(|| stack.invalid(format!("unknown direction {}", value)))?
        }
        None => Direction::Asc,
    };
    let attr = stack.pop_attr()?;
    select_state(stack)?.order = Some(OrderBy { attr, direction });
    Ok(Flow::Continue)
}

fn page_count(stack: &QueryStack, value: &StackValue) -> Result<usize> {
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| stack.invalid(format!("expected a non-negative number, got {}", value)))
}

/// `n limit` or `[offset n] limit`
///
/// The offset only comes from the pair form; a number below `n` is left for
/// the reader as a candidate.
fn limit(stack: &mut QueryStack) -> Result<Flow> {
    let (offset, limit) = match stack.pop()? {
        StackValue::List(pair) => match pair.as_slice() {
            [offset, limit] => (page_count(stack, offset)?, page_count(stack, limit)?),
            _ => return Err(stack.invalid("expected [offset limit]")),
        },
        value => (0, page_count(stack, &value)?),
    };
    let state = select_state(stack)?;
    state.offset = offset;
    state.limit = Some(limit);
    Ok(Flow::Continue)
}

fn count(stack: &mut QueryStack) -> Result<Flow> {
    select_state(stack)?.count = true;
    Ok(Flow::Continue)
}

fn entity_id(value: &StackValue) -> Option<EntityId> {
    match value {
        StackValue::Entity(e) => Some(e.id),
        other => other.as_i64().and_then(|id| EntityId::try_from(id).ok()),
    }
}

/// Explicit candidates on the stack, if any
fn pop_candidates(stack: &mut QueryStack) -> Option<Vec<EntityId>> {
    let is_candidates = match stack.peek()? {
        StackValue::List(items) => items.iter().all(|item| entity_id(item).is_some()),
        other => entity_id(other).is_some(),
    };
    if !is_candidates {
        return None;
    }
    match stack.pop_if(Kind::Any)? {
        StackValue::List(items) => Some(items.iter().filter_map(entity_id).collect()),
        other => entity_id(&other).map(|id| vec![id]),
    }
}

/// Ids matching the filter and shape, ordered and paged
fn matching_ids(
    store: &dyn EntityStore,
    state: &SelectState,
    candidates: Option<Vec<EntityId>>,
    filter: Option<&Filter>,
    shape: Option<&BitField>,
    page: bool,
) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = candidates
        .unwrap_or_else(|| store.entity_ids().collect())
        .into_iter()
        .filter(|&id| match (shape, store.entity_bitfield(id)) {
            (_, None) => false,
            (Some(bf), Some(entity)) => bf.matches(&entity),
            (None, Some(_)) => true,
        })
        .collect();
    if let Some(filter) = filter {
        ids = filter.apply(store, &ids);
    }
    if !page {
        return ids;
    }
    if let Some(order) = &state.order {
        order.sort(store, &mut ids);
    }
    let limit = state.limit.unwrap_or(usize::MAX);
    ids.into_iter().skip(state.offset).take(limit).collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Reader {
    Entities,
    EntityIds,
    Components,
    ComponentIds,
}

fn read(stack: &mut QueryStack, reader: Reader) -> Result<Flow> {
    let shape = match stack.pop_if(Kind::BitField) {
        Some(StackValue::BitField(bf)) => Some(bf),
        _ => None,
    };
    let filter = pop_filter(stack);
    let candidates = pop_candidates(stack);

    let state = select_state(stack)?;
    state.read = true;
    let store = state.store.clone();
    let guard = store.read();
    let state = match stack.selects.last() {
        Some(state) => state,
        None => return Err(stack.invalid("only valid inside select")),
    };
    let ids = matching_ids(&*guard, state, candidates, filter.as_ref(), shape.as_ref(), true);

    let result = if state.count {
        StackValue::from(ids.len() as i64)
    } else {
        let wanted = |def| shape.as_ref().map(|bf| bf.is_all() || bf.get(def)).unwrap_or(true);
        let mut out = Vec::new();
        for id in ids {
            match reader {
                Reader::EntityIds => out.push(StackValue::from(i64::from(id))),
                Reader::Entities => {
                    if let Some(entity) = guard.get_entity(id, Populate::All) {
                        out.push(StackValue::Entity(entity));
                    }
                }
                Reader::Components | Reader::ComponentIds => {
                    let Some(entity) = guard.get_entity(id, Populate::All) else {
                        continue;
                    };
                    for (def, component) in entity.components {
                        if !wanted(def) {
                            continue;
                        }
                        out.push(match reader {
                            Reader::ComponentIds => StackValue::List(vec![
                                StackValue::from(i64::from(id)),
                                StackValue::from(i64::from(def)),
                            ]),
                            _ => StackValue::Component(component),
                        });
                    }
                }
            }
        }
        StackValue::List(out)
    };
    drop(guard);
    stack.push(result);
    Ok(Flow::Continue)
}

fn read_entities(stack: &mut QueryStack) -> Result<Flow> {
    read(stack, Reader::Entities)
}

fn read_entity_ids(stack: &mut QueryStack) -> Result<Flow> {
    read(stack, Reader::EntityIds)
}

fn read_components(stack: &mut QueryStack) -> Result<Flow> {
    read(stack, Reader::Components)
}

fn read_component_ids(stack: &mut QueryStack) -> Result<Flow> {
    read(stack, Reader::ComponentIds)
}

/// `[filter] attr @ca`: the attribute's values, skipping entities without it
fn read_attrs(stack: &mut QueryStack) -> Result<Flow> {
    let attr: ComponentAttr = stack.pop_attr()?;
    let filter = pop_filter(stack);
    let candidates = pop_candidates(stack);

    let state = select_state(stack)?;
    state.read = true;
    let store = state.store.clone();
    let guard = store.read();
    let state = match stack.selects.last() {
        Some(state) => state,
        None => return Err(stack.invalid("only valid inside select")),
    };
    let ids = matching_ids(&*guard, state, candidates, filter.as_ref(), Some(&attr.bitfield), true);

    let mut values = Vec::new();
    for id in ids {
        for def in attr.bitfield.ids() {
            let value = guard
                .get_component(ComponentId::new(id, def))
                .and_then(|c| c.pointer(&attr.pointer).map(StackValue::from_json));
            values.extend(value);
        }
    }
    let result = if state.count {
        StackValue::from(values.len() as i64)
    } else {
        StackValue::List(values)
    };
    drop(guard);
    stack.push(result);
    Ok(Flow::Continue)
}

/// `[candidates] filter !fil`: matching ids, unordered and unpaged
fn apply_filter(stack: &mut QueryStack) -> Result<Flow> {
    let filter = pop_filter(stack);
    let candidates = pop_candidates(stack);
    let store = select_state(stack)?.store.clone();
    let guard = store.read();
    let state = match stack.selects.last() {
        Some(state) => state,
        None => return Err(stack.invalid("only valid inside select")),
    };
    let ids = matching_ids(&*guard, state, candidates, filter.as_ref(), None, false);
    drop(guard);
    stack.push(StackValue::List(ids.into_iter().map(|id| StackValue::from(i64::from(id))).collect()));
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use crate::error::QueryError;
    use crate::stack::QueryStack;
    use crate::value::StackValue;
    use entstack_store::{shared, EntitySet, StoreRef};

    const SETUP: &str = r#"
        @es
        ["/component/title" "text"] !d +
        ["/component/completed" [{name: "isComplete" type: "boolean"}]] !d +
        ["/component/priority" [{name: "level" type: "integer"}]] !d +
        [
            {"@e" 100 "@du" "/component/title" text: "get out of bed"}
            {"@e" 100 "@du" "/component/completed" isComplete: true}
            {"@e" 100 "@du" "/component/priority" level: 2}
            {"@e" 101 "@du" "/component/title" text: "make coffee"}
            {"@e" 101 "@du" "/component/completed" isComplete: false}
            {"@e" 101 "@du" "/component/priority" level: 5}
            {"@e" 102 "@du" "/component/title" text: "Brush teeth"}
            {"@e" 102 "@du" "/component/priority" level: 1}
        ] !c +
        drop
    "#;

    fn setup() -> QueryStack {
        let store: StoreRef = shared(EntitySet::new());
        let mut stack = QueryStack::new().with_store(store);
        stack.run(SETUP).unwrap();
        stack
    }

    fn select(program: &str) -> StackValue {
        let mut stack = setup();
        stack.run(&format!("@es [ {} ] select", program)).unwrap();
        stack.into_items().pop().unwrap()
    }

    #[test]
    fn test_filter_and_project() {
        let result = select("/component/completed#isComplete true == /component/title !bf @c");
        let StackValue::List(items) = result else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 1);
        let StackValue::Component(c) = &items[0] else {
            panic!("expected a component");
        };
        assert_eq!(c.entity, 100);
        assert_eq!(c.get("text"), Some(&serde_json::json!("get out of bed")));
    }

    #[test]
    fn test_entity_ids_with_or() {
        let result = select(
            "/component/priority#level 5 >= /component/title#text ~r/^brush/i == or @eid",
        );
        assert_eq!(result.to_string(), "[101 102]");
    }

    #[test]
    fn test_attribute_on_either_side() {
        assert_eq!(select("2 /component/priority#level < @eid").to_string(), "[102]");
        assert_eq!(select("/component/priority#level 2 < @eid").to_string(), "[102]");
    }

    #[test]
    fn test_order_and_limit() {
        let result = select("/component/title#text order /component/title#text @ca");
        assert_eq!(result.to_string(), "[\"Brush teeth\" \"get out of bed\" \"make coffee\"]");

        let result = select("/component/priority#level \"desc\" order [1 1] limit @eid");
        assert_eq!(result.to_string(), "[100]");
    }

    #[test]
    fn test_limit_leaves_candidates_alone() {
        assert_eq!(select("100 5 limit @eid").to_string(), "[100]");
        assert_eq!(select("[100 101 102] [1 5] limit @eid").to_string(), "[101 102]");
        assert_eq!(select("[100 101 102] 2 limit @eid").to_string(), "[100 101]");
    }

    #[test]
    fn test_malformed_limit() {
        let mut stack = setup();
        let err = stack.run("@es [ [1 2 3] limit @eid ] select").unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { ref word, .. } if word == "limit"));
        let err = stack.run("@es [ -1 limit @eid ] select").unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { .. }));
    }

    #[test]
    fn test_count() {
        assert_eq!(select("/component/completed !bf count @e"), StackValue::from(2));
    }

    #[test]
    fn test_candidates_and_component_ids() {
        let result = select("[100 102] /component/priority !bf @cid");
        assert_eq!(result.to_string(), "[[100 3] [102 3]]");
    }

    #[test]
    fn test_apply_filter_then_read() {
        let result = select("/component/priority#level 1 > !fil @eid");
        assert_eq!(result.to_string(), "[100 101]");
    }

    #[test]
    fn test_implicit_entity_reader() {
        let StackValue::List(items) = select("/component/completed#isComplete false ==") else {
            panic!("expected a list");
        };
        assert!(matches!(&items[..], [StackValue::Entity(e)] if e.id == 101 && e.size() == 3));
    }

    #[test]
    fn test_several_readers_are_wrapped() {
        let result = select("102 @eid 100 @eid");
        assert_eq!(result.to_string(), "[[102] [100]]");
    }

    #[test]
    fn test_missing_def_is_an_error() {
        let mut stack = setup();
        let err = stack.run("@es [ /component/nope#x 1 == ] select").unwrap_err();
        assert!(matches!(err, QueryError::DefNotFound(ref uri) if uri == "/component/nope"));
    }
}
