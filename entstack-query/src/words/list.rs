//! Lists, maps and set algebra
//!
//! Collection words read their operands in push order: `list item push`,
//! `a b concat`, `a b diff` is `a` without `b`.

use super::Dictionary;
use crate::error::Result;
use crate::stack::{Flow, QueryStack};
use crate::value::{Kind, StackValue, Value};

pub(super) fn register(dict: &mut Dictionary) {
    use Kind::*;
    dict.add("push", &[List, Any], push)
        .add("concat", &[List, List], concat)
        .add("concat", &[Value, Value], concat_str)
        .add("get", &[List, Value], get_index)
        .add("get", &[Map, Value], get_key)
        .add("get", &[Component, Value], get_field)
        .add("set", &[List, Value, Any], set_index)
        .add("set", &[Map, Value, Any], set_key)
        .add("set", &[Component, Value, Any], set_field)
        .add("keys", &[Map], keys)
        .add("keys", &[Component], keys)
        .add("values", &[Map], values)
        .add("values", &[Component], values);

    for (name, op) in [("union", union as fn(&mut QueryStack) -> Result<Flow>), ("intersect", intersect), ("diff", diff)] {
        dict.add(name, &[List, List], op)
            .add(name, &[Map, Map], op)
            .add(name, &[BitField, BitField], op)
            .add(name, &[Any, Any], incompatible);
    }
}

fn push(stack: &mut QueryStack) -> Result<Flow> {
    let item = stack.pop()?;
    let mut list = stack.pop_list()?;
    list.push(item);
    stack.push(StackValue::List(list));
    Ok(Flow::Continue)
}

fn concat(stack: &mut QueryStack) -> Result<Flow> {
    let b = stack.pop_list()?;
    let mut a = stack.pop_list()?;
    a.extend(b);
    stack.push(StackValue::List(a));
    Ok(Flow::Continue)
}

fn concat_str(stack: &mut QueryStack) -> Result<Flow> {
    let b = stack.pop_value()?;
    let a = stack.pop_value()?;
    let text = |v: &Value| match v {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    };
    stack.push(Value::Str(text(&a) + &text(&b)));
    Ok(Flow::Continue)
}

/// Negative indexes count from the end
fn list_index(len: usize, index: i64) -> Option<usize> {
    if index < 0 {
        len.checked_sub(index.unsigned_abs() as usize)
    } else if (index as usize) < len {
        Some(index as usize)
    } else {
        None
    }
}

fn get_index(stack: &mut QueryStack) -> Result<Flow> {
    let index = stack.pop_int()?;
    let list = stack.pop_list()?;
    let item = list_index(list.len(), index)
        .and_then(|idx| list.into_iter().nth(idx))
        .unwrap_or_else(StackValue::nil);
    stack.push(item);
    Ok(Flow::Continue)
}

fn get_key(stack: &mut QueryStack) -> Result<Flow> {
    let key = stack.pop_name()?;
    let mut map = stack.pop_map()?;
    stack.push(map.remove(&key).unwrap_or_else(StackValue::nil));
    Ok(Flow::Continue)
}

fn get_field(stack: &mut QueryStack) -> Result<Flow> {
    let key = stack.pop_name()?;
    let value = match stack.pop()? {
        StackValue::Component(c) => c.pointer(&key).map(StackValue::from_json),
        other => return Err(stack.invalid(format!("expected a component, got {}", other.kind()))),
    };
    stack.push(value.unwrap_or_else(StackValue::nil));
    Ok(Flow::Continue)
}

fn set_index(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    let index = stack.pop_int()?;
    let mut list = stack.pop_list()?;
    match list_index(list.len(), index) {
        Some(idx) => list[idx] = value,
        None if index as usize == list.len() => list.push(value),
        None => return Err(stack.invalid(format!("index {} out of range", index))),
    }
    stack.push(StackValue::List(list));
    Ok(Flow::Continue)
}

fn set_key(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    let key = stack.pop_name()?;
    let mut map = stack.pop_map()?;
    map.insert(key, value);
    stack.push(StackValue::Map(map));
    Ok(Flow::Continue)
}

fn set_field(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    let key = stack.pop_name()?;
    match stack.pop()? {
        StackValue::Component(mut c) => {
            c.attributes.insert(key, value.to_json());
            stack.push(StackValue::Component(c));
            Ok(Flow::Continue)
        }
        other => Err(stack.invalid(format!("expected a component, got {}", other.kind()))),
    }
}

fn keys(stack: &mut QueryStack) -> Result<Flow> {
    let keys: Vec<StackValue> = match stack.pop()? {
        StackValue::Map(map) => map.into_keys().map(|k| StackValue::from(k.as_str())).collect(),
        StackValue::Component(c) => c.attributes.keys().map(|k| StackValue::from(k.as_str())).collect(),
        other => return Err(stack.invalid(format!("{} has no keys", other.kind()))),
    };
    stack.push(StackValue::List(keys));
    Ok(Flow::Continue)
}

fn values(stack: &mut QueryStack) -> Result<Flow> {
    let values: Vec<StackValue> = match stack.pop()? {
        StackValue::Map(map) => map.into_values().collect(),
        StackValue::Component(c) => c.attributes.values().map(StackValue::from_json).collect(),
        other => return Err(stack.invalid(format!("{} has no values", other.kind()))),
    };
    stack.push(StackValue::List(values));
    Ok(Flow::Continue)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Diff,
}

fn set_op(stack: &mut QueryStack, op: SetOp) -> Result<Flow> {
    let b = stack.pop()?;
    let a = stack.pop()?;
    let result = match (a, b) {
        (StackValue::List(a), StackValue::List(b)) => {
            let mut out: Vec<StackValue> = Vec::new();
            match op {
                SetOp::Union => {
                    for item in a.into_iter().chain(b) {
                        if !out.contains(&item) {
                            out.push(item);
                        }
                    }
                }
                SetOp::Intersect => {
                    for item in a {
                        if b.contains(&item) && !out.contains(&item) {
                            out.push(item);
                        }
                    }
                }
                SetOp::Diff => {
                    for item in a {
                        if !b.contains(&item) && !out.contains(&item) {
                            out.push(item);
                        }
                    }
                }
            }
            StackValue::List(out)
        }
        (StackValue::Map(mut a), StackValue::Map(b)) => {
            match op {
                SetOp::Union => a.extend(b),
                SetOp::Intersect => a.retain(|k, _| b.contains_key(k)),
                SetOp::Diff => a.retain(|k, _| !b.contains_key(k)),
            }
            StackValue::Map(a)
        }
        (StackValue::BitField(a), StackValue::BitField(b)) => StackValue::BitField(match op {
            SetOp::Union => a.union(&b),
            SetOp::Intersect => a.intersect(&b),
            SetOp::Diff => a.difference(&b),
        }),
        (a, b) => return Err(stack.incompatible(&a, &b)),
    };
    stack.push(result);
    Ok(Flow::Continue)
}

fn union(stack: &mut QueryStack) -> Result<Flow> {
    set_op(stack, SetOp::Union)
}

fn intersect(stack: &mut QueryStack) -> Result<Flow> {
    set_op(stack, SetOp::Intersect)
}

fn diff(stack: &mut QueryStack) -> Result<Flow> {
    set_op(stack, SetOp::Diff)
}

fn incompatible(stack: &mut QueryStack) -> Result<Flow> {
    let b = stack.pop()?;
    let a = stack.pop()?;
    Err(stack.incompatible(&a, &b))
}

#[cfg(test)]
mod tests {
    use crate::error::QueryError;
    use crate::stack::QueryStack;
    use crate::value::StackValue;

    fn run(source: &str) -> String {
        let mut stack = QueryStack::new();
        stack.run(source).unwrap();
        StackValue::List(stack.into_items()).to_string()
    }

    #[test]
    fn test_push_and_concat() {
        assert_eq!(run("[1 2] 3 push"), "[[1 2 3]]");
        assert_eq!(run("[1] [2 3] concat"), "[[1 2 3]]");
        assert_eq!(run("\"ab\" \"cd\" concat"), "[\"abcd\"]");
    }

    #[test]
    fn test_get_and_set() {
        assert_eq!(run("[10 20 30] 1 get"), "[20]");
        assert_eq!(run("[10 20 30] -1 get"), "[30]");
        assert_eq!(run("[10 20 30] 5 get"), "[nil]");
        assert_eq!(run("{a: 1} \"a\" get"), "[1]");
        assert_eq!(run("{a: 1} b: 2 set"), "[{\"a\" 1 \"b\" 2}]");
        assert_eq!(run("[1 2] 0 9 set"), "[[9 2]]");
    }

    #[test]
    fn test_keys_values() {
        assert_eq!(run("{b: 2 a: 1} keys"), "[[\"a\" \"b\"]]");
        assert_eq!(run("{b: 2 a: 1} values"), "[[1 2]]");
    }

    #[test]
    fn test_set_algebra() {
        assert_eq!(run("[1 2 3] [2 3 4] union"), "[[1 2 3 4]]");
        assert_eq!(run("[1 2 3] [2 3 4] intersect"), "[[2 3]]");
        assert_eq!(run("[1 2 3] [2 3 4] diff"), "[[1]]");
        assert_eq!(run("{a: 1 b: 2} {b: 3} diff"), "[{\"a\" 1}]");
    }

    #[test]
    fn test_mismatched_kinds() {
        let err = QueryStack::new().run("[1 2] {a: 1} union").unwrap_err();
        assert!(matches!(
            err,
            QueryError::IncompatibleTypes { ref left, ref right, .. } if left == "list" && right == "map"
        ));
    }
}
