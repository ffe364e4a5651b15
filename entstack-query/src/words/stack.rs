//! Stack shuffling

use super::Dictionary;
use crate::error::Result;
use crate::stack::{Flow, QueryStack};
use crate::value::{Kind, StackValue, Value};

pub(super) fn register(dict: &mut Dictionary) {
    use Kind::*;
    dict.add("drop", &[Any], drop)
        .add("pop", &[List], pop_last)
        .add("pop", &[Any], drop)
        .add("dup", &[Any], dup)
        .add("swap", &[Any, Any], swap)
        .add("rot", &[Any, Any, Any], rot)
        .add("over", &[Any, Any], over)
        .add("clear", &[], clear)
        .add("gather", &[], gather)
        .add("size", &[List], size)
        .add("size", &[Map], size)
        .add("size", &[Value], size)
        .add("size", &[EntitySet], size);
}

fn drop(stack: &mut QueryStack) -> Result<Flow> {
    stack.pop()?;
    Ok(Flow::Continue)
}

/// `[a b c] pop` leaves `c`; an empty list leaves nil
fn pop_last(stack: &mut QueryStack) -> Result<Flow> {
    let mut items = stack.pop_list()?;
    stack.push(items.pop().unwrap_or_else(StackValue::nil));
    Ok(Flow::Continue)
}

fn dup(stack: &mut QueryStack) -> Result<Flow> {
    let top = stack.pop()?;
    stack.push(top.clone());
    stack.push(top);
    Ok(Flow::Continue)
}

fn swap(stack: &mut QueryStack) -> Result<Flow> {
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(b);
    stack.push(a);
    Ok(Flow::Continue)
}

/// `a b c` to `b c a`
fn rot(stack: &mut QueryStack) -> Result<Flow> {
    let c = stack.pop()?;
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(b);
    stack.push(c);
    stack.push(a);
    Ok(Flow::Continue)
}

fn over(stack: &mut QueryStack) -> Result<Flow> {
    let b = stack.pop()?;
    let a = stack.pop()?;
    stack.push(a.clone());
    stack.push(b);
    stack.push(a);
    Ok(Flow::Continue)
}

fn clear(stack: &mut QueryStack) -> Result<Flow> {
    stack.clear();
    Ok(Flow::Continue)
}

fn gather(stack: &mut QueryStack) -> Result<Flow> {
    let items = stack.drain();
    stack.push(StackValue::List(items));
    Ok(Flow::Continue)
}

fn size(stack: &mut QueryStack) -> Result<Flow> {
    let size = match stack.pop()? {
        StackValue::List(items) => items.len(),
        StackValue::Map(map) => map.len(),
        StackValue::Value(Value::Str(s)) => s.chars().count(),
        StackValue::EntitySet(handle) => handle.store.read().entity_count(),
        other => return Err(stack.invalid(format!("{} has no size", other.kind()))),
    };
    stack.push(size as i64);
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use crate::stack::QueryStack;
    use crate::value::StackValue;

    fn run(source: &str) -> String {
        let mut stack = QueryStack::new();
        stack.run(source).unwrap();
        StackValue::List(stack.into_items()).to_string()
    }

    #[test]
    fn test_shuffles() {
        assert_eq!(run("1 2 swap"), "[2 1]");
        assert_eq!(run("1 2 3 rot"), "[2 3 1]");
        assert_eq!(run("1 2 over"), "[1 2 1]");
        assert_eq!(run("1 dup"), "[1 1]");
        assert_eq!(run("1 2 drop"), "[1]");
    }

    #[test]
    fn test_pop_list() {
        assert_eq!(run("[1 2 3] pop"), "[3]");
        assert_eq!(run("[] pop"), "[nil]");
        assert_eq!(run("1 2 pop"), "[1]");
    }

    #[test]
    fn test_gather_and_size() {
        assert_eq!(run("1 2 3 gather"), "[[1 2 3]]");
        assert_eq!(run("[1 2 3] size"), "[3]");
        assert_eq!(run("\"abc\" size"), "[3]");
        assert_eq!(run("1 2 clear"), "[]");
    }

    #[test]
    fn test_underflow() {
        let err = QueryStack::new().run("1 swap").unwrap_err();
        assert!(matches!(err, crate::error::QueryError::InvalidArguments { ref word, .. } if word == "swap"));
    }
}
