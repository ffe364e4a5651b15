//! Definitions and control flow
//!
//! `break` escapes the body being evaluated. `if`, `iif` and `spread` hand an
//! escape on to their caller; word invocation, `loop`, `eval` and the
//! per-element bodies of `map`, `filter` and `reduce` absorb it.

use super::Dictionary;
use crate::error::{QueryError, Result};
use crate::stack::{Flow, QueryStack, Word, WordBody};
use crate::value::{Kind, StackValue};

pub(super) fn register(dict: &mut Dictionary) {
    use Kind::*;
    dict.add("define", &[List, Value], define)
        .add("define", &[Any, Value], let_)
        .add("let", &[Any, Value], let_)
        .add("spread", &[List], spread)
        .add("eval", &[List], eval)
        .add("if", &[Any, List], if_)
        .add("iif", &[Any, List, List], iif)
        .add("loop", &[List], loop_)
        .add("break", &[], break_)
        .add("map", &[List, List], map)
        .add("filter", &[List, List], filter)
        .add("reduce", &[List, Any, List], reduce)
        .add("print", &[Any], print);
}

/// `[body] name define`
fn define(stack: &mut QueryStack) -> Result<Flow> {
    let name = stack.pop_name()?;
    let body = stack.pop_list()?;
    stack.define(
        name,
        Word {
            pattern: Vec::new(),
            body: WordBody::Body(body),
        },
    );
    Ok(Flow::Continue)
}

/// `value name let`
fn let_(stack: &mut QueryStack) -> Result<Flow> {
    let name = stack.pop_name()?;
    let value = stack.pop()?;
    stack.define(
        name,
        Word {
            pattern: Vec::new(),
            body: WordBody::Value(value),
        },
    );
    Ok(Flow::Continue)
}

fn spread(stack: &mut QueryStack) -> Result<Flow> {
    let items = stack.pop_list()?;
    stack.eval_list(&items)
}

fn eval(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let items = stack.eval_in_child(Vec::new(), &body)?;
    stack.push(StackValue::List(items));
    Ok(Flow::Continue)
}

/// `cond [body] if`
fn if_(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let cond = stack.pop()?;
    if cond.is_truthy() {
        stack.eval_list(&body)
    } else {
        Ok(Flow::Continue)
    }
}

/// `cond [then] [else] iif`
fn iif(stack: &mut QueryStack) -> Result<Flow> {
    let otherwise = stack.pop_list()?;
    let then = stack.pop_list()?;
    let cond = stack.pop()?;
    if cond.is_truthy() {
        stack.eval_list(&then)
    } else {
        stack.eval_list(&otherwise)
    }
}

/// Repeat a body until it leaves a false-like value, empties the stack or
/// escapes. The value inspected after each pass is consumed.
fn loop_(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let limit = stack.config().loop_limit;
    let mut iterations = 0usize;
    loop {
        iterations += 1;
        if iterations > limit {
            return Err(QueryError::RunawayLoop { limit });
        }
        if stack.eval_list(&body)? == Flow::Escape {
            break;
        }
        match stack.pop_if(Kind::Any) {
            Some(value) if value.is_truthy() => continue,
            _ => break,
        }
    }
    tracing::debug!("loop finished after {} iterations", iterations);
    Ok(Flow::Continue)
}

fn break_(_stack: &mut QueryStack) -> Result<Flow> {
    Ok(Flow::Escape)
}

/// Every item the body leaves for an element is kept, in order
fn map(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let list = stack.pop_list()?;
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        out.extend(stack.eval_in_child(vec![item], &body)?);
    }
    stack.push(StackValue::List(out));
    Ok(Flow::Continue)
}

fn filter(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let list = stack.pop_list()?;
    let mut out = Vec::new();
    for item in list {
        let result = stack.eval_in_child(vec![item.clone()], &body)?;
        if result.last().map(StackValue::is_truthy).unwrap_or(false) {
            out.push(item);
        }
    }
    stack.push(StackValue::List(out));
    Ok(Flow::Continue)
}

/// `list init [body] reduce`; the body sees `acc x`
fn reduce(stack: &mut QueryStack) -> Result<Flow> {
    let body = stack.pop_list()?;
    let mut acc = stack.pop()?;
    let list = stack.pop_list()?;
    for item in list {
        let mut result = stack.eval_in_child(vec![acc, item], &body)?;
        acc = result.pop().unwrap_or_else(StackValue::nil);
    }
    stack.push(acc);
    Ok(Flow::Continue)
}

fn print(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    tracing::info!("{}", value);
    Ok(Flow::Continue)
}
