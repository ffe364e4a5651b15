//! Arithmetic, comparison and logic
//!
//! Binary words take the top of the stack as their left operand, so
//! `x 2 swap %` computes `x % 2`. String `+` is the exception: it joins in
//! push order, like `concat`.

use super::Dictionary;
use crate::error::Result;
use crate::stack::{Flow, QueryStack};
use crate::value::{Kind, StackValue, Value};
use std::cmp::Ordering;

pub(super) fn register(dict: &mut Dictionary) {
    use Kind::*;
    dict.add("+", &[Value, Value], add)
        .add("-", &[Value, Value], sub)
        .add("*", &[Value, Value], mul)
        .add("/", &[Value, Value], div)
        .add("%", &[Value, Value], rem)
        .add("==", &[Any, Any], eq)
        .add("!=", &[Any, Any], ne)
        .add("<", &[Any, Any], lt)
        .add("<=", &[Any, Any], le)
        .add(">", &[Any, Any], gt)
        .add(">=", &[Any, Any], ge)
        .add("and", &[Any, Any], and)
        .add("or", &[Any, Any], or)
        .add("not", &[Any], not);
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn int_op(op: Arith, a: i64, b: i64) -> Option<Value> {
    match op {
        Arith::Add => a.checked_add(b).map(Value::Int),
        Arith::Sub => a.checked_sub(b).map(Value::Int),
        Arith::Mul => a.checked_mul(b).map(Value::Int),
        Arith::Div => {
            if a.checked_rem(b)? == 0 {
                a.checked_div(b).map(Value::Int)
            } else {
                Some(Value::Float(a as f64 / b as f64))
            }
        }
        Arith::Rem => a.checked_rem(b).map(Value::Int),
    }
}

fn float_op(op: Arith, a: f64, b: f64) -> f64 {
    match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => a / b,
        Arith::Rem => a % b,
    }
}

fn arith(stack: &mut QueryStack, op: Arith) -> Result<Flow> {
    let left = stack.pop_value()?;
    let right = stack.pop_value()?;

    let result = match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            if matches!(op, Arith::Div | Arith::Rem) && *b == 0 {
                return Err(stack.invalid("division by zero"));
            }
            int_op(op, *a, *b).ok_or_else(|| stack.invalid("integer overflow"))?
        }
        (Value::Str(top), Value::Str(below)) if matches!(op, Arith::Add) => Value::Str(format!("{}{}", below, top)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Value::Float(float_op(op, a, b)),
            _ => {
                return Err(stack.invalid(format!(
                    "cannot apply arithmetic to {} and {}",
                    left, right
                )))
            }
        },
    };
    stack.push(result);
    Ok(Flow::Continue)
}

fn add(stack: &mut QueryStack) -> Result<Flow> {
    arith(stack, Arith::Add)
}

fn sub(stack: &mut QueryStack) -> Result<Flow> {
    arith(stack, Arith::Sub)
}

fn mul(stack: &mut QueryStack) -> Result<Flow> {
    arith(stack, Arith::Mul)
}

fn div(stack: &mut QueryStack) -> Result<Flow> {
    arith(stack, Arith::Div)
}

fn rem(stack: &mut QueryStack) -> Result<Flow> {
    arith(stack, Arith::Rem)
}

/// Equality; a regex on either side matches against the other side's text
pub(crate) fn values_equal(left: &StackValue, right: &StackValue) -> bool {
    match (left, right) {
        (StackValue::Regex(re), StackValue::Value(Value::Str(s)))
        | (StackValue::Value(Value::Str(s)), StackValue::Regex(re)) => re.is_match(s),
        _ => left == right,
    }
}

/// Ordering of numbers, strings, booleans and dates
pub(crate) fn compare_values(left: &StackValue, right: &StackValue) -> Option<Ordering> {
    match (left, right) {
        (StackValue::Value(a), StackValue::Value(b)) => match (a, b) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (StackValue::DateTime(a), StackValue::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare(stack: &mut QueryStack, test: fn(Ordering) -> bool) -> Result<Flow> {
    let left = stack.pop()?;
    let right = stack.pop()?;
    match compare_values(&left, &right) {
        Some(ordering) => {
            stack.push(test(ordering));
            Ok(Flow::Continue)
        }
        None => Err(stack.invalid(format!("cannot order {} and {}", left.kind(), right.kind()))),
    }
}

fn eq(stack: &mut QueryStack) -> Result<Flow> {
    let left = stack.pop()?;
    let right = stack.pop()?;
    stack.push(values_equal(&left, &right));
    Ok(Flow::Continue)
}

fn ne(stack: &mut QueryStack) -> Result<Flow> {
    let left = stack.pop()?;
    let right = stack.pop()?;
    stack.push(!values_equal(&left, &right));
    Ok(Flow::Continue)
}

fn lt(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, Ordering::is_lt)
}

fn le(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, Ordering::is_le)
}

fn gt(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, Ordering::is_gt)
}

fn ge(stack: &mut QueryStack) -> Result<Flow> {
    compare(stack, Ordering::is_ge)
}

fn and(stack: &mut QueryStack) -> Result<Flow> {
    let left = stack.pop()?;
    let right = stack.pop()?;
    stack.push(left.is_truthy() && right.is_truthy());
    Ok(Flow::Continue)
}

fn or(stack: &mut QueryStack) -> Result<Flow> {
    let left = stack.pop()?;
    let right = stack.pop()?;
    stack.push(left.is_truthy() || right.is_truthy());
    Ok(Flow::Continue)
}

fn not(stack: &mut QueryStack) -> Result<Flow> {
    let value = stack.pop()?;
    stack.push(!value.is_truthy());
    Ok(Flow::Continue)
}
