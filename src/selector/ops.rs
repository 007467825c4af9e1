//! Operator semantics
//!
//! One free function per operator kind. Every function is total: type
//! mismatches and absent operands produce `Value::Absent` instead of an
//! error, so a selector over heterogeneous payloads never aborts delivery.

use std::cmp::Ordering;

use super::ast::{ArithmeticOp, ComparisonOp};
use super::value::{Number, Value};

/// `+ - * /` with integer preservation and float promotion.
///
/// Integer division by zero yields NaN. Integer overflow promotes to float.
pub fn arithmetic(op: ArithmeticOp, lhs: &Value, rhs: &Value) -> Value {
    let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) else {
        return Value::Absent;
    };

    match (a, b) {
        (Number::Int(a), Number::Int(b)) => {
            let checked = match op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Subtract => a.checked_sub(b),
                ArithmeticOp::Multiply => a.checked_mul(b),
                ArithmeticOp::Divide => {
                    if b == 0 {
                        return Value::Float(f64::NAN);
                    }
                    a.checked_div(b)
                }
            };
            match checked {
                Some(v) => Value::Int(v),
                None => float_arithmetic(op, a as f64, b as f64),
            }
        }
        (a, b) => float_arithmetic(op, a.as_f64(), b.as_f64()),
    }
}

fn float_arithmetic(op: ArithmeticOp, a: f64, b: f64) -> Value {
    Value::Float(match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Subtract => a - b,
        ArithmeticOp::Multiply => a * b,
        ArithmeticOp::Divide => a / b,
    })
}

/// Unary minus
pub fn negate(operand: &Value) -> Value {
    match operand.as_number() {
        Some(Number::Int(i)) => i
            .checked_neg()
            .map_or(Value::Float(-(i as f64)), Value::Int),
        Some(Number::Float(f)) => Value::Float(-f),
        None => Value::Absent,
    }
}

/// Semantic equality. `None` means the operands are not comparable.
///
/// Two NaNs compare equal so that `field = field` is deterministic.
fn equals(lhs: &Value, rhs: &Value) -> Option<bool> {
    match (lhs, rhs) {
        (Value::Absent, _) | (_, Value::Absent) => None,
        (Value::Text(a), Value::Text(b)) => Some(a == b),
        (Value::Bool(a), Value::Bool(b)) => Some(a == b),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => None,
        _ => {
            let (a, b) = (lhs.as_number()?, rhs.as_number()?);
            Some(match (a, b) {
                (Number::Int(a), Number::Int(b)) => a == b,
                (a, b) => {
                    let (a, b) = (a.as_f64(), b.as_f64());
                    a == b || (a.is_nan() && b.is_nan())
                }
            })
        }
    }
}

/// Ordering for `< <= > >=`. `Some(None)` means comparable but unordered (NaN).
fn ordering(lhs: &Value, rhs: &Value) -> Option<Option<Ordering>> {
    match (lhs, rhs) {
        (Value::Absent, _) | (_, Value::Absent) => None,
        (Value::Text(a), Value::Text(b)) => Some(Some(a.cmp(b))),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => None,
        _ => {
            let (a, b) = (lhs.as_number()?, rhs.as_number()?);
            Some(match (a, b) {
                (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
                (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
            })
        }
    }
}

/// `= <> < <= > >=`
pub fn compare(op: ComparisonOp, lhs: &Value, rhs: &Value) -> Value {
    let result = match op {
        ComparisonOp::Equal => equals(lhs, rhs),
        ComparisonOp::NotEqual => equals(lhs, rhs).map(|eq| !eq),
        ComparisonOp::Less
        | ComparisonOp::LessOrEqual
        | ComparisonOp::Greater
        | ComparisonOp::GreaterOrEqual => ordering(lhs, rhs).map(|ord| match ord {
            Some(ord) => match op {
                ComparisonOp::Less => ord == Ordering::Less,
                ComparisonOp::LessOrEqual => ord != Ordering::Greater,
                ComparisonOp::Greater => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            },
            None => false,
        }),
    };
    result.map_or(Value::Absent, Value::Bool)
}

/// Three-valued AND. Both operands are always evaluated by the caller.
pub fn and(lhs: &Value, rhs: &Value) -> Value {
    match (lhs.truth(), rhs.truth()) {
        (Some(false), _) | (_, Some(false)) => Value::Bool(false),
        (Some(true), Some(true)) => Value::Bool(true),
        _ => Value::Absent,
    }
}

/// Three-valued OR
pub fn or(lhs: &Value, rhs: &Value) -> Value {
    match (lhs.truth(), rhs.truth()) {
        (Some(true), _) | (_, Some(true)) => Value::Bool(true),
        (Some(false), Some(false)) => Value::Bool(false),
        _ => Value::Absent,
    }
}

/// Three-valued NOT
pub fn not(operand: &Value) -> Value {
    operand.truth().map_or(Value::Absent, |b| Value::Bool(!b))
}

/// `value BETWEEN low AND high`, inclusive on both ends
pub fn between(value: &Value, low: &Value, high: &Value) -> Value {
    and(
        &compare(ComparisonOp::GreaterOrEqual, value, low),
        &compare(ComparisonOp::LessOrEqual, value, high),
    )
}

/// `value IN (items...)`
pub fn in_list(value: &Value, items: &[Value]) -> Value {
    if value.is_absent() {
        return Value::Absent;
    }
    let found = items
        .iter()
        .any(|item| matches!(equals(value, item), Some(true)));
    Value::Bool(found)
}

/// `operand IS NULL`
pub fn is_null(operand: &Value) -> Value {
    Value::Bool(operand.is_absent())
}
