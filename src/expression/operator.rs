//! Operator definitions and their semantics over `Value`.
//!
//! Arithmetic propagates NA. Relational operators involving NA are false,
//! except `!=`, which is true.

use super::error::{EvalError, EvalResult};
use crate::value::{Value, MAX_SEQUENCE_LENGTH};
use std::cmp::Ordering;

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// Short-circuiting logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOperator {
    And,
    Or,
}

/// Comparison operators; these may be chained (`a < b < c`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Neg,
    Pos,
}

/// Floor division; `None` when the quotient does not fit (`i64::MIN // -1`).
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

/// Length of `len` elements repeated `times` times, if within bounds.
fn repeated_length(len: usize, times: i64) -> EvalResult<usize> {
    let times = usize::try_from(times.max(0)).unwrap_or(usize::MAX);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_SEQUENCE_LENGTH => Ok(times),
        _ => Err(EvalError::SequenceTooLong {
            limit: MAX_SEQUENCE_LENGTH,
        }),
    }
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::FloorDiv => "//",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
        }
    }

    pub fn apply(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        if left.is_na() || right.is_na() {
            return Ok(Value::Na);
        }

        match (self, left, right) {
            (BinaryOperator::Add, Value::Str(a), Value::Str(b)) => {
                return Ok(Value::Str(format!("{}{}", a, b)))
            }
            (BinaryOperator::Add, Value::List(a), Value::List(b)) => {
                return Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            (BinaryOperator::Mul, Value::Str(s), Value::Int(n))
            | (BinaryOperator::Mul, Value::Int(n), Value::Str(s)) => {
                return Ok(Value::Str(s.repeat(repeated_length(s.len(), *n)?)))
            }
            (BinaryOperator::Mul, Value::List(items), Value::Int(n))
            | (BinaryOperator::Mul, Value::Int(n), Value::List(items)) => {
                let times = repeated_length(items.len(), *n)?;
                return Ok(Value::List(
                    items
                        .iter()
                        .cycle()
                        .take(items.len() * times)
                        .cloned()
                        .collect(),
                ));
            }
            _ => {}
        }

        if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
            return self.apply_int(a, b);
        }
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => self.apply_float(a, b),
            _ => Err(EvalError::UnsupportedOperand {
                operator: self.as_str(),
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn apply_int(&self, a: i64, b: i64) -> EvalResult<Value> {
        let overflow = || EvalError::Overflow {
            operator: self.as_str(),
        };
        let value = match self {
            BinaryOperator::Add => a.checked_add(b).ok_or_else(overflow)?,
            BinaryOperator::Sub => a.checked_sub(b).ok_or_else(overflow)?,
            BinaryOperator::Mul => a.checked_mul(b).ok_or_else(overflow)?,
            BinaryOperator::Div => return self.apply_float(a as f64, b as f64),
            BinaryOperator::FloorDiv | BinaryOperator::Mod if b == 0 => {
                return Err(EvalError::DivisionByZero)
            }
            BinaryOperator::FloorDiv => floor_div(a, b).ok_or_else(overflow)?,
            BinaryOperator::Mod => floor_mod(a, b).ok_or_else(overflow)?,
            BinaryOperator::Pow if b < 0 => return self.apply_float(a as f64, b as f64),
            BinaryOperator::Pow => {
                let exponent = u32::try_from(b).map_err(|_| overflow())?;
                a.checked_pow(exponent).ok_or_else(overflow)?
            }
        };
        Ok(Value::Int(value))
    }

    fn apply_float(&self, a: f64, b: f64) -> EvalResult<Value> {
        let value = match self {
            BinaryOperator::Add => a + b,
            BinaryOperator::Sub => a - b,
            BinaryOperator::Mul => a * b,
            BinaryOperator::Div | BinaryOperator::FloorDiv | BinaryOperator::Mod if b == 0.0 => {
                return Err(EvalError::DivisionByZero)
            }
            BinaryOperator::Div => a / b,
            BinaryOperator::FloorDiv => (a / b).floor(),
            BinaryOperator::Mod => a - b * (a / b).floor(),
            BinaryOperator::Pow => a.powf(b),
        };
        Ok(Value::Float(value))
    }
}

impl BoolOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOperator::And => "and",
            BoolOperator::Or => "or",
        }
    }
}

impl CompareOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOperator::Eq => "==",
            CompareOperator::Ne => "!=",
            CompareOperator::Lt => "<",
            CompareOperator::Le => "<=",
            CompareOperator::Gt => ">",
            CompareOperator::Ge => ">=",
            CompareOperator::In => "in",
            CompareOperator::NotIn => "not in",
            CompareOperator::Is => "is",
            CompareOperator::IsNot => "is not",
        }
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, CompareOperator::In | CompareOperator::NotIn)
    }

    /// Compare two values. Membership tests go through [`contains`].
    pub fn compare(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        let ordered = |accept: fn(Ordering) -> bool| -> EvalResult<bool> {
            if left.is_na() || right.is_na() {
                return Ok(false);
            }
            if !left.orderable_with(right) {
                return Err(EvalError::NotOrderable {
                    operator: self.as_str(),
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
            Ok(left.compare(right).is_some_and(accept))
        };

        match self {
            CompareOperator::Eq => Ok(left == right),
            CompareOperator::Ne => Ok(left != right),
            CompareOperator::Lt => ordered(|o| o == Ordering::Less),
            CompareOperator::Le => ordered(|o| o != Ordering::Greater),
            CompareOperator::Gt => ordered(|o| o == Ordering::Greater),
            CompareOperator::Ge => ordered(|o| o != Ordering::Less),
            CompareOperator::Is => Ok(left.identical(right)),
            CompareOperator::IsNot => Ok(!left.identical(right)),
            CompareOperator::In => contains(right, left),
            CompareOperator::NotIn => contains(right, left).map(|found| !found),
        }
    }
}

/// Membership of `item` in a container value.
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Na => Ok(false),
        Value::List(values) => Ok(values.iter().any(|v| v.identical(item))),
        Value::Terms(terms) => Ok(item
            .as_str()
            .is_some_and(|item| terms.iter().any(|t| t == item))),
        Value::Map(map) => Ok(item.as_str().is_some_and(|key| map.contains_key(key))),
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            Value::Na => Ok(false),
            other => Err(EvalError::UnsupportedOperand {
                operator: "in",
                left: other.type_name(),
                right: "str",
            }),
        },
        Value::RangeTotal { start, end, .. } => {
            Ok(item.as_i64().is_some_and(|n| (*start..=*end).contains(&n)))
        }
        other => Err(EvalError::NotIterable {
            type_name: other.type_name().to_string(),
        }),
    }
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
            UnaryOperator::Neg => "-",
            UnaryOperator::Pos => "+",
        }
    }

    pub fn apply(&self, operand: &Value) -> EvalResult<Value> {
        match (self, operand) {
            (UnaryOperator::Not, value) => Ok(Value::Bool(!value.is_truthy())),
            (_, Value::Na) => Ok(Value::Na),
            (UnaryOperator::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
            (UnaryOperator::Pos, Value::Float(v)) => Ok(Value::Float(*v)),
            (op, value) => match value.as_i64() {
                Some(i) if *op == UnaryOperator::Neg => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or(EvalError::Overflow { operator: "-" }),
                Some(i) => Ok(Value::Int(i)),
                None => Err(EvalError::UnsupportedUnary {
                    operator: self.as_str(),
                    operand: value.type_name(),
                }),
            },
        }
    }
}
