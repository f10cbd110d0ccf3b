//! Typed values with NA semantics.
//!
//! `Value::Na` is the engine's notion of a missing value. It is never equal,
//! less or greater than anything (itself included), it is falsy, and it sorts
//! after every present value regardless of the requested direction.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on the number of elements a single value may expand to.
pub const MAX_SEQUENCE_LENGTH: usize = 10_000_000;

/// Number of integers in `start..=end`, without overflowing.
fn inclusive_length(start: i64, end: i64) -> usize {
    if end < start {
        return 0;
    }
    usize::try_from(end.saturating_sub(start).saturating_add(1)).unwrap_or(usize::MAX)
}

/// Round a float to 32-bit precision and widen it again.
///
/// Floats read from variant files are stored with 32-bit precision, so any
/// float compared against them must pass through the same rounding.
pub fn coerce_f32(value: f64) -> f64 {
    value as f32 as f64
}

/// A value produced by record access, annotation decoding or evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    Na,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Ordered consequence terms (e.g. `missense_variant&splice_region_variant`).
    Terms(Vec<String>),
    Map(BTreeMap<String, Value>),
    /// A position range; either end may be unknown.
    PosRange {
        start: Option<i64>,
        end: Option<i64>,
    },
    /// An inclusive range (or single number) out of a total, e.g. exon `2-3/10`.
    RangeTotal { start: i64, end: i64, total: i64 },
}

impl Value {
    pub fn from_f32(value: f32) -> Self {
        Value::Float(value as f64)
    }

    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn is_na(&self) -> bool {
        matches!(self, Value::Na)
    }

    /// NA or a NaN float; both sort last.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Na => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Na => "NA",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Terms(_) => "Consequences",
            Value::Map(_) => "dict",
            Value::PosRange { .. } => "PosRange",
            Value::RangeTotal { .. } => "RangeTotal",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Na => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(values) => !values.is_empty(),
            Value::Terms(terms) => !terms.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::PosRange { .. } | Value::RangeTotal { .. } => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality that treats two NAs as the same object.
    ///
    /// Used for membership tests and sequence comparison, where identity is
    /// checked before equality.
    pub fn identical(&self, other: &Value) -> bool {
        (self.is_na() && other.is_na()) || self == other
    }

    /// Whether two values can be ordered at all (ignoring NA).
    pub fn orderable_with(&self, other: &Value) -> bool {
        matches!(
            (self, other),
            (Value::Str(_), Value::Str(_))
                | (Value::List(_), Value::List(_))
                | (Value::Terms(_), Value::Terms(_))
        ) || (self.is_numeric() && other.is_numeric())
    }

    /// Order two values; `None` if either is NA, NaN is involved, or the
    /// types cannot be ordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Na, _) | (_, Value::Na) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Terms(a), Value::Terms(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    if !x.identical(y) {
                        return x.compare(y);
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// Total order used for sorting records and annotations.
    ///
    /// Missing values always come last, for ascending and descending order.
    pub fn sort_cmp(&self, other: &Value, descending: bool) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        if let (Value::List(a), Value::List(b)) = (self, other) {
            for (x, y) in a.iter().zip(b) {
                let ordering = x.sort_cmp(y, descending);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            let ordering = a.len().cmp(&b.len());
            return if descending {
                ordering.reverse()
            } else {
                ordering
            };
        }
        let ordering = self
            .compare(other)
            .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank()));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => 0,
            Value::Str(_) => 1,
            Value::List(_) => 2,
            Value::Terms(_) => 3,
            Value::Map(_) => 4,
            Value::PosRange { .. } => 5,
            Value::RangeTotal { .. } => 6,
            Value::Na => 7,
        }
    }

    /// Number of elements for sized values.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Na => Some(0),
            Value::Str(s) => Some(s.chars().count()),
            Value::List(values) => Some(values.len()),
            Value::Terms(terms) => Some(terms.len()),
            Value::Map(map) => Some(map.len()),
            Value::RangeTotal { start, end, .. } => Some(inclusive_length(*start, *end)),
            _ => None,
        }
    }

    /// The elements produced when iterating over this value.
    pub fn iter_values(&self) -> Option<Vec<Value>> {
        match self {
            Value::Na => Some(Vec::new()),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::List(values) => Some(values.clone()),
            Value::Terms(terms) => Some(terms.iter().cloned().map(Value::Str).collect()),
            Value::Map(map) => Some(map.keys().cloned().map(Value::Str).collect()),
            Value::RangeTotal { start, end, .. } => {
                if inclusive_length(*start, *end) > MAX_SEQUENCE_LENGTH {
                    return None;
                }
                Some((*start..=*end).map(Value::Int).collect())
            }
            _ => None,
        }
    }

    /// Attribute access on structured values. Attributes of NA are NA.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let optional = |v: &Option<i64>| v.map(Value::Int).unwrap_or(Value::Na);
        match (self, name) {
            (Value::Na, _) => Some(Value::Na),
            (Value::PosRange { start, .. }, "start") => Some(optional(start)),
            (Value::PosRange { end, .. }, "end") => Some(optional(end)),
            (Value::PosRange { start, end }, "length") => Some(match (start, end) {
                (Some(s), Some(e)) => e.checked_sub(*s).map_or(Value::Na, Value::Int),
                _ => Value::Na,
            }),
            (Value::RangeTotal { start, .. }, "start" | "number") => Some(Value::Int(*start)),
            (Value::RangeTotal { end, .. }, "end") => Some(Value::Int(*end)),
            (Value::RangeTotal { total, .. }, "total") => Some(Value::Int(*total)),
            (Value::RangeTotal { .. }, "range") => {
                Some(self.iter_values().map_or(Value::Na, Value::List))
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Na, _) | (_, Value::Na) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
            }
            (Value::Terms(a), Value::Terms(b)) => a == b,
            (Value::Terms(terms), Value::List(values))
            | (Value::List(values), Value::Terms(terms)) => {
                terms.len() == values.len()
                    && terms
                        .iter()
                        .zip(values)
                        .all(|(t, v)| v.as_str() == Some(t.as_str()))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(key, value)| b.get(key).is_some_and(|v| value.identical(v)))
            }
            (
                Value::PosRange { start, end },
                Value::PosRange {
                    start: other_start,
                    end: other_end,
                },
            ) => start == other_start && end == other_end,
            (
                Value::RangeTotal { start, end, total },
                Value::RangeTotal {
                    start: other_start,
                    end: other_end,
                    total: other_total,
                },
            ) => start == other_start && end == other_end && total == other_total,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{}inf", sign)
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Na => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
            Value::Terms(terms) => write!(f, "{}", terms.join("&")),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::PosRange { .. } => write!(
                f,
                "(start: {}, end: {}, length: {})",
                self.attribute("start").unwrap_or(Value::Na),
                self.attribute("end").unwrap_or(Value::Na),
                self.attribute("length").unwrap_or(Value::Na),
            ),
            Value::RangeTotal { start, end, total } if start == end => {
                write!(f, "number / total: {} / {}", start, total)
            }
            Value::RangeTotal { start, end, total } => {
                write!(f, "range / total: {} - {} / {}", start, end, total)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Na => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Value::Terms(terms) => {
                let mut seq = serializer.serialize_seq(Some(terms.len()))?;
                for term in terms {
                    seq.serialize_element(term)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::PosRange { start, end } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("start", start)?;
                map.serialize_entry("end", end)?;
                map.serialize_entry("length", &self.attribute("length"))?;
                map.end()
            }
            Value::RangeTotal { start, end, total } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("start", start)?;
                map.serialize_entry("end", end)?;
                map.serialize_entry("total", total)?;
                map.end()
            }
        }
    }
}
