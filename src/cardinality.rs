//! VCF field multiplicity (`Number=`) and its enforcement on read.

use crate::error::{EngineError, RecordRef};
use crate::record::RawField;
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Declared number of values of an INFO or FORMAT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Number {
    /// A fixed count; `Fixed(0)` marks a flag.
    Fixed(usize),
    /// `A`: one value per alternate allele.
    PerAlt,
    /// `R`: one value per allele, reference included.
    PerAllele,
    /// `G`: one value per possible genotype (FORMAT only).
    PerGenotype,
    /// `.`: any number of values.
    Unbounded,
}

impl Number {
    pub fn is_flag(&self) -> bool {
        matches!(self, Number::Fixed(0))
    }
}

impl FromStr for Number {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Number::PerAlt),
            "R" => Ok(Number::PerAllele),
            "G" => Ok(Number::PerGenotype),
            "." => Ok(Number::Unbounded),
            other => other
                .parse::<usize>()
                .map(Number::Fixed)
                .map_err(|_| EngineError::InvalidNumber {
                    value: s.to_string(),
                    reason: "expected one of A, R, G, . or a non-negative integer".to_string(),
                }),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Fixed(n) => write!(f, "{}", n),
            Number::PerAlt => write!(f, "A"),
            Number::PerAllele => write!(f, "R"),
            Number::PerGenotype => write!(f, "G"),
            Number::Unbounded => write!(f, "."),
        }
    }
}

/// A multiplicity rule broken by the values of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityViolation {
    MoreThanOneAlt { count: usize },
    NotExactlyOne { count: usize },
}

impl CardinalityViolation {
    pub fn into_error(self, field: &str, record: RecordRef) -> EngineError {
        match self {
            CardinalityViolation::MoreThanOneAlt { count } => {
                EngineError::MoreThanOneAltAllele { count, record }
            }
            CardinalityViolation::NotExactlyOne { count } => EngineError::NotExactlyOneValue {
                field: field.to_string(),
                count,
                record,
            },
        }
    }
}

/// Shape raw field values according to their declared number.
///
/// Absent fields are NA, except flags, which are false. Per-alt fields yield
/// the single value of the one supported alternate allele; per-allele fields
/// yield a `[ref, alt]` pair, padded with NA when only one value is present.
pub fn type_field(raw: Option<&RawField>, number: Number) -> Result<Value, CardinalityViolation> {
    let values = match raw {
        None if number.is_flag() => return Ok(Value::Bool(false)),
        None => return Ok(Value::Na),
        Some(RawField::Flag) => return Ok(Value::Bool(true)),
        Some(RawField::Values(_)) if number.is_flag() => return Ok(Value::Bool(true)),
        Some(RawField::Values(values)) => values,
    };

    match number {
        Number::PerAlt => match values.len() {
            0 => Ok(Value::Na),
            1 => Ok(values[0].clone()),
            count => Err(CardinalityViolation::MoreThanOneAlt { count }),
        },
        Number::PerAllele => match values.len() {
            1 => Ok(Value::List(vec![values[0].clone(), Value::Na])),
            count if count > 2 => Err(CardinalityViolation::MoreThanOneAlt { count }),
            _ => Ok(Value::List(values.clone())),
        },
        Number::Fixed(1) => match values.len() {
            1 => Ok(values[0].clone()),
            count => Err(CardinalityViolation::NotExactlyOne { count }),
        },
        _ => Ok(Value::List(values.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(values: &[Value]) -> RawField {
        RawField::Values(values.to_vec())
    }

    #[test]
    fn test_parse_number() {
        assert_eq!("A".parse::<Number>().unwrap(), Number::PerAlt);
        assert_eq!("R".parse::<Number>().unwrap(), Number::PerAllele);
        assert_eq!("G".parse::<Number>().unwrap(), Number::PerGenotype);
        assert_eq!(".".parse::<Number>().unwrap(), Number::Unbounded);
        assert_eq!("2".parse::<Number>().unwrap(), Number::Fixed(2));
        assert!(matches!(
            "X".parse::<Number>(),
            Err(EngineError::InvalidNumber { .. })
        ));
        assert_eq!(Number::PerAllele.to_string(), "R");
    }

    #[test]
    fn test_flags() {
        assert_eq!(
            type_field(None, Number::Fixed(0)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            type_field(Some(&RawField::Flag), Number::Fixed(0)).unwrap(),
            Value::Bool(true)
        );
        assert!(type_field(None, Number::Fixed(1)).unwrap().is_na());
    }

    #[test]
    fn test_exactly_one_value() {
        let raw = values(&[Value::Int(7)]);
        assert_eq!(type_field(Some(&raw), Number::Fixed(1)).unwrap(), Value::Int(7));

        let raw = values(&[Value::Int(7), Value::Int(8)]);
        assert_eq!(
            type_field(Some(&raw), Number::Fixed(1)),
            Err(CardinalityViolation::NotExactlyOne { count: 2 })
        );
    }

    #[test]
    fn test_per_alt_and_per_allele() {
        let raw = values(&[Value::Float(0.5)]);
        assert_eq!(
            type_field(Some(&raw), Number::PerAlt).unwrap(),
            Value::Float(0.5)
        );

        let raw = values(&[Value::Float(0.5), Value::Float(0.1)]);
        assert_eq!(
            type_field(Some(&raw), Number::PerAlt),
            Err(CardinalityViolation::MoreThanOneAlt { count: 2 })
        );

        let raw = values(&[Value::Int(3)]);
        let typed = type_field(Some(&raw), Number::PerAllele).unwrap();
        assert_eq!(typed, Value::List(vec![Value::Int(3), Value::Na]));

        let raw = values(&[Value::Int(3), Value::Int(4), Value::Int(5)]);
        assert_eq!(
            type_field(Some(&raw), Number::PerAllele),
            Err(CardinalityViolation::MoreThanOneAlt { count: 3 })
        );
    }

    #[test]
    fn test_unbounded_yields_list() {
        let raw = values(&[Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            type_field(Some(&raw), Number::Unbounded).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            type_field(Some(&raw), Number::Fixed(3)).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_violation_into_error() {
        let err = CardinalityViolation::NotExactlyOne { count: 2 }
            .into_error("DP", RecordRef::new(4, ""));
        assert!(matches!(
            err,
            EngineError::NotExactlyOneValue { ref field, count: 2, ref record }
                if field == "DP" && record.index == 4
        ));
    }
}
