//! Error types for expression evaluation.

use std::fmt;

/// Errors raised while evaluating a compiled expression.
///
/// These carry no record context; the environment attaches it when lifting
/// them into `EngineError::Evaluation`.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Binary operator applied to unsupported operand types
    UnsupportedOperand {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// Unary operator applied to an unsupported operand type
    UnsupportedUnary {
        operator: &'static str,
        operand: &'static str,
    },

    /// Ordering comparison between incompatible types
    NotOrderable {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    NotIterable { type_name: String },

    NotSubscriptable { type_name: String },

    /// Subscript with a key of the wrong type
    InvalidIndex {
        type_name: String,
        index_type: &'static str,
    },

    UnknownAttribute {
        type_name: String,
        attribute: String,
    },

    UnknownName { name: String },

    /// A lookup handle such as INFO used where a value is required
    NotAValue { name: String },

    NotCallable { name: String },

    /// Wrong number of function arguments
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    InvalidArgument { function: String, message: String },

    UnexpectedKeyword { function: String, keyword: String },

    DivisionByZero,

    Overflow { operator: &'static str },

    /// A repetition or range that would exceed the element limit
    SequenceTooLong { limit: usize },

    InvalidRegex { pattern: String, message: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnsupportedOperand {
                operator,
                left,
                right,
            } => {
                write!(
                    f,
                    "Unsupported operand types for {}: '{}' and '{}'",
                    operator, left, right
                )
            }

            EvalError::UnsupportedUnary { operator, operand } => {
                write!(f, "Bad operand type for unary {}: '{}'", operator, operand)
            }

            EvalError::NotOrderable {
                operator,
                left,
                right,
            } => {
                write!(
                    f,
                    "'{}' not supported between instances of '{}' and '{}'",
                    operator, left, right
                )
            }

            EvalError::NotIterable { type_name } => {
                write!(f, "'{}' object is not iterable", type_name)
            }

            EvalError::NotSubscriptable { type_name } => {
                write!(f, "'{}' object is not subscriptable", type_name)
            }

            EvalError::InvalidIndex {
                type_name,
                index_type,
            } => {
                write!(
                    f,
                    "'{}' indices must not be of type '{}'",
                    type_name, index_type
                )
            }

            EvalError::UnknownAttribute {
                type_name,
                attribute,
            } => {
                write!(f, "'{}' object has no attribute '{}'", type_name, attribute)
            }

            EvalError::UnknownName { name } => write!(f, "Name '{}' is not defined", name),

            EvalError::NotAValue { name } => {
                write!(f, "'{}' cannot be used as a value", name)
            }

            EvalError::NotCallable { name } => write!(f, "'{}' is not callable", name),

            EvalError::ArgumentCount {
                function,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "{}() takes {} arguments but {} were given",
                    function, expected, actual
                )
            }

            EvalError::InvalidArgument { function, message } => {
                write!(f, "{}(): {}", function, message)
            }

            EvalError::UnexpectedKeyword { function, keyword } => {
                write!(
                    f,
                    "{}() got an unexpected keyword argument '{}'",
                    function, keyword
                )
            }

            EvalError::DivisionByZero => write!(f, "Division by zero"),

            EvalError::Overflow { operator } => {
                write!(f, "Integer overflow in {}", operator)
            }

            EvalError::SequenceTooLong { limit } => {
                write!(f, "Sequence would exceed {} elements", limit)
            }

            EvalError::InvalidRegex { pattern, message } => {
                write!(f, "Invalid regular expression '{}': {}", pattern, message)
            }
        }
    }
}

impl std::error::Error for EvalError {}

/// Result type for evaluation helpers that have no record context.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EvalError::UnsupportedOperand {
            operator: "-",
            left: "str",
            right: "int",
        };
        assert_eq!(
            err.to_string(),
            "Unsupported operand types for -: 'str' and 'int'"
        );

        let err = EvalError::NotOrderable {
            operator: "<",
            left: "str",
            right: "int",
        };
        assert_eq!(
            err.to_string(),
            "'<' not supported between instances of 'str' and 'int'"
        );

        let err = EvalError::ArgumentCount {
            function: "len".to_string(),
            expected: "1".to_string(),
            actual: 2,
        };
        assert_eq!(err.to_string(), "len() takes 1 arguments but 2 were given");

        assert_eq!(EvalError::DivisionByZero.to_string(), "Division by zero");
    }
}
