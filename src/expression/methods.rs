//! Method calls on values and on the `SO` ontology handle.
//!
//! Strings carry the usual text methods plus ontology term queries; term
//! lists (`ANN['Consequence']`) add `any_is_a` and `most_specific_terms`.
//! Methods on NA behave as on an empty string for text methods and are NA
//! (or false for predicates) otherwise.

use super::error::{EvalError, EvalResult};
use crate::environment::RecordEnvironment;
use crate::error::EngineResult;
use crate::value::Value;

const STRING_METHODS: [&str; 12] = [
    "startswith",
    "endswith",
    "lower",
    "upper",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "replace",
    "count",
    "find",
    "join",
];

const TERM_PREDICATES: [&str; 3] = ["is_a", "is_ancestor", "is_descendant"];

const TERM_QUERIES: [&str; 5] = ["path_length", "parents", "children", "ancestors", "descendants"];

fn arity(method: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    Err(EvalError::ArgumentCount {
        function: method.to_string(),
        expected: if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        },
        actual: args.len(),
    })
}

fn unknown(receiver: &Value, method: &str) -> EvalError {
    EvalError::UnknownAttribute {
        type_name: receiver.type_name().to_string(),
        attribute: method.to_string(),
    }
}

fn text_argument<'v>(method: &str, value: &'v Value) -> EvalResult<&'v str> {
    value.as_str().ok_or_else(|| EvalError::InvalidArgument {
        function: method.to_string(),
        message: format!("expected str, got '{}'", value.type_name()),
    })
}

/// Call `receiver.method(args)`.
pub fn call_method(
    env: &RecordEnvironment,
    receiver: &Value,
    method: &str,
    args: &[Value],
) -> EngineResult<Value> {
    let result = match receiver {
        Value::Str(s) if TERM_PREDICATES.contains(&method) || TERM_QUERIES.contains(&method) => {
            return term_method(env, s, method, args)
        }
        Value::Str(s) => string_method(s, method, args),
        Value::Na if STRING_METHODS.contains(&method) => string_method("", method, args),
        Value::Na if TERM_PREDICATES.contains(&method) => {
            arity(method, args, 1, 1).map(|_| Value::Bool(false))
        }
        Value::Na => Ok(Value::Na),
        Value::Terms(terms) if method == "any_is_a" => return any_is_a(env, terms, args),
        Value::Terms(terms) if method == "most_specific_terms" => {
            return most_specific_terms(env, terms, args)
        }
        Value::Terms(terms) => {
            let items: Vec<Value> = terms.iter().cloned().map(Value::Str).collect();
            sequence_method(receiver, &items, method, args)
        }
        Value::List(items) => sequence_method(receiver, items, method, args),
        Value::Map(_) => map_method(receiver, method, args),
        other => Err(unknown(other, method)),
    };
    result.map_err(|error| env.evaluation_error(error))
}

fn prefixes<'v>(method: &str, value: &'v Value) -> EvalResult<Vec<&'v str>> {
    match value {
        Value::List(items) => items.iter().map(|item| text_argument(method, item)).collect(),
        other => Ok(vec![text_argument(method, other)?]),
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    let optional_chars = |args: &[Value]| -> EvalResult<Option<Vec<char>>> {
        arity(method, args, 0, 1)?;
        match args.first() {
            None | Some(Value::Na) => Ok(None),
            Some(chars) => Ok(Some(text_argument(method, chars)?.chars().collect())),
        }
    };

    match method {
        "startswith" => {
            arity(method, args, 1, 1)?;
            let prefixes = prefixes(method, &args[0])?;
            Ok(Value::Bool(prefixes.iter().any(|p| s.starts_with(p))))
        }
        "endswith" => {
            arity(method, args, 1, 1)?;
            let suffixes = prefixes(method, &args[0])?;
            Ok(Value::Bool(suffixes.iter().any(|p| s.ends_with(p))))
        }
        "lower" => arity(method, args, 0, 0).map(|_| Value::Str(s.to_lowercase())),
        "upper" => arity(method, args, 0, 0).map(|_| Value::Str(s.to_uppercase())),
        "strip" => Ok(Value::str(match optional_chars(args)? {
            Some(chars) => s.trim_matches(chars.as_slice()),
            None => s.trim(),
        })),
        "lstrip" => Ok(Value::str(match optional_chars(args)? {
            Some(chars) => s.trim_start_matches(chars.as_slice()),
            None => s.trim_start(),
        })),
        "rstrip" => Ok(Value::str(match optional_chars(args)? {
            Some(chars) => s.trim_end_matches(chars.as_slice()),
            None => s.trim_end(),
        })),
        "split" => split(s, args),
        "replace" => {
            arity(method, args, 2, 3)?;
            let old = text_argument(method, &args[0])?;
            let new = text_argument(method, &args[1])?;
            match args.get(2).and_then(Value::as_i64) {
                Some(count) if count >= 0 => Ok(Value::Str(s.replacen(old, new, count as usize))),
                _ => Ok(Value::Str(s.replace(old, new))),
            }
        }
        "count" => {
            arity(method, args, 1, 1)?;
            let needle = text_argument(method, &args[0])?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "find" => {
            arity(method, args, 1, 1)?;
            let needle = text_argument(method, &args[0])?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            }))
        }
        "join" => {
            arity(method, args, 1, 1)?;
            let items = args[0].iter_values().ok_or_else(|| EvalError::NotIterable {
                type_name: args[0].type_name().to_string(),
            })?;
            let parts = items
                .iter()
                .map(|item| text_argument(method, item).map(str::to_string))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Str(parts.join(s)))
        }
        _ => Err(unknown(&Value::str(s), method)),
    }
}

fn split(s: &str, args: &[Value]) -> EvalResult<Value> {
    arity("split", args, 0, 2)?;
    let limit = match args.get(1) {
        Some(Value::Int(max)) if *max >= 0 => Some(*max as usize + 1),
        _ => None,
    };
    let parts: Vec<Value> = match args.first() {
        None | Some(Value::Na) => s.split_whitespace().map(Value::str).collect(),
        Some(separator) => {
            let separator = text_argument("split", separator)?;
            if separator.is_empty() {
                return Err(EvalError::InvalidArgument {
                    function: "split".to_string(),
                    message: "empty separator".to_string(),
                });
            }
            match limit {
                Some(limit) => s.splitn(limit, separator).map(Value::str).collect(),
                None => s.split(separator).map(Value::str).collect(),
            }
        }
    };
    Ok(Value::List(parts))
}

fn sequence_method(
    receiver: &Value,
    items: &[Value],
    method: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match method {
        "count" => {
            arity(method, args, 1, 1)?;
            Ok(Value::Int(
                items.iter().filter(|item| item.identical(&args[0])).count() as i64,
            ))
        }
        "index" => {
            arity(method, args, 1, 1)?;
            items
                .iter()
                .position(|item| item.identical(&args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| EvalError::InvalidArgument {
                    function: method.to_string(),
                    message: format!("'{}' is not in {}", args[0], receiver.type_name()),
                })
        }
        _ => Err(unknown(receiver, method)),
    }
}

fn map_method(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    let Value::Map(map) = receiver else {
        return Err(unknown(receiver, method));
    };
    match method {
        "get" => {
            arity(method, args, 1, 2)?;
            let key = text_argument(method, &args[0])?;
            Ok(map
                .get(key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Na)))
        }
        "keys" => arity(method, args, 0, 0)
            .map(|_| Value::List(map.keys().cloned().map(Value::Str).collect())),
        "values" => arity(method, args, 0, 0).map(|_| Value::List(map.values().cloned().collect())),
        "items" => arity(method, args, 0, 0).map(|_| {
            Value::List(
                map.iter()
                    .map(|(key, value)| Value::List(vec![Value::str(key.as_str()), value.clone()]))
                    .collect(),
            )
        }),
        _ => Err(unknown(receiver, method)),
    }
}

fn terms_value(terms: Vec<String>) -> Value {
    Value::Terms(terms)
}

fn optional_length(length: Option<u32>) -> Value {
    length.map(|l| Value::Int(l as i64)).unwrap_or(Value::Na)
}

/// Ontology queries on a single term name.
fn term_method(
    env: &RecordEnvironment,
    term: &str,
    method: &str,
    args: &[Value],
) -> EngineResult<Value> {
    let expected = if TERM_PREDICATES.contains(&method) || method == "path_length" {
        1
    } else {
        0
    };
    arity(method, args, expected, expected).map_err(|error| env.evaluation_error(error))?;

    // An NA or empty target never matches
    let target = match args.first() {
        Some(Value::Str(target)) if !target.is_empty() => Some(target.as_str()),
        Some(Value::Str(_)) | Some(Value::Na) if TERM_PREDICATES.contains(&method) => {
            return Ok(Value::Bool(false))
        }
        Some(Value::Str(_)) | Some(Value::Na) => return Ok(Value::Na),
        Some(other) => {
            return Err(env.evaluation_error(EvalError::InvalidArgument {
                function: method.to_string(),
                message: format!("expected a term name, got '{}'", other.type_name()),
            }))
        }
        None => None,
    };

    let ontology = env.ontology()?;
    let target = target.unwrap_or_default();
    Ok(match method {
        "is_a" | "is_descendant" => Value::Bool(ontology.is_a(term, target)?),
        "is_ancestor" => Value::Bool(ontology.is_ancestor(term, target)?),
        "path_length" => optional_length(ontology.path_length(term, target)?),
        "parents" => terms_value(ontology.parents(term)?),
        "children" => terms_value(ontology.children(term)?),
        "ancestors" => terms_value(ontology.get_parents(term)?),
        _ => terms_value(ontology.get_children(term)?),
    })
}

fn any_is_a(env: &RecordEnvironment, terms: &[String], args: &[Value]) -> EngineResult<Value> {
    arity("any_is_a", args, 1, 1).map_err(|error| env.evaluation_error(error))?;
    let target = match &args[0] {
        Value::Str(target) if !target.is_empty() => target,
        _ => return Ok(Value::Bool(false)),
    };
    let ontology = env.ontology()?;
    for term in terms {
        if ontology.is_a(term, target)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn most_specific_terms(
    env: &RecordEnvironment,
    terms: &[String],
    args: &[Value],
) -> EngineResult<Value> {
    arity("most_specific_terms", args, 0, 0).map_err(|error| env.evaluation_error(error))?;
    Ok(terms_value(env.ontology()?.most_specific_terms(terms)?))
}

/// Call `SO.method(args)`.
pub fn call_ontology(env: &RecordEnvironment, method: &str, args: &[Value]) -> EngineResult<Value> {
    let expected = match method {
        "is_a" | "is_ancestor" | "is_descendant" | "path_length" | "shortest_path_length" => 2,
        "get_parents" | "get_children" | "parents" | "children" | "most_specific_terms"
        | "get_id" | "get_term" => 1,
        _ => {
            return Err(env.evaluation_error(EvalError::UnknownAttribute {
                type_name: "SO".to_string(),
                attribute: method.to_string(),
            }))
        }
    };
    arity(method, args, expected, expected).map_err(|error| env.evaluation_error(error))?;

    let not_a_term = |value: &Value| {
        env.evaluation_error(EvalError::InvalidArgument {
            function: method.to_string(),
            message: format!("expected a term name, got '{}'", value.type_name()),
        })
    };
    let term = |index: usize| -> EngineResult<String> {
        match &args[index] {
            Value::Str(term) => Ok(term.clone()),
            other => Err(not_a_term(other)),
        }
    };
    let term_list = |index: usize| -> EngineResult<Vec<String>> {
        match &args[index] {
            Value::Terms(terms) => Ok(terms.clone()),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Str(term) => Ok(term.clone()),
                    other => Err(not_a_term(other)),
                })
                .collect(),
            Value::Str(term) => Ok(vec![term.clone()]),
            Value::Na => Ok(Vec::new()),
            other => Err(not_a_term(other)),
        }
    };

    let ontology = env.ontology()?;
    Ok(match method {
        "is_a" | "is_descendant" => Value::Bool(ontology.is_a(&term(0)?, &term(1)?)?),
        "is_ancestor" => Value::Bool(ontology.is_ancestor(&term(0)?, &term(1)?)?),
        "path_length" => optional_length(ontology.path_length(&term(0)?, &term(1)?)?),
        "shortest_path_length" => {
            optional_length(ontology.shortest_path_length(&term_list(0)?, &term(1)?)?)
        }
        "get_parents" => terms_value(ontology.get_parents(&term(0)?)?),
        "get_children" => terms_value(ontology.get_children(&term(0)?)?),
        "parents" => terms_value(ontology.parents(&term(0)?)?),
        "children" => terms_value(ontology.children(&term(0)?)?),
        "most_specific_terms" => terms_value(ontology.most_specific_terms(&term_list(0)?)?),
        "get_id" => Value::str(ontology.id(&term(0)?)?),
        _ => Value::str(ontology.name(&term(0)?)?),
    })
}
