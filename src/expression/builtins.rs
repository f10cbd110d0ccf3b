//! The fixed set of functions and constants an expression may use.
//!
//! `Builtins` is built once and shared by the compiler (to validate names)
//! and the environment (to call them). Nothing outside this registry and the
//! record fields is reachable from an expression.

use super::error::{EvalError, EvalResult};
use super::genotype;
use super::operator::BinaryOperator;
use crate::environment::RecordEnvironment;
use crate::error::EngineResult;
use crate::value::{Value, MAX_SEQUENCE_LENGTH};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts;

pub type PureFn = fn(&[Value]) -> EvalResult<Value>;
pub type RecordFn = fn(&mut RecordEnvironment, &[Value]) -> EngineResult<Value>;

/// Functions taking another function as their first argument; the evaluator
/// applies them itself.
const HIGHER_ORDER: [&str; 2] = ["filter", "map"];

/// A callable builtin. Pure functions only see their arguments; record
/// functions may consult the active record.
#[derive(Debug, Clone, Copy)]
pub enum Builtin {
    Pure(PureFn),
    Record(RecordFn),
}

impl Builtin {
    pub fn call(self, env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
        match self {
            Builtin::Pure(function) => function(args).map_err(|error| env.evaluation_error(error)),
            Builtin::Record(function) => function(env, args),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Builtins {
    functions: HashMap<&'static str, Builtin>,
    constants: HashMap<&'static str, Value>,
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl Builtins {
    pub fn new() -> Self {
        let pure: [(&'static str, PureFn); 40] = [
            ("abs", abs),
            ("all", all),
            ("any", any),
            ("bool", bool),
            ("chr", chr),
            ("dict", dict),
            ("enumerate", enumerate),
            ("float", float),
            ("int", int),
            ("iter", iter),
            ("len", len),
            ("list", list),
            ("max", max),
            ("min", min),
            ("next", next),
            ("ord", ord),
            ("range", range),
            ("reversed", reversed),
            ("round", round),
            ("set", set),
            ("sorted", sorted),
            ("str", str),
            ("sum", sum),
            ("tuple", list),
            ("zip", zip),
            ("sqrt", sqrt),
            ("log", log),
            ("log10", log10),
            ("log2", log2),
            ("exp", exp),
            ("pow", pow),
            ("floor", floor),
            ("ceil", ceil),
            ("fabs", fabs),
            ("isnan", isnan),
            ("isinf", isinf),
            ("without_na", without_na),
            ("replace_na", replace_na),
            ("asc", asc),
            ("desc", desc),
        ];
        let record: [(&'static str, RecordFn); 15] = [
            ("re.search", re_search),
            ("re.match", re_match),
            ("re.fullmatch", re_fullmatch),
            ("is_hom", genotype::is_hom),
            ("is_het", genotype::is_het),
            ("is_hom_ref", genotype::is_hom_ref),
            ("is_hom_alt", genotype::is_hom_alt),
            ("has_ref", genotype::has_ref),
            ("has_alt", genotype::has_alt),
            ("count_hom", genotype::count_hom),
            ("count_het", genotype::count_het),
            ("count_hom_ref", genotype::count_hom_ref),
            ("count_hom_alt", genotype::count_hom_alt),
            ("count_any_ref", genotype::count_any_ref),
            ("count_any_var", genotype::count_any_var),
        ];

        let mut functions = HashMap::new();
        for (name, function) in pure {
            functions.insert(name, Builtin::Pure(function));
        }
        for (name, function) in record {
            functions.insert(name, Builtin::Record(function));
        }

        let constants = HashMap::from([
            ("pi", Value::Float(consts::PI)),
            ("e", Value::Float(consts::E)),
            ("inf", Value::Float(f64::INFINITY)),
            ("nan", Value::Float(f64::NAN)),
        ]);

        Self {
            functions,
            constants,
        }
    }

    pub fn function(&self, name: &str) -> Option<Builtin> {
        self.functions.get(name).copied()
    }

    pub fn constant(&self, name: &str) -> Option<Value> {
        self.constants.get(name).cloned()
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.is_higher_order(name)
    }

    /// `filter` and `map`. They are not in the call table since their first
    /// argument is a function rather than a value.
    pub fn is_higher_order(&self, name: &str) -> bool {
        HIGHER_ORDER.contains(&name)
    }

    /// Whether `function` takes the keyword argument `keyword`.
    pub fn accepts_keyword(&self, function: &str, keyword: &str) -> bool {
        matches!(
            (function, keyword),
            ("sorted", "key" | "reverse") | ("max" | "min", "key" | "default") | ("dict", _)
        )
    }

    pub fn keyword_takes_function(&self, function: &str, keyword: &str) -> bool {
        keyword == "key" && matches!(function, "sorted" | "max" | "min")
    }

    /// Whether `name` is a module such as `re`, usable only as `name.function(...)`.
    pub fn is_module(&self, name: &str) -> bool {
        self.functions.keys().any(|function| {
            function
                .split_once('.')
                .is_some_and(|(module, _)| module == name)
        })
    }
}

fn check_arity(function: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if max == usize::MAX {
        format!("at least {}", min)
    } else if min == max {
        min.to_string()
    } else {
        format!("{} to {}", min, max)
    };
    Err(EvalError::ArgumentCount {
        function: function.to_string(),
        expected,
        actual: args.len(),
    })
}

fn invalid(function: &str, message: impl Into<String>) -> EvalError {
    EvalError::InvalidArgument {
        function: function.to_string(),
        message: message.into(),
    }
}

fn bad_type(function: &str, value: &Value) -> EvalError {
    invalid(function, format!("bad operand type '{}'", value.type_name()))
}

fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    value.iter_values().ok_or_else(|| EvalError::NotIterable {
        type_name: value.type_name().to_string(),
    })
}

fn integer(function: &str, value: &Value) -> EvalResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(invalid(
            function,
            format!("'{}' cannot be interpreted as an integer", other.type_name()),
        )),
    }
}

/// Sort direction markers; the sort driver reads them off the syntax tree.
fn asc(args: &[Value]) -> EvalResult<Value> {
    check_arity("asc", args, 1, 1)?;
    Ok(args[0].clone())
}

fn desc(args: &[Value]) -> EvalResult<Value> {
    check_arity("desc", args, 1, 1)?;
    Ok(args[0].clone())
}

fn abs(args: &[Value]) -> EvalResult<Value> {
    check_arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Na => Ok(Value::Na),
        Value::Float(v) => Ok(Value::Float(v.abs())),
        value => match value.as_i64() {
            Some(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or(EvalError::Overflow { operator: "abs" }),
            None => Err(bad_type("abs", value)),
        },
    }
}

fn all(args: &[Value]) -> EvalResult<Value> {
    check_arity("all", args, 1, 1)?;
    Ok(Value::Bool(iterate(&args[0])?.iter().all(Value::is_truthy)))
}

fn any(args: &[Value]) -> EvalResult<Value> {
    check_arity("any", args, 1, 1)?;
    Ok(Value::Bool(iterate(&args[0])?.iter().any(Value::is_truthy)))
}

fn bool(args: &[Value]) -> EvalResult<Value> {
    check_arity("bool", args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
}

fn chr(args: &[Value]) -> EvalResult<Value> {
    check_arity("chr", args, 1, 1)?;
    let code = integer("chr", &args[0])?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Str(c.to_string()))
        .ok_or_else(|| invalid("chr", format!("{} is not a valid code point", code)))
}

/// `dict()`, `dict(mapping)` or `dict(pairs)`; keys must be strings.
fn dict(args: &[Value]) -> EvalResult<Value> {
    check_arity("dict", args, 0, 1)?;
    let mut entries = BTreeMap::new();
    match args.first() {
        None => {}
        Some(Value::Map(map)) => entries = map.clone(),
        Some(pairs) => {
            for pair in iterate(pairs)? {
                let (key, value) = match iterate(&pair)?.as_slice() {
                    [key, value] => (key.clone(), value.clone()),
                    items => {
                        return Err(invalid(
                            "dict",
                            format!("dictionary update sequence element has length {}; 2 is required", items.len()),
                        ))
                    }
                };
                match key {
                    Value::Str(key) => {
                        entries.insert(key, value);
                    }
                    other => {
                        return Err(invalid(
                            "dict",
                            format!("keys must be str, not '{}'", other.type_name()),
                        ))
                    }
                }
            }
        }
    }
    Ok(Value::Map(entries))
}

fn enumerate(args: &[Value]) -> EvalResult<Value> {
    check_arity("enumerate", args, 1, 2)?;
    let start = match args.get(1) {
        Some(start) => integer("enumerate", start)?,
        None => 0,
    };
    Ok(Value::List(
        iterate(&args[0])?
            .into_iter()
            .zip(start..)
            .map(|(value, i)| Value::List(vec![Value::Int(i), value]))
            .collect(),
    ))
}

fn float(args: &[Value]) -> EvalResult<Value> {
    check_arity("float", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Na) => Ok(Value::Na),
        Some(Value::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid("float", format!("could not convert '{}' to float", s))),
        Some(value) => value
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| bad_type("float", value)),
    }
}

fn int(args: &[Value]) -> EvalResult<Value> {
    check_arity("int", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Na) => Ok(Value::Na),
        Some(Value::Float(v)) => float_to_int("int", v.trunc()),
        Some(Value::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid("int", format!("invalid literal for int(): '{}'", s))),
        Some(value) => value
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| bad_type("int", value)),
    }
}

fn float_to_int(function: &str, value: f64) -> EvalResult<Value> {
    if !value.is_finite() {
        return Err(invalid(function, format!("cannot convert {} to integer", value)));
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(EvalError::Overflow { operator: "int" });
    }
    Ok(Value::Int(value as i64))
}

fn len(args: &[Value]) -> EvalResult<Value> {
    check_arity("len", args, 1, 1)?;
    args[0]
        .length()
        .map(|length| Value::Int(length as i64))
        .ok_or_else(|| {
            invalid(
                "len",
                format!("object of type '{}' has no len()", args[0].type_name()),
            )
        })
}

fn list(args: &[Value]) -> EvalResult<Value> {
    check_arity("list", args, 0, 1)?;
    match args.first() {
        Some(value) => Ok(Value::List(iterate(value)?)),
        None => Ok(Value::List(Vec::new())),
    }
}

fn set(args: &[Value]) -> EvalResult<Value> {
    check_arity("set", args, 0, 1)?;
    let mut unique: Vec<Value> = Vec::new();
    if let Some(value) = args.first() {
        for item in iterate(value)? {
            if !unique.iter().any(|seen| seen.identical(&item)) {
                unique.push(item);
            }
        }
    }
    Ok(Value::List(unique))
}

/// Items of one iterable argument, or the arguments themselves.
fn candidates(function: &str, args: &[Value]) -> EvalResult<Vec<Value>> {
    check_arity(function, args, 1, usize::MAX)?;
    let values = if args.len() == 1 {
        iterate(&args[0])?
    } else {
        args.to_vec()
    };
    if values.is_empty() {
        return Err(invalid(function, "arg is an empty sequence"));
    }
    Ok(values)
}

/// The item whose key wins under `keep`. Items with an NA key are skipped;
/// if every key is NA the result is NA.
fn extreme_by_keys(
    items: Vec<Value>,
    keys: Vec<Value>,
    operator: &'static str,
    keep: std::cmp::Ordering,
) -> EvalResult<Value> {
    let mut best: Option<(Value, Value)> = None;
    for (item, key) in items.into_iter().zip(keys).filter(|(_, key)| !key.is_na()) {
        best = match best {
            None => Some((item, key)),
            Some((current, current_key)) => {
                if !key.orderable_with(&current_key) {
                    return Err(EvalError::NotOrderable {
                        operator,
                        left: key.type_name(),
                        right: current_key.type_name(),
                    });
                }
                if key.compare(&current_key) == Some(keep) {
                    Some((item, key))
                } else {
                    Some((current, current_key))
                }
            }
        };
    }
    Ok(best.map_or(Value::Na, |(item, _)| item))
}

/// First item with the greatest key.
pub(super) fn max_by_keys(items: Vec<Value>, keys: Vec<Value>) -> EvalResult<Value> {
    extreme_by_keys(items, keys, ">", std::cmp::Ordering::Greater)
}

pub(super) fn min_by_keys(items: Vec<Value>, keys: Vec<Value>) -> EvalResult<Value> {
    extreme_by_keys(items, keys, "<", std::cmp::Ordering::Less)
}

fn max(args: &[Value]) -> EvalResult<Value> {
    let values = candidates("max", args)?;
    max_by_keys(values.clone(), values)
}

fn min(args: &[Value]) -> EvalResult<Value> {
    let values = candidates("min", args)?;
    min_by_keys(values.clone(), values)
}

/// Iterators are materialized; `next` then reads from the front.
fn iter(args: &[Value]) -> EvalResult<Value> {
    check_arity("iter", args, 1, 1)?;
    iterate(&args[0]).map(Value::List)
}

/// First item of an iterable, or `default` once it is exhausted.
fn next(args: &[Value]) -> EvalResult<Value> {
    check_arity("next", args, 1, 2)?;
    match iterate(&args[0])?.into_iter().next() {
        Some(item) => Ok(item),
        None => args
            .get(1)
            .cloned()
            .ok_or_else(|| invalid("next", "iterator is exhausted")),
    }
}

fn ord(args: &[Value]) -> EvalResult<Value> {
    check_arity("ord", args, 1, 1)?;
    let s = args[0].as_str().ok_or_else(|| bad_type("ord", &args[0]))?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(invalid(
            "ord",
            format!("expected a character, but string of length {} found", s.chars().count()),
        )),
    }
}

fn range(args: &[Value]) -> EvalResult<Value> {
    check_arity("range", args, 1, 3)?;
    let bounds = args
        .iter()
        .map(|arg| integer("range", arg))
        .collect::<EvalResult<Vec<i64>>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(invalid("range", "expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(invalid("range", "arg 3 must not be zero"));
    }

    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    let length = if span <= 0 {
        0
    } else {
        (span - 1) / step.saturating_abs() + 1
    };
    if length > MAX_SEQUENCE_LENGTH as i64 {
        return Err(EvalError::SequenceTooLong {
            limit: MAX_SEQUENCE_LENGTH,
        });
    }

    Ok(Value::List(
        (0..length).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn reversed(args: &[Value]) -> EvalResult<Value> {
    check_arity("reversed", args, 1, 1)?;
    let mut values = iterate(&args[0])?;
    values.reverse();
    Ok(Value::List(values))
}

/// Round half to even.
fn round(args: &[Value]) -> EvalResult<Value> {
    check_arity("round", args, 1, 2)?;
    let digits = match args.get(1) {
        None | Some(Value::Na) => None,
        Some(digits) => Some(integer("round", digits)?),
    };

    match (&args[0], digits) {
        (Value::Na, _) => Ok(Value::Na),
        (Value::Float(v), None) => float_to_int("round", v.round_ties_even()),
        (Value::Float(v), Some(digits)) => {
            let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
            Ok(Value::Float((v * factor).round_ties_even() / factor))
        }
        (value, digits) => {
            let i = value.as_i64().ok_or_else(|| bad_type("round", value))?;
            match digits {
                Some(digits) if digits < 0 => {
                    let factor = 10f64.powi((-digits).min(308) as i32);
                    float_to_int("round", (i as f64 / factor).round_ties_even() * factor)
                }
                _ => Ok(Value::Int(i)),
            }
        }
    }
}

/// Stable sort of `items` by `keys`. NA keys sort last in either direction.
pub(super) fn sort_by_keys(items: Vec<Value>, keys: Vec<Value>, reverse: bool) -> EvalResult<Value> {
    let mut present = keys.iter().filter(|key| !key.is_na());
    if let Some(first) = present.next() {
        if let Some(other) = present.find(|key| !key.orderable_with(first)) {
            return Err(EvalError::NotOrderable {
                operator: "<",
                left: other.type_name(),
                right: first.type_name(),
            });
        }
    }

    let mut pairs: Vec<(Value, Value)> = keys.into_iter().zip(items).collect();
    pairs.sort_by(|(a, _), (b, _)| a.sort_cmp(b, reverse));
    Ok(Value::List(pairs.into_iter().map(|(_, item)| item).collect()))
}

fn sorted(args: &[Value]) -> EvalResult<Value> {
    check_arity("sorted", args, 1, 1)?;
    let values = iterate(&args[0])?;
    sort_by_keys(values.clone(), values, false)
}

fn str(args: &[Value]) -> EvalResult<Value> {
    check_arity("str", args, 0, 1)?;
    Ok(Value::Str(
        args.first().map(|value| value.to_string()).unwrap_or_default(),
    ))
}

fn sum(args: &[Value]) -> EvalResult<Value> {
    check_arity("sum", args, 1, 2)?;
    let start = args.get(1).cloned().unwrap_or(Value::Int(0));
    iterate(&args[0])?
        .iter()
        .try_fold(start, |total, value| BinaryOperator::Add.apply(&total, value))
}

fn zip(args: &[Value]) -> EvalResult<Value> {
    let columns = args.iter().map(iterate).collect::<EvalResult<Vec<_>>>()?;
    let length = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::List(
        (0..length)
            .map(|i| Value::List(columns.iter().map(|column| column[i].clone()).collect()))
            .collect(),
    ))
}

/// Apply a float function to a single numeric argument; NA passes through.
fn unary_float(
    function: &str,
    args: &[Value],
    apply: impl FnOnce(f64) -> EvalResult<Value>,
) -> EvalResult<Value> {
    check_arity(function, args, 1, 1)?;
    match &args[0] {
        Value::Na => Ok(Value::Na),
        value => apply(value.as_f64().ok_or_else(|| bad_type(function, value))?),
    }
}

fn domain_error(function: &str) -> EvalError {
    invalid(function, "math domain error")
}

fn sqrt(args: &[Value]) -> EvalResult<Value> {
    unary_float("sqrt", args, |x| {
        if x < 0.0 {
            Err(domain_error("sqrt"))
        } else {
            Ok(Value::Float(x.sqrt()))
        }
    })
}

fn log(args: &[Value]) -> EvalResult<Value> {
    check_arity("log", args, 1, 2)?;
    let base = match args.get(1) {
        None => None,
        Some(Value::Na) => return Ok(Value::Na),
        Some(base) => Some(base.as_f64().ok_or_else(|| bad_type("log", base))?),
    };
    unary_float("log", &args[..1], |x| {
        if x <= 0.0 || base.is_some_and(|b| b <= 0.0 || b == 1.0) {
            return Err(domain_error("log"));
        }
        Ok(Value::Float(match base {
            Some(base) => x.ln() / base.ln(),
            None => x.ln(),
        }))
    })
}

fn log10(args: &[Value]) -> EvalResult<Value> {
    unary_float("log10", args, |x| {
        if x <= 0.0 {
            Err(domain_error("log10"))
        } else {
            Ok(Value::Float(x.log10()))
        }
    })
}

fn log2(args: &[Value]) -> EvalResult<Value> {
    unary_float("log2", args, |x| {
        if x <= 0.0 {
            Err(domain_error("log2"))
        } else {
            Ok(Value::Float(x.log2()))
        }
    })
}

fn exp(args: &[Value]) -> EvalResult<Value> {
    unary_float("exp", args, |x| Ok(Value::Float(x.exp())))
}

fn pow(args: &[Value]) -> EvalResult<Value> {
    check_arity("pow", args, 2, 2)?;
    if args.iter().any(Value::is_na) {
        return Ok(Value::Na);
    }
    let base = args[0].as_f64().ok_or_else(|| bad_type("pow", &args[0]))?;
    let exponent = args[1].as_f64().ok_or_else(|| bad_type("pow", &args[1]))?;
    Ok(Value::Float(base.powf(exponent)))
}

fn floor(args: &[Value]) -> EvalResult<Value> {
    unary_float("floor", args, |x| float_to_int("floor", x.floor()))
}

fn ceil(args: &[Value]) -> EvalResult<Value> {
    unary_float("ceil", args, |x| float_to_int("ceil", x.ceil()))
}

fn fabs(args: &[Value]) -> EvalResult<Value> {
    unary_float("fabs", args, |x| Ok(Value::Float(x.abs())))
}

fn isnan(args: &[Value]) -> EvalResult<Value> {
    unary_float("isnan", args, |x| Ok(Value::Bool(x.is_nan())))
}

fn isinf(args: &[Value]) -> EvalResult<Value> {
    unary_float("isinf", args, |x| Ok(Value::Bool(x.is_infinite())))
}

fn without_na(args: &[Value]) -> EvalResult<Value> {
    check_arity("without_na", args, 1, 1)?;
    Ok(Value::List(
        iterate(&args[0])?
            .into_iter()
            .filter(|value| !value.is_na())
            .collect(),
    ))
}

/// `replace_na(value, default)`; lists are replaced element-wise.
fn replace_na(args: &[Value]) -> EvalResult<Value> {
    check_arity("replace_na", args, 2, 2)?;
    let default = &args[1];
    Ok(match &args[0] {
        Value::Na => default.clone(),
        Value::List(values) => Value::List(
            values
                .iter()
                .map(|value| {
                    if value.is_na() {
                        default.clone()
                    } else {
                        value.clone()
                    }
                })
                .collect(),
        ),
        value => value.clone(),
    })
}

/// `(pattern, text)` arguments of the `re` functions; NA text is empty.
fn regex_arguments(
    env: &RecordEnvironment,
    function: &str,
    args: &[Value],
) -> EngineResult<(String, String)> {
    check_arity(function, args, 2, 2).map_err(|error| env.evaluation_error(error))?;
    let text = |value: &Value| match value {
        Value::Na => Ok(String::new()),
        Value::Str(s) => Ok(s.clone()),
        other => Err(env.evaluation_error(bad_type(function, other))),
    };
    Ok((text(&args[0])?, text(&args[1])?))
}

fn regex_test(
    env: &mut RecordEnvironment,
    function: &str,
    args: &[Value],
    anchor: fn(&str) -> String,
) -> EngineResult<Value> {
    let (pattern, text) = regex_arguments(env, function, args)?;
    let regex = env.regex(&anchor(&pattern))?;
    Ok(Value::Bool(regex.is_match(&text)))
}

fn re_search(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    regex_test(env, "re.search", args, |pattern| pattern.to_string())
}

fn re_match(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    regex_test(env, "re.match", args, |pattern| format!(r"\A(?:{})", pattern))
}

fn re_fullmatch(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    regex_test(env, "re.fullmatch", args, |pattern| {
        format!(r"\A(?:{})\z", pattern)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Header;
    use std::sync::Arc;

    fn call(name: &str, args: &[Value]) -> EngineResult<Value> {
        let builtins = Arc::new(Builtins::new());
        let mut env = RecordEnvironment::new(Arc::new(Header::default()), "ANN", builtins.clone());
        builtins.function(name).unwrap().call(&mut env, args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_registry() {
        let builtins = Builtins::new();
        assert!(builtins.is_function("len"));
        assert!(builtins.is_function("re.search"));
        assert!(builtins.is_function("map") && builtins.function("map").is_none());
        assert!(builtins.accepts_keyword("sorted", "reverse"));
        assert!(!builtins.accepts_keyword("len", "key"));
        assert!(builtins.keyword_takes_function("max", "key"));
        assert!(!builtins.keyword_takes_function("dict", "key"));
        assert!(matches!(
            builtins.function("re.search"),
            Some(Builtin::Record(_))
        ));
        assert!(builtins.is_module("re"));
        assert!(!builtins.is_module("len"));
        assert!(!builtins.is_function("open"));
        assert!(!builtins.is_function("eval"));
        assert_eq!(builtins.constant("pi"), Some(Value::Float(consts::PI)));
        assert_eq!(builtins.constant("len"), None);
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(call("len", &[ints(&[1, 2, 3])]).unwrap(), Value::Int(3));
        assert_eq!(call("sum", &[ints(&[1, 2, 3])]).unwrap(), Value::Int(6));
        assert_eq!(call("max", &[ints(&[1, 7, 3])]).unwrap(), Value::Int(7));
        assert_eq!(
            call("min", &[Value::Int(4), Value::Float(2.5)]).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            call("max", &[Value::List(vec![Value::Na, Value::Int(2)])]).unwrap(),
            Value::Int(2)
        );
        assert!(call("max", &[Value::List(vec![])]).is_err());
        assert_eq!(
            call("any", &[Value::List(vec![Value::Bool(false), Value::Int(1)])]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(call("all", &[Value::List(vec![])]).unwrap(), Value::Bool(true));
        assert_eq!(
            call("sorted", &[ints(&[3, 1, 2])]).unwrap(),
            ints(&[1, 2, 3])
        );
        assert_eq!(call("range", &[Value::Int(3)]).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            call("range", &[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            ints(&[5, 3, 1])
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", &[Value::str(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", &[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(call("float", &[Value::str("1.5")]).unwrap(), Value::Float(1.5));
        assert!(call("float", &[Value::str("x")]).is_err());
        assert_eq!(call("str", &[Value::Int(5)]).unwrap(), Value::str("5"));
        assert_eq!(call("round", &[Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(
            call("round", &[Value::Float(1.234), Value::Int(2)]).unwrap(),
            Value::Float(1.23)
        );
        assert_eq!(call("abs", &[Value::Int(-3)]).unwrap(), Value::Int(3));
        assert!(call("abs", &[Value::Na]).unwrap().is_na());
        assert_eq!(call("chr", &[Value::Int(65)]).unwrap(), Value::str("A"));
        assert_eq!(call("ord", &[Value::str("A")]).unwrap(), Value::Int(65));
    }

    #[test]
    fn test_math() {
        assert_eq!(call("sqrt", &[Value::Int(16)]).unwrap(), Value::Float(4.0));
        assert!(call("sqrt", &[Value::Int(-1)]).is_err());
        assert_eq!(call("log10", &[Value::Int(100)]).unwrap(), Value::Float(2.0));
        let log2_8 = call("log", &[Value::Int(8), Value::Int(2)]).unwrap();
        assert!((log2_8.as_f64().unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(call("floor", &[Value::Float(-1.5)]).unwrap(), Value::Int(-2));
        assert_eq!(call("ceil", &[Value::Float(1.2)]).unwrap(), Value::Int(2));
        assert_eq!(
            call("isnan", &[Value::Float(f64::NAN)]).unwrap(),
            Value::Bool(true)
        );
        assert!(call("exp", &[Value::Na]).unwrap().is_na());
    }

    #[test]
    fn test_na_helpers() {
        let values = Value::List(vec![Value::Int(1), Value::Na, Value::Int(3)]);
        assert_eq!(call("without_na", &[values.clone()]).unwrap(), ints(&[1, 3]));
        assert_eq!(
            call("replace_na", &[values, Value::Int(0)]).unwrap(),
            ints(&[1, 0, 3])
        );
        assert_eq!(
            call("replace_na", &[Value::Na, Value::str("-")]).unwrap(),
            Value::str("-")
        );
        assert_eq!(call("desc", &[Value::Int(1)]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_regex() {
        let search = |args: &[Value]| call("re.search", args).unwrap();
        assert_eq!(
            search(&[Value::str("CA[0-9]"), Value::str("BRCA1")]),
            Value::Bool(true)
        );
        assert_eq!(
            call("re.match", &[Value::str("CA"), Value::str("BRCA1")]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            call("re.fullmatch", &[Value::str("BRCA[12]"), Value::str("BRCA1")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("re.fullmatch", &[Value::str("BRCA"), Value::str("BRCA1")]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(search(&[Value::str("x"), Value::Na]), Value::Bool(false));
        assert!(call("re.search", &[Value::str("("), Value::str("x")]).is_err());
    }

    #[test]
    fn test_iterators_and_dict() {
        assert_eq!(
            call("iter", &[Value::str("ab")]).unwrap(),
            Value::List(vec![Value::str("a"), Value::str("b")])
        );
        assert_eq!(call("next", &[ints(&[4, 5])]).unwrap(), Value::Int(4));
        assert_eq!(
            call("next", &[ints(&[]), Value::str("none")]).unwrap(),
            Value::str("none")
        );
        assert!(call("next", &[ints(&[])]).is_err());

        let pairs = Value::List(vec![
            Value::List(vec![Value::str("b"), Value::Int(2)]),
            Value::List(vec![Value::str("a"), Value::Int(1)]),
        ]);
        let Value::Map(map) = call("dict", &[pairs]).unwrap() else {
            panic!("expected a dict");
        };
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert_eq!(map.len(), 2);
        assert_eq!(call("dict", &[]).unwrap(), Value::Map(BTreeMap::new()));
        assert!(call("dict", &[Value::List(vec![ints(&[1, 2])])]).is_err());
        assert!(call("dict", &[Value::List(vec![ints(&[1])])]).is_err());
    }

    #[test]
    fn test_keyed_ordering() {
        let items = vec![Value::str("bb"), Value::str("a"), Value::str("ccc")];
        let keys = vec![Value::Int(2), Value::Na, Value::Int(3)];
        assert_eq!(
            sort_by_keys(items.clone(), keys.clone(), false).unwrap(),
            Value::List(vec![Value::str("bb"), Value::str("ccc"), Value::str("a")])
        );
        assert_eq!(
            sort_by_keys(items.clone(), keys.clone(), true).unwrap(),
            Value::List(vec![Value::str("ccc"), Value::str("bb"), Value::str("a")])
        );
        assert_eq!(max_by_keys(items.clone(), keys.clone()).unwrap(), Value::str("ccc"));
        assert_eq!(min_by_keys(items.clone(), keys).unwrap(), Value::str("bb"));
        assert!(min_by_keys(items.clone(), vec![Value::Na; 3]).unwrap().is_na());
        let mixed = vec![Value::Int(1), Value::str("x"), Value::Int(0)];
        assert!(sort_by_keys(items, mixed, false).is_err());
    }

    #[test]
    fn test_range_is_bounded() {
        assert!(matches!(
            call("range", &[Value::Int(i64::MAX)]),
            Err(crate::error::EngineError::Evaluation {
                source: EvalError::SequenceTooLong { .. },
                ..
            })
        ));
        assert_eq!(
            call("range", &[Value::Int(i64::MIN), Value::Int(i64::MIN + 2)]).unwrap(),
            ints(&[i64::MIN, i64::MIN + 1])
        );
    }

    #[test]
    fn test_argument_count() {
        let err = call("len", &[]).unwrap_err();
        assert!(err.to_string().contains("len() takes 1 arguments but 0 were given"));
    }
}
