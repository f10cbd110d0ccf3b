//! Tree-walking evaluation of expressions against a record environment.

use super::ast::{ComprehensionClause, Expr, Target};
use super::builtins::{self, Builtin};
use super::error::{EvalError, EvalResult};
use super::methods;
use super::operator::{self, BoolOperator, CompareOperator};
use crate::environment::{Binding, RecordEnvironment};
use crate::error::{EngineError, EngineResult};
use crate::value::Value;

/// A function passed as an argument: `key=lambda x: -x`, `map(str, xs)`,
/// or `filter(None, xs)`.
enum Callable<'e> {
    Lambda { params: &'e [String], body: &'e Expr },
    Builtin(Builtin),
    Identity,
}

/// Evaluates one expression tree against the active record.
///
/// Comprehension variables live in `locals` and shadow every other name.
pub struct Evaluator<'a> {
    env: &'a mut RecordEnvironment,
    locals: Vec<(String, Value)>,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a mut RecordEnvironment) -> Self {
        Self {
            env,
            locals: Vec::new(),
        }
    }

    /// Evaluate an expression to a value
    pub fn evaluate(&mut self, expr: &Expr) -> EngineResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. } => {
                let binding = self.evaluate_binding(expr)?;
                self.into_value(binding)
            }

            Expr::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                let object = self.evaluate(object)?;
                let lower = self.slice_bound(lower.as_deref())?;
                let upper = self.slice_bound(upper.as_deref())?;
                let step = self.slice_bound(step.as_deref())?;
                slice_value(&object, lower, upper, step).map_err(|e| self.error(e))
            }

            Expr::Call {
                function,
                args,
                keywords,
            } => self.call(function, args, keywords),

            Expr::Lambda { .. } => Err(self.error(EvalError::NotAValue {
                name: "lambda".to_string(),
            })),

            Expr::Unary { op, operand } => {
                let operand = self.evaluate(operand)?;
                op.apply(&operand).map_err(|e| self.error(e))
            }

            Expr::Binary { left, op, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                op.apply(&left, &right).map_err(|e| self.error(e))
            }

            Expr::Logical { left, op, right } => {
                let left = self.evaluate(left)?;
                match (op, left.is_truthy()) {
                    (BoolOperator::And, false) | (BoolOperator::Or, true) => Ok(left),
                    _ => self.evaluate(right),
                }
            }

            Expr::Compare { left, comparisons } => self.compare_chain(left, comparisons),

            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }

            Expr::Tuple(items) | Expr::List(items) => self.evaluate_all(items).map(Value::List),

            Expr::Set(items) => {
                let mut unique: Vec<Value> = Vec::new();
                for value in self.evaluate_all(items)? {
                    if !unique.iter().any(|seen| seen.identical(&value)) {
                        unique.push(value);
                    }
                }
                Ok(Value::List(unique))
            }

            Expr::Comprehension {
                element, clauses, ..
            } => {
                let mut values = Vec::new();
                self.comprehension(element, clauses, &mut values)?;
                Ok(Value::List(values))
            }
        }
    }

    fn evaluate_all(&mut self, exprs: &[Expr]) -> EngineResult<Vec<Value>> {
        exprs.iter().map(|expr| self.evaluate(expr)).collect()
    }

    fn error(&self, error: EvalError) -> EngineError {
        self.env.evaluation_error(error)
    }

    /// Turn a binding into a first-class value. Auxiliary tables become
    /// sorted lists; other lookup handles cannot be used as values.
    fn into_value(&mut self, binding: Binding) -> EngineResult<Value> {
        match binding {
            Binding::Value(value) => Ok(value),
            Binding::AuxTable(name) => self.env.aux_values(&name),
            other => Err(self.error(EvalError::NotAValue {
                name: other.describe(),
            })),
        }
    }

    /// Evaluate names, subscripts and attributes without forcing handles
    /// such as `INFO` or `FORMAT['DP']` into values.
    fn evaluate_binding(&mut self, expr: &Expr) -> EngineResult<Binding> {
        match expr {
            Expr::Name(name) => self.lookup(name),
            Expr::Subscript { object, index } => {
                let object = self.evaluate_binding(object)?;
                let index = self.evaluate(index)?;
                self.subscript(object, &index)
            }
            Expr::Attribute { object, name } => {
                let object = self.evaluate(object)?;
                object.attribute(name).map(Binding::Value).ok_or_else(|| {
                    self.error(EvalError::UnknownAttribute {
                        type_name: object.type_name().to_string(),
                        attribute: name.clone(),
                    })
                })
            }
            other => self.evaluate(other).map(Binding::Value),
        }
    }

    fn local(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value)
    }

    fn lookup(&mut self, name: &str) -> EngineResult<Binding> {
        if let Some(value) = self.local(name) {
            return Ok(Binding::Value(value.clone()));
        }
        if name == "NA" {
            return Ok(Binding::Value(Value::Na));
        }
        if self.env.is_bound(name) {
            return self.env.resolve(name);
        }
        if let Some(constant) = self.env.builtins().constant(name) {
            return Ok(Binding::Value(constant));
        }

        let error = if self.env.builtins().is_function(name) {
            EvalError::NotAValue {
                name: name.to_string(),
            }
        } else {
            EvalError::UnknownName {
                name: name.to_string(),
            }
        };
        Err(self.error(error))
    }

    fn key<'v>(&self, container: &Binding, index: &'v Value) -> EngineResult<&'v str> {
        index.as_str().ok_or_else(|| {
            self.error(EvalError::InvalidIndex {
                type_name: container.describe(),
                index_type: index.type_name(),
            })
        })
    }

    fn subscript(&mut self, object: Binding, index: &Value) -> EngineResult<Binding> {
        match object {
            Binding::Value(value) => index_value(&value, index)
                .map(Binding::Value)
                .map_err(|e| self.error(e)),
            Binding::Info => {
                let field = self.key(&Binding::Info, index)?;
                self.env.info_value(field).map(Binding::Value)
            }
            Binding::Format => {
                let field = self.key(&Binding::Format, index)?;
                self.env.check_format_field(field)?;
                Ok(Binding::FormatField(field.to_string()))
            }
            Binding::FormatField(field) => {
                let sample = self.key(&Binding::FormatField(field.clone()), index)?;
                self.env.format_value(&field, sample).map(Binding::Value)
            }
            Binding::Annotation => {
                let field = self.key(&Binding::Annotation, index)?;
                self.env.annotation_value(field).map(Binding::Value)
            }
            Binding::Aux => {
                let name = self.key(&Binding::Aux, index)?;
                self.env.check_aux(name)?;
                Ok(Binding::AuxTable(name.to_string()))
            }
            other @ (Binding::AuxTable(_) | Binding::Ontology) => {
                Err(self.error(EvalError::NotSubscriptable {
                    type_name: other.describe(),
                }))
            }
        }
    }

    /// `item in container`, where the container may be a lookup handle.
    fn contains(&mut self, container: &Binding, item: &Value) -> EngineResult<bool> {
        let key = item.as_str();
        match container {
            Binding::Value(value) => operator::contains(value, item).map_err(|e| self.error(e)),
            Binding::Info => match key {
                Some(field) => self.env.info_contains(field),
                None => Ok(false),
            },
            Binding::Format => Ok(key.is_some_and(|field| self.env.format_contains(field))),
            Binding::FormatField(field) => match key {
                Some(sample) => self.env.format_sample_contains(field, sample),
                None => Ok(false),
            },
            Binding::Annotation => Ok(match key {
                Some(field) => self.env.annotation_contains(field),
                None => false,
            }),
            Binding::Aux => Ok(key.is_some_and(|name| self.env.aux_exists(name))),
            Binding::AuxTable(name) => match key {
                Some(entry) => self.env.aux_contains(name, entry),
                None => Ok(false),
            },
            Binding::Ontology => Err(self.error(EvalError::NotIterable {
                type_name: container.describe(),
            })),
        }
    }

    fn compare_chain(
        &mut self,
        left: &Expr,
        comparisons: &[(CompareOperator, Expr)],
    ) -> EngineResult<Value> {
        let mut left = self.evaluate(left)?;

        for (position, (op, right)) in comparisons.iter().enumerate() {
            let last = position + 1 == comparisons.len();
            let (holds, right) = if op.is_membership() {
                let container = self.evaluate_binding(right)?;
                let found = self.contains(&container, &left)?;
                let right = if last {
                    None
                } else {
                    Some(self.into_value(container)?)
                };
                (found == (*op == CompareOperator::In), right)
            } else {
                let right = self.evaluate(right)?;
                let holds = op.compare(&left, &right).map_err(|e| self.error(e))?;
                (holds, Some(right))
            };

            if !holds {
                return Ok(Value::Bool(false));
            }
            if let Some(right) = right {
                left = right;
            }
        }

        Ok(Value::Bool(true))
    }

    fn iterate(&self, value: &Value) -> EngineResult<Vec<Value>> {
        value.iter_values().ok_or_else(|| {
            self.error(EvalError::NotIterable {
                type_name: value.type_name().to_string(),
            })
        })
    }

    fn call(
        &mut self,
        function: &Expr,
        args: &[Expr],
        keywords: &[(String, Expr)],
    ) -> EngineResult<Value> {
        match function {
            Expr::Name(name) if self.local(name).is_none() => {
                if self.env.builtins().is_higher_order(name) {
                    return self.call_higher_order(name, args);
                }
                let builtin = self.env.builtins().function(name).ok_or_else(|| {
                    self.error(EvalError::NotCallable { name: name.clone() })
                })?;
                if !keywords.is_empty() {
                    return self.call_with_keywords(name, builtin, args, keywords);
                }
                let args = self.evaluate_all(args)?;
                builtin.call(self.env, &args)
            }

            Expr::Attribute {
                object,
                name: method,
            } => {
                if let Some((keyword, _)) = keywords.first() {
                    return Err(self.error(EvalError::UnexpectedKeyword {
                        function: method.clone(),
                        keyword: keyword.clone(),
                    }));
                }
                if let Expr::Name(module) = object.as_ref() {
                    if self.local(module).is_none() && self.env.builtins().is_module(module) {
                        let qualified = format!("{}.{}", module, method);
                        let builtin =
                            self.env.builtins().function(&qualified).ok_or_else(|| {
                                self.error(EvalError::UnknownAttribute {
                                    type_name: module.clone(),
                                    attribute: method.clone(),
                                })
                            })?;
                        let args = self.evaluate_all(args)?;
                        return builtin.call(self.env, &args);
                    }
                }

                let receiver = self.evaluate_binding(object)?;
                let args = self.evaluate_all(args)?;
                match receiver {
                    Binding::Value(value) => methods::call_method(self.env, &value, method, &args),
                    Binding::Ontology => methods::call_ontology(self.env, method, &args),
                    Binding::AuxTable(name) => {
                        let entries = self.env.aux_values(&name)?;
                        methods::call_method(self.env, &entries, method, &args)
                    }
                    other => Err(self.error(EvalError::UnknownAttribute {
                        type_name: other.describe(),
                        attribute: method.clone(),
                    })),
                }
            }

            other => {
                let value = self.evaluate(other)?;
                Err(self.error(EvalError::NotCallable {
                    name: value.type_name().to_string(),
                }))
            }
        }
    }

    fn callable<'e>(&mut self, expr: &'e Expr) -> EngineResult<Callable<'e>> {
        match expr {
            Expr::Lambda { params, body } => return Ok(Callable::Lambda { params, body }),
            Expr::Name(name) if self.local(name).is_none() => {
                if let Some(builtin) = self.env.builtins().function(name) {
                    return Ok(Callable::Builtin(builtin));
                }
            }
            _ => {}
        }
        match self.evaluate(expr)? {
            Value::Na => Ok(Callable::Identity),
            other => Err(self.error(EvalError::NotCallable {
                name: other.type_name().to_string(),
            })),
        }
    }

    fn apply(&mut self, callable: &Callable, args: Vec<Value>) -> EngineResult<Value> {
        match callable {
            Callable::Lambda { params, body } => {
                if params.len() != args.len() {
                    return Err(self.error(EvalError::ArgumentCount {
                        function: "<lambda>".to_string(),
                        expected: params.len().to_string(),
                        actual: args.len(),
                    }));
                }
                let depth = self.locals.len();
                self.locals.extend(params.iter().cloned().zip(args));
                let result = self.evaluate(body);
                self.locals.truncate(depth);
                result
            }
            Callable::Builtin(builtin) => builtin.call(self.env, &args),
            Callable::Identity => Ok(args.into_iter().next().unwrap_or(Value::Na)),
        }
    }

    /// `filter(function, iterable)` and `map(function, iterable...)`.
    fn call_higher_order(&mut self, name: &str, args: &[Expr]) -> EngineResult<Value> {
        let expected = if name == "filter" { "2" } else { "at least 2" };
        let (function, iterables) = match args.split_first() {
            Some((function, iterables))
                if !iterables.is_empty() && (name != "filter" || iterables.len() == 1) =>
            {
                (function, iterables)
            }
            _ => {
                return Err(self.error(EvalError::ArgumentCount {
                    function: name.to_string(),
                    expected: expected.to_string(),
                    actual: args.len(),
                }))
            }
        };

        let callable = self.callable(function)?;
        if name == "map" && matches!(callable, Callable::Identity) {
            return Err(self.error(EvalError::NotCallable {
                name: "NoneType".to_string(),
            }));
        }
        let mut columns = Vec::with_capacity(iterables.len());
        for iterable in iterables {
            let value = self.evaluate(iterable)?;
            columns.push(self.iterate(&value)?);
        }

        if name == "filter" {
            let mut kept = Vec::new();
            for item in columns.into_iter().next().unwrap_or_default() {
                if self.apply(&callable, vec![item.clone()])?.is_truthy() {
                    kept.push(item);
                }
            }
            return Ok(Value::List(kept));
        }

        let length = columns.iter().map(Vec::len).min().unwrap_or(0);
        let mut mapped = Vec::with_capacity(length);
        for i in 0..length {
            let row = columns.iter().map(|column| column[i].clone()).collect();
            mapped.push(self.apply(&callable, row)?);
        }
        Ok(Value::List(mapped))
    }

    fn call_with_keywords(
        &mut self,
        name: &str,
        builtin: Builtin,
        args: &[Expr],
        keywords: &[(String, Expr)],
    ) -> EngineResult<Value> {
        match name {
            "dict" => {
                let args = self.evaluate_all(args)?;
                let mut entries = match builtin.call(self.env, &args)? {
                    Value::Map(entries) => entries,
                    other => {
                        return Err(self.error(EvalError::InvalidArgument {
                            function: "dict".to_string(),
                            message: format!("expected a mapping, got '{}'", other.type_name()),
                        }))
                    }
                };
                for (keyword, value) in keywords {
                    let value = self.evaluate(value)?;
                    entries.insert(keyword.clone(), value);
                }
                Ok(Value::Map(entries))
            }
            "sorted" | "max" | "min" => self.call_ordered(name, args, keywords),
            _ => {
                let keyword = keywords.first().map(|(k, _)| k.clone()).unwrap_or_default();
                Err(self.error(EvalError::UnexpectedKeyword {
                    function: name.to_string(),
                    keyword,
                }))
            }
        }
    }

    /// `sorted`, `max` and `min` with `key=`, `reverse=` or `default=`.
    fn call_ordered(
        &mut self,
        name: &str,
        args: &[Expr],
        keywords: &[(String, Expr)],
    ) -> EngineResult<Value> {
        let mut key = None;
        let mut reverse = false;
        let mut default = None;
        for (keyword, value) in keywords {
            match (name, keyword.as_str()) {
                (_, "key") => key = Some(self.callable(value)?),
                ("sorted", "reverse") => reverse = self.evaluate(value)?.is_truthy(),
                ("max" | "min", "default") => default = Some(self.evaluate(value)?),
                _ => {
                    return Err(self.error(EvalError::UnexpectedKeyword {
                        function: name.to_string(),
                        keyword: keyword.clone(),
                    }))
                }
            }
        }

        let mut values = self.evaluate_all(args)?;
        let items = if values.len() == 1 {
            let iterable = values.remove(0);
            self.iterate(&iterable)?
        } else if name == "sorted" || values.is_empty() {
            return Err(self.error(EvalError::ArgumentCount {
                function: name.to_string(),
                expected: if name == "sorted" { "1" } else { "at least 1" }.to_string(),
                actual: values.len(),
            }));
        } else {
            values
        };

        let keys = match &key {
            Some(callable) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in &items {
                    keys.push(self.apply(callable, vec![item.clone()])?);
                }
                keys
            }
            None => items.clone(),
        };

        let result = match name {
            "sorted" => builtins::sort_by_keys(items, keys, reverse),
            _ if items.is_empty() => {
                return default.ok_or_else(|| {
                    self.error(EvalError::InvalidArgument {
                        function: name.to_string(),
                        message: "arg is an empty sequence".to_string(),
                    })
                })
            }
            "max" => builtins::max_by_keys(items, keys),
            _ => builtins::min_by_keys(items, keys),
        };
        result.map_err(|e| self.error(e))
    }

    fn slice_bound(&mut self, bound: Option<&Expr>) -> EngineResult<Option<i64>> {
        let Some(bound) = bound else {
            return Ok(None);
        };
        match self.evaluate(bound)? {
            Value::Na => Ok(None),
            value => value.as_i64().map(Some).ok_or_else(|| {
                self.error(EvalError::InvalidIndex {
                    type_name: "slice".to_string(),
                    index_type: value.type_name(),
                })
            }),
        }
    }

    /// Expand the remaining `clauses`, pushing one element per binding.
    fn comprehension(
        &mut self,
        element: &Expr,
        clauses: &[ComprehensionClause],
        values: &mut Vec<Value>,
    ) -> EngineResult<()> {
        let Some((clause, rest)) = clauses.split_first() else {
            values.push(self.evaluate(element)?);
            return Ok(());
        };

        let iterable = self.evaluate(&clause.iter)?;
        let items = self.iterate(&iterable)?;

        let depth = self.locals.len();
        for item in items {
            self.bind(&clause.target, item)?;
            let mut selected = true;
            for condition in &clause.conditions {
                if !self.evaluate(condition)?.is_truthy() {
                    selected = false;
                    break;
                }
            }
            if selected {
                self.comprehension(element, rest, values)?;
            }
            self.locals.truncate(depth);
        }
        Ok(())
    }

    fn bind(&mut self, target: &Target, item: Value) -> EngineResult<()> {
        match target {
            Target::Name(name) => self.locals.push((name.clone(), item)),
            Target::Tuple(names) => {
                let values = item.iter_values().ok_or_else(|| {
                    self.error(EvalError::NotIterable {
                        type_name: item.type_name().to_string(),
                    })
                })?;
                if values.len() != names.len() {
                    return Err(self.error(EvalError::InvalidArgument {
                        function: "for".to_string(),
                        message: format!(
                            "expected {} values to unpack, got {}",
                            names.len(),
                            values.len()
                        ),
                    }));
                }
                self.locals.extend(names.iter().cloned().zip(values));
            }
        }
        Ok(())
    }
}

/// Resolve a possibly negative position against a sequence length.
fn position(container: &Value, index: &Value, len: usize) -> EvalResult<Option<usize>> {
    let index = match index {
        Value::Int(i) => *i,
        Value::Bool(b) => *b as i64,
        other => {
            return Err(EvalError::InvalidIndex {
                type_name: container.type_name().to_string(),
                index_type: other.type_name(),
            })
        }
    };
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    Ok((0..len).contains(&index).then_some(index as usize))
}

/// `container[index]`. Out-of-range positions and missing keys are NA.
pub fn index_value(container: &Value, index: &Value) -> EvalResult<Value> {
    match container {
        Value::Na => Ok(Value::Na),
        _ if index.is_na() => Ok(Value::Na),
        Value::List(items) => {
            Ok(position(container, index, items.len())?.map_or(Value::Na, |i| items[i].clone()))
        }
        Value::Terms(terms) => Ok(position(container, index, terms.len())?
            .map_or(Value::Na, |i| Value::str(terms[i].as_str()))),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(position(container, index, chars.len())?
                .map_or(Value::Na, |i| Value::Str(chars[i].to_string())))
        }
        Value::Map(map) => match index {
            Value::Str(key) => Ok(map.get(key).cloned().unwrap_or(Value::Na)),
            other => Err(EvalError::InvalidIndex {
                type_name: container.type_name().to_string(),
                index_type: other.type_name(),
            }),
        },
        other => Err(EvalError::NotSubscriptable {
            type_name: other.type_name().to_string(),
        }),
    }
}

fn slice_indices(len: i64, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let mut indices = Vec::new();
    if step > 0 {
        let clamp = |v: i64| if v < 0 { (v + len).max(0) } else { v.min(len) };
        let mut i = lower.map_or(0, clamp);
        let stop = upper.map_or(len, clamp);
        while i < stop {
            indices.push(i as usize);
            i = i.saturating_add(step);
        }
    } else {
        let clamp = |v: i64| if v < 0 { (v + len).max(-1) } else { v.min(len - 1) };
        let mut i = lower.map_or(len - 1, clamp);
        let stop = upper.map_or(-1, clamp);
        while i > stop {
            indices.push(i as usize);
            i = i.saturating_add(step);
        }
    }
    indices
}

/// `container[lower:upper:step]`
pub fn slice_value(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> EvalResult<Value> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::InvalidArgument {
            function: "slice".to_string(),
            message: "slice step cannot be zero".to_string(),
        });
    }
    let pick = |len: usize| slice_indices(len as i64, lower, upper, step);

    match container {
        Value::Na => Ok(Value::Na),
        Value::List(items) => Ok(Value::List(
            pick(items.len()).into_iter().map(|i| items[i].clone()).collect(),
        )),
        Value::Terms(terms) => Ok(Value::Terms(
            pick(terms.len()).into_iter().map(|i| terms[i].clone()).collect(),
        )),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(
                pick(chars.len()).into_iter().map(|i| chars[i]).collect(),
            ))
        }
        other => Err(EvalError::NotSubscriptable {
            type_name: other.type_name().to_string(),
        }),
    }
}
