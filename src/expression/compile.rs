//! Turning expression source into a validated, evaluable tree.

use super::ast::{ComprehensionClause, Expr};
use super::builtins::Builtins;
use super::error::EvalError;
use super::eval::Evaluator;
use super::parser::Parser;
use crate::environment::{Field, RecordEnvironment};
use crate::error::{EngineError, EngineResult};
use crate::value::{coerce_f32, Value};

/// A parsed expression that passed the sandbox checks.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    ast: Expr,
    annotation_scoped: bool,
    item_sources: Vec<String>,
}

/// Compile `source` for records whose annotations live in `annotation_key`.
///
/// Only record fields, the annotation identifier, `NA`, comprehension
/// variables and whitelisted builtins may be referenced. Float literals are
/// rounded to 32-bit precision so they compare equal to values read from
/// records.
pub fn compile(
    source: &str,
    annotation_key: &str,
    builtins: &Builtins,
) -> EngineResult<CompiledExpression> {
    compile_with_variables(source, annotation_key, builtins, &[])
}

/// Like [`compile`], additionally allowing the driver-provided `variables`
/// (such as `DATA` when annotating).
pub fn compile_with_variables(
    source: &str,
    annotation_key: &str,
    builtins: &Builtins,
    variables: &[String],
) -> EngineResult<CompiledExpression> {
    let invalid = |reason: String| EngineError::InvalidExpression {
        expression: source.to_string(),
        reason,
    };

    if source.contains(".__") {
        return Err(invalid(
            "access to double-underscore attributes is not allowed".to_string(),
        ));
    }

    let parsed = Parser::new(source)
        .and_then(|mut parser| parser.parse())
        .map_err(|error| invalid(error.to_string()))?;
    let mut ast = parsed.expr;

    Validator::new(annotation_key, builtins, variables)
        .check(&ast)
        .map_err(invalid)?;

    let mut annotation_scoped = false;
    ast.walk(&mut |node| {
        if matches!(node, Expr::Name(name) if name == annotation_key) {
            annotation_scoped = true;
        }
    });

    ast.map_literals(&mut |value| {
        if let Value::Float(v) = value {
            *v = coerce_f32(*v);
        }
    });

    log::debug!(
        "Compiled '{}' ({} item(s), annotation scoped: {})",
        source,
        parsed.items.len(),
        annotation_scoped
    );

    Ok(CompiledExpression {
        source: source.to_string(),
        ast,
        annotation_scoped,
        item_sources: parsed.items,
    })
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Whether the expression references the annotation identifier and so
    /// has to be evaluated once per annotation entry.
    pub fn is_annotation_scoped(&self) -> bool {
        self.annotation_scoped
    }

    /// Source text of each top-level comma-separated item.
    pub fn item_sources(&self) -> &[String] {
        &self.item_sources
    }

    fn items(&self) -> &[Expr] {
        match &self.ast {
            Expr::Tuple(items) => items,
            single => std::slice::from_ref(single),
        }
    }

    /// Sort direction of each top-level item: `true` when wrapped in `desc()`.
    pub fn sort_directions(&self) -> Vec<bool> {
        self.items()
            .iter()
            .map(|item| match item {
                Expr::Call { function, .. } => {
                    matches!(function.as_ref(), Expr::Name(name) if name == "desc")
                }
                _ => false,
            })
            .collect()
    }

    pub fn evaluate(&self, env: &mut RecordEnvironment) -> EngineResult<Value> {
        Evaluator::new(env).evaluate(&self.ast)
    }

    /// Evaluate each top-level item separately, e.g. the columns of a table
    /// row. A non-tuple expression yields a single item.
    pub fn evaluate_items(&self, env: &mut RecordEnvironment) -> EngineResult<Vec<Value>> {
        let mut evaluator = Evaluator::new(env);
        self.items()
            .iter()
            .map(|item| evaluator.evaluate(item))
            .collect()
    }

    /// Evaluate as a filter condition; anything but a boolean is an error.
    pub fn is_true(&self, env: &mut RecordEnvironment) -> EngineResult<bool> {
        match self.evaluate(env)? {
            Value::Bool(result) => Ok(result),
            other => Err(EngineError::NonBoolTypeError {
                value: other.to_string(),
                type_name: other.type_name(),
                record: env.record_ref(),
            }),
        }
    }
}

/// Structural whitelist check over the syntax tree.
struct Validator<'a> {
    annotation_key: &'a str,
    builtins: &'a Builtins,
    variables: &'a [String],
    locals: Vec<String>,
}

impl<'a> Validator<'a> {
    fn new(annotation_key: &'a str, builtins: &'a Builtins, variables: &'a [String]) -> Self {
        Self {
            annotation_key,
            builtins,
            variables,
            locals: Vec::new(),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|local| local == name)
    }

    fn check_name(&self, name: &str) -> Result<(), String> {
        if self.is_local(name)
            || name == "NA"
            || name == self.annotation_key
            || self.variables.iter().any(|variable| variable == name)
            || Field::from_name(name).is_some()
            || self.builtins.constant(name).is_some()
        {
            Ok(())
        } else if self.builtins.is_function(name) {
            Err(format!("function '{}' can only be called", name))
        } else if self.builtins.is_module(name) {
            Err(format!("module '{}' can only be used to call its functions", name))
        } else {
            Err(format!("name '{}' is not defined", name))
        }
    }

    fn check_all(&mut self, exprs: &[Expr]) -> Result<(), String> {
        exprs.iter().try_for_each(|expr| self.check(expr))
    }

    fn check(&mut self, expr: &Expr) -> Result<(), String> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Name(name) => self.check_name(name),
            Expr::Attribute { object, name } => {
                if name.starts_with('_') {
                    return Err(format!("access to attribute '{}' is not allowed", name));
                }
                self.check(object)
            }
            Expr::Subscript { object, index } => {
                self.check(object)?;
                self.check(index)
            }
            Expr::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                self.check(object)?;
                for bound in [lower, upper, step].into_iter().flatten() {
                    self.check(bound)?;
                }
                Ok(())
            }
            Expr::Call {
                function,
                args,
                keywords,
            } => {
                self.check_callee(function)?;
                self.check_arguments(function, args, keywords)
            }
            Expr::Lambda { .. } => {
                Err("lambda is only allowed as a function argument".to_string())
            }
            Expr::Unary { operand, .. } => self.check(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.check(left)?;
                self.check(right)
            }
            Expr::Compare { left, comparisons } => {
                self.check(left)?;
                comparisons
                    .iter()
                    .try_for_each(|(_, right)| self.check(right))
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.check(condition)?;
                self.check(then)?;
                self.check(otherwise)
            }
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => self.check_all(items),
            Expr::Comprehension {
                element, clauses, ..
            } => {
                let depth = self.locals.len();
                let result = self.check_comprehension(element, clauses);
                self.locals.truncate(depth);
                result
            }
        }
    }

    fn check_comprehension(
        &mut self,
        element: &Expr,
        clauses: &[ComprehensionClause],
    ) -> Result<(), String> {
        for clause in clauses {
            self.check(&clause.iter)?;
            self.locals
                .extend(clause.target.names().into_iter().map(str::to_string));
            self.check_all(&clause.conditions)?;
        }
        self.check(element)
    }

    fn check_arguments(
        &mut self,
        function: &Expr,
        args: &[Expr],
        keywords: &[(String, Expr)],
    ) -> Result<(), String> {
        let callee = match function {
            Expr::Name(name) if !self.is_local(name) => Some(name.as_str()),
            _ => None,
        };
        for (position, arg) in args.iter().enumerate() {
            if position == 0 && callee.is_some_and(|name| self.builtins.is_higher_order(name)) {
                self.check_function_argument(arg)?;
            } else {
                self.check(arg)?;
            }
        }

        for (keyword, value) in keywords {
            let Some(name) = callee.filter(|name| self.builtins.accepts_keyword(name, keyword))
            else {
                let function = match function {
                    Expr::Name(name) => name.clone(),
                    Expr::Attribute { name, .. } => name.clone(),
                    _ => "function".to_string(),
                };
                return Err(EvalError::UnexpectedKeyword {
                    function,
                    keyword: keyword.clone(),
                }
                .to_string());
            };
            if self.builtins.keyword_takes_function(name, keyword) {
                self.check_function_argument(value)?;
            } else {
                self.check(value)?;
            }
        }
        Ok(())
    }

    /// A lambda, a builtin function passed by name, or any value expression
    /// (`None` stands for identity).
    fn check_function_argument(&mut self, expr: &Expr) -> Result<(), String> {
        match expr {
            Expr::Lambda { params, body } => {
                let depth = self.locals.len();
                self.locals.extend(params.iter().cloned());
                let result = self.check(body);
                self.locals.truncate(depth);
                result
            }
            Expr::Name(name) if !self.is_local(name) && self.builtins.function(name).is_some() => {
                Ok(())
            }
            other => self.check(other),
        }
    }

    fn check_callee(&mut self, function: &Expr) -> Result<(), String> {
        match function {
            Expr::Name(name) if !self.is_local(name) => {
                if self.builtins.is_function(name) {
                    Ok(())
                } else {
                    self.check_name(name)?;
                    Err(format!("'{}' is not callable", name))
                }
            }
            Expr::Attribute { object, name } => match object.as_ref() {
                Expr::Name(module) if self.builtins.is_module(module) && !self.is_local(module) => {
                    if self.builtins.is_function(&format!("{}.{}", module, name)) {
                        Ok(())
                    } else {
                        Err(format!("module '{}' has no function '{}'", module, name))
                    }
                }
                _ => self.check(function),
            },
            other => self.check(other),
        }
    }
}
