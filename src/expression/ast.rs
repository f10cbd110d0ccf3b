// Abstract Syntax Tree for filter expressions

use super::operator::{BinaryOperator, BoolOperator, CompareOperator, UnaryOperator};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Int, float, string, bool or NA (`None`)
    Literal(Value),
    Name(String),
    Attribute {
        object: Box<Expr>,
        name: String,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    /// `lambda x, y: body`, only valid as a function argument
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: BoolOperator,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CompareOperator, Expr)>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expr>,
        clauses: Vec<ComprehensionClause>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Generator,
}

/// `for target in iter if condition...`
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionClause {
    pub target: Target,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

/// Loop variable(s) bound by a comprehension clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Name(String),
    Tuple(Vec<String>),
}

impl Target {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Target::Name(name) => vec![name.as_str()],
            Target::Tuple(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl Expr {
    /// Visit this node and every node below it, outermost first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Name(_) => {}
            Expr::Attribute { object, .. } => object.walk(visit),
            Expr::Subscript { object, index } => {
                object.walk(visit);
                index.walk(visit);
            }
            Expr::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                object.walk(visit);
                for bound in [lower, upper, step].into_iter().flatten() {
                    bound.walk(visit);
                }
            }
            Expr::Call {
                function,
                args,
                keywords,
            } => {
                function.walk(visit);
                args.iter().for_each(|arg| arg.walk(visit));
                keywords.iter().for_each(|(_, value)| value.walk(visit));
            }
            Expr::Lambda { body, .. } => body.walk(visit),
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Compare { left, comparisons } => {
                left.walk(visit);
                comparisons.iter().for_each(|(_, right)| right.walk(visit));
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                then.walk(visit);
                condition.walk(visit);
                otherwise.walk(visit);
            }
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
                items.iter().for_each(|item| item.walk(visit));
            }
            Expr::Comprehension {
                element, clauses, ..
            } => {
                element.walk(visit);
                for clause in clauses {
                    clause.iter.walk(visit);
                    clause.conditions.iter().for_each(|c| c.walk(visit));
                }
            }
        }
    }

    /// Rewrite every literal in place.
    pub fn map_literals(&mut self, rewrite: &mut dyn FnMut(&mut Value)) {
        match self {
            Expr::Literal(value) => rewrite(value),
            Expr::Name(_) => {}
            Expr::Attribute { object, .. } => object.map_literals(rewrite),
            Expr::Subscript { object, index } => {
                object.map_literals(rewrite);
                index.map_literals(rewrite);
            }
            Expr::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                object.map_literals(rewrite);
                for bound in [lower, upper, step].into_iter().flatten() {
                    bound.map_literals(rewrite);
                }
            }
            Expr::Call {
                function,
                args,
                keywords,
            } => {
                function.map_literals(rewrite);
                args.iter_mut().for_each(|arg| arg.map_literals(rewrite));
                keywords
                    .iter_mut()
                    .for_each(|(_, value)| value.map_literals(rewrite));
            }
            Expr::Lambda { body, .. } => body.map_literals(rewrite),
            Expr::Unary { operand, .. } => operand.map_literals(rewrite),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.map_literals(rewrite);
                right.map_literals(rewrite);
            }
            Expr::Compare { left, comparisons } => {
                left.map_literals(rewrite);
                comparisons
                    .iter_mut()
                    .for_each(|(_, right)| right.map_literals(rewrite));
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.map_literals(rewrite);
                then.map_literals(rewrite);
                otherwise.map_literals(rewrite);
            }
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
                items.iter_mut().for_each(|item| item.map_literals(rewrite));
            }
            Expr::Comprehension {
                element, clauses, ..
            } => {
                element.map_literals(rewrite);
                for clause in clauses {
                    clause.iter.map_literals(rewrite);
                    clause
                        .conditions
                        .iter_mut()
                        .for_each(|c| c.map_literals(rewrite));
                }
            }
        }
    }
}
