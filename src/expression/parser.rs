// Expression parser - converts tokens to AST
//
// Precedence, lowest first: conditional, or, and, not, comparison,
// additive, multiplicative, unary sign, power, postfix (attribute,
// subscript, call), atom.

use super::ast::*;
use super::lexer::Lexer;
use super::operator::{BinaryOperator, BoolOperator, CompareOperator, UnaryOperator};
use super::token::{SpannedToken, Token};
use crate::value::Value;
use anyhow::{bail, Result};

/// A parsed expression plus the source text of its top-level items.
///
/// For a tuple expression (`CHROM, POS` or `(CHROM, POS)`) there is one item
/// per element; otherwise the whole expression is the only item.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    pub expr: Expr,
    pub items: Vec<String>,
}

pub struct Parser {
    source: Vec<char>,
    tokens: Vec<SpannedToken>,
    position: usize,
    bare_tuple: bool,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser {
            source: source.chars().collect(),
            tokens,
            position: 0,
            bare_tuple: false,
        })
    }

    /// Parse the whole input as one expression
    pub fn parse(&mut self) -> Result<ParsedExpression> {
        if self.match_token(&Token::Eof) {
            bail!("Empty expression");
        }
        let expr = self.parse_top()?;
        match self.current_token() {
            Token::Eof => {}
            Token::Assign => bail!("Assignments are not allowed, use '==' for comparison"),
            token => bail!("Unexpected token: {:?}", token),
        }
        let items = self.item_sources(&expr);
        Ok(ParsedExpression { expr, items })
    }

    /// Parse a possibly unparenthesized tuple
    fn parse_top(&mut self) -> Result<Expr> {
        let first = self.parse_test()?;
        if !self.match_token(&Token::Comma) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.match_token(&Token::Comma) {
            self.advance();
            if self.match_token(&Token::Eof) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.bare_tuple = true;
        Ok(Expr::Tuple(items))
    }

    /// Parse conditional expression `a if cond else b`
    fn parse_test(&mut self) -> Result<Expr> {
        if self.match_token(&Token::Lambda) {
            self.advance();
            return self.parse_lambda();
        }
        let then = self.parse_or()?;
        if !self.match_token(&Token::If) {
            return Ok(then);
        }
        self.advance();
        let condition = self.parse_or()?;
        self.expect_token(Token::Else)?;
        let otherwise = self.parse_test()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Parse `params: body` after the `lambda` keyword
    fn parse_lambda(&mut self) -> Result<Expr> {
        let mut params = Vec::new();
        while !self.match_token(&Token::Colon) {
            if !params.is_empty() {
                self.expect_token(Token::Comma)?;
            }
            let param = self.expect_identifier()?;
            if params.contains(&param) {
                bail!("Duplicate lambda parameter '{}'", param);
            }
            params.push(param);
        }
        self.advance();
        let body = self.parse_test()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    /// Parse OR expression
    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;

        while self.match_token(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: BoolOperator::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse AND expression
    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;

        while self.match_token(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: BoolOperator::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse NOT expression
    fn parse_not(&mut self) -> Result<Expr> {
        if self.match_token(&Token::Not) {
            self.advance();
            let operand = self.parse_not()?;
            Ok(Expr::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            })
        } else {
            self.parse_comparison()
        }
    }

    /// Parse a (possibly chained) comparison
    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let mut comparisons = Vec::new();

        while let Some(op) = self.comparison_operator() {
            let right = self.parse_additive()?;
            comparisons.push((op, right));
        }

        if comparisons.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                comparisons,
            })
        }
    }

    /// Consume a comparison operator, including `not in` and `is not`
    fn comparison_operator(&mut self) -> Option<CompareOperator> {
        let op = match self.current_token().clone() {
            Token::Equal => CompareOperator::Eq,
            Token::NotEqual => CompareOperator::Ne,
            Token::Less => CompareOperator::Lt,
            Token::LessEqual => CompareOperator::Le,
            Token::Greater => CompareOperator::Gt,
            Token::GreaterEqual => CompareOperator::Ge,
            Token::In => CompareOperator::In,
            Token::Is if self.peek_token() == &Token::Not => {
                self.advance();
                CompareOperator::IsNot
            }
            Token::Is => CompareOperator::Is,
            Token::Not if self.peek_token() == &Token::In => {
                self.advance();
                CompareOperator::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// Parse addition/subtraction expression
    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();

            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse multiplication/division expression
    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                Token::DoubleSlash => BinaryOperator::FloorDiv,
                Token::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();

            let right = self.parse_unary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse unary sign
    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.current_token() {
            Token::Plus => UnaryOperator::Pos,
            Token::Minus => UnaryOperator::Neg,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parse power; right-associative and binding tighter than a left sign
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if !self.match_token(&Token::DoubleStar) {
            return Ok(base);
        }
        self.advance();
        let exponent = self.parse_unary()?;
        Ok(Expr::Binary {
            left: Box::new(base),
            op: BinaryOperator::Pow,
            right: Box::new(exponent),
        })
    }

    /// Parse attribute access, subscripts and calls
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current_token() {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                Token::LeftBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                    self.expect_token(Token::RightBracket)?;
                }
                Token::LeftParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    expr = Expr::Call {
                        function: Box::new(expr),
                        args,
                        keywords,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parse `[index]` or `[lower:upper:step]` after the opening bracket
    fn parse_subscript(&mut self, object: Expr) -> Result<Expr> {
        let lower = if self.match_token(&Token::Colon) {
            None
        } else {
            let index = self.parse_test()?;
            if !self.match_token(&Token::Colon) {
                return Ok(Expr::Subscript {
                    object: Box::new(object),
                    index: Box::new(index),
                });
            }
            Some(Box::new(index))
        };
        self.expect_token(Token::Colon)?;

        let upper = self.parse_slice_bound()?;
        let step = if self.match_token(&Token::Colon) {
            self.advance();
            self.parse_slice_bound()?
        } else {
            None
        };

        Ok(Expr::Slice {
            object: Box::new(object),
            lower,
            upper,
            step,
        })
    }

    fn parse_slice_bound(&mut self) -> Result<Option<Box<Expr>>> {
        match self.current_token() {
            Token::Colon | Token::RightBracket => Ok(None),
            _ => Ok(Some(Box::new(self.parse_test()?))),
        }
    }

    /// Parse call arguments after the opening parenthesis; a sole argument
    /// may be a bare generator expression. Keyword arguments (`key=...`)
    /// follow the positional ones.
    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<(String, Expr)> = Vec::new();
        if self.match_token(&Token::RightParen) {
            self.advance();
            return Ok((args, keywords));
        }

        if self.keyword_argument_ahead() {
            keywords.push(self.parse_keyword_argument()?);
        } else {
            let first = self.parse_test()?;
            if self.match_token(&Token::For) {
                let clauses = self.parse_comprehension_clauses()?;
                self.expect_token(Token::RightParen)?;
                args.push(Expr::Comprehension {
                    kind: ComprehensionKind::Generator,
                    element: Box::new(first),
                    clauses,
                });
                return Ok((args, keywords));
            }
            args.push(first);
        }

        while self.match_token(&Token::Comma) {
            self.advance();
            if self.match_token(&Token::RightParen) {
                break;
            }
            if self.keyword_argument_ahead() {
                let (name, value) = self.parse_keyword_argument()?;
                if keywords.iter().any(|(existing, _)| *existing == name) {
                    bail!("Keyword argument repeated: {}", name);
                }
                keywords.push((name, value));
            } else if keywords.is_empty() {
                args.push(self.parse_test()?);
            } else {
                bail!("Positional argument follows keyword argument");
            }
        }
        self.expect_token(Token::RightParen)?;
        Ok((args, keywords))
    }

    fn keyword_argument_ahead(&self) -> bool {
        matches!(self.current_token(), Token::Identifier(_)) && self.peek_token() == &Token::Assign
    }

    /// Parse `name=value`
    fn parse_keyword_argument(&mut self) -> Result<(String, Expr)> {
        let name = self.expect_identifier()?;
        self.expect_token(Token::Assign)?;
        Ok((name, self.parse_test()?))
    }

    /// Parse one or more `for target in iter [if cond]...` clauses
    fn parse_comprehension_clauses(&mut self) -> Result<Vec<ComprehensionClause>> {
        let mut clauses = Vec::new();

        while self.match_token(&Token::For) {
            self.advance();
            let target = self.parse_target()?;
            self.expect_token(Token::In)?;
            let iter = self.parse_or()?;

            let mut conditions = Vec::new();
            while self.match_token(&Token::If) {
                self.advance();
                conditions.push(self.parse_or()?);
            }

            clauses.push(ComprehensionClause {
                target,
                iter,
                conditions,
            });
        }

        Ok(clauses)
    }

    /// Parse a loop target: `x`, `x, y` or `(x, y)`
    fn parse_target(&mut self) -> Result<Target> {
        let parenthesized = self.match_token(&Token::LeftParen);
        if parenthesized {
            self.advance();
        }

        let mut names = vec![self.expect_identifier()?];
        while self.match_token(&Token::Comma) {
            self.advance();
            names.push(self.expect_identifier()?);
        }

        if parenthesized {
            self.expect_token(Token::RightParen)?;
        }

        if names.len() == 1 && !parenthesized {
            Ok(Target::Name(names.remove(0)))
        } else {
            Ok(Target::Tuple(names))
        }
    }

    /// Parse primary expression
    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.advance();
                parse_number(&n)
            }
            Token::String(s) => {
                self.advance();
                // Adjacent string literals are concatenated
                let mut value = s;
                while let Token::String(next) = self.current_token() {
                    value.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Value::Str(value)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::None => {
                self.advance();
                Ok(Expr::Literal(Value::Na))
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(Expr::Name(name))
            }
            Token::LeftParen => {
                self.advance();
                self.parse_parenthesized()
            }
            Token::LeftBracket => {
                self.advance();
                self.parse_list()
            }
            Token::LeftBrace => {
                self.advance();
                self.parse_set()
            }
            token => bail!("Unexpected token: {:?}", token),
        }
    }

    /// Parse `()`, `(x)`, `(x,)`, `(x, y)` or `(x for ...)`
    fn parse_parenthesized(&mut self) -> Result<Expr> {
        if self.match_token(&Token::RightParen) {
            self.advance();
            return Ok(Expr::Tuple(Vec::new()));
        }

        let first = self.parse_test()?;
        if self.match_token(&Token::For) {
            let clauses = self.parse_comprehension_clauses()?;
            self.expect_token(Token::RightParen)?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: Box::new(first),
                clauses,
            });
        }
        if !self.match_token(&Token::Comma) {
            self.expect_token(Token::RightParen)?;
            return Ok(first);
        }

        let mut items = vec![first];
        while self.match_token(&Token::Comma) {
            self.advance();
            if self.match_token(&Token::RightParen) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect_token(Token::RightParen)?;
        Ok(Expr::Tuple(items))
    }

    /// Parse `[...]` list display or list comprehension
    fn parse_list(&mut self) -> Result<Expr> {
        if self.match_token(&Token::RightBracket) {
            self.advance();
            return Ok(Expr::List(Vec::new()));
        }

        let first = self.parse_test()?;
        if self.match_token(&Token::For) {
            let clauses = self.parse_comprehension_clauses()?;
            self.expect_token(Token::RightBracket)?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: Box::new(first),
                clauses,
            });
        }

        let items = self.parse_remaining_items(first, Token::RightBracket)?;
        Ok(Expr::List(items))
    }

    /// Parse `{...}` set display
    fn parse_set(&mut self) -> Result<Expr> {
        if self.match_token(&Token::RightBrace) {
            bail!("Dictionary displays are not supported");
        }
        let first = self.parse_test()?;
        if self.match_token(&Token::Colon) {
            bail!("Dictionary displays are not supported");
        }
        let items = self.parse_remaining_items(first, Token::RightBrace)?;
        Ok(Expr::Set(items))
    }

    /// Parse `, item`* up to and including the closing token
    fn parse_remaining_items(&mut self, first: Expr, close: Token) -> Result<Vec<Expr>> {
        let mut items = vec![first];
        while self.match_token(&Token::Comma) {
            self.advance();
            if self.match_token(&close) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect_token(close)?;
        Ok(items)
    }

    /// Source text of the top-level items, split at depth-0 commas
    fn item_sources(&self, expr: &Expr) -> Vec<String> {
        // Drop the trailing Eof token
        let tokens = &self.tokens[..self.tokens.len().saturating_sub(1)];
        let tokens = match expr {
            Expr::Tuple(_) if self.bare_tuple => tokens,
            Expr::Tuple(_) if tokens.len() >= 2 => &tokens[1..tokens.len() - 1],
            _ => tokens,
        };
        if !matches!(expr, Expr::Tuple(_)) {
            return vec![self.text(tokens)];
        }

        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut item_start = 0;
        for (i, spanned) in tokens.iter().enumerate() {
            match spanned.token {
                Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                Token::RightParen | Token::RightBracket | Token::RightBrace => {
                    depth = depth.saturating_sub(1)
                }
                Token::Comma if depth == 0 => {
                    items.push(self.text(&tokens[item_start..i]));
                    item_start = i + 1;
                }
                _ => {}
            }
        }
        if item_start < tokens.len() {
            items.push(self.text(&tokens[item_start..]));
        }
        items
    }

    fn text(&self, tokens: &[SpannedToken]) -> String {
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => self.source[first.start..last.end].iter().collect(),
            _ => String::new(),
        }
    }

    // Helper methods

    /// Get current token
    fn current_token(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    /// Get the token after the current one
    fn peek_token(&self) -> &Token {
        self.tokens
            .get(self.position + 1)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    /// Advance to next token
    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    /// Check if current token matches
    fn match_token(&self, token: &Token) -> bool {
        self.current_token() == token
    }

    /// Expect a specific token
    fn expect_token(&mut self, token: Token) -> Result<()> {
        if self.current_token() == &token {
            self.advance();
            Ok(())
        } else {
            bail!("Expected {:?}, found {:?}", token, self.current_token())
        }
    }

    /// Expect an identifier
    fn expect_identifier(&mut self) -> Result<String> {
        match self.current_token().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            token => bail!("Expected identifier, found {:?}", token),
        }
    }
}

fn parse_number(literal: &str) -> Result<Expr> {
    if literal.contains(['.', 'e', 'E']) {
        match literal.parse::<f64>() {
            Ok(value) => Ok(Expr::Literal(Value::Float(value))),
            Err(_) => bail!("Invalid number: {}", literal),
        }
    } else {
        match literal.parse::<i64>() {
            Ok(value) => Ok(Expr::Literal(Value::Int(value))),
            Err(_) => bail!("Invalid number: {}", literal),
        }
    }
}
