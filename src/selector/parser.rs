//! Recursive-descent selector parser
//!
//! Precedence, lowest first:
//!
//! ```text
//! OR
//! AND
//! NOT
//! = <> < <= > >=  [NOT] BETWEEN  [NOT] IN  [NOT] LIKE  IS [NOT] NULL
//! + -
//! * /
//! unary + -
//! literal  identifier  function call  ( ... )
//! ```
//!
//! The parser produces a raw tree; folding happens in a single pass afterwards.
//! Both the parser's own recursion and the depth of the tree it builds are
//! capped, so hostile selector text fails to compile instead of exhausting
//! the stack.

use super::ast::{ArithmeticOp, ComparisonOp, Expr, Function, LogicalOp};
use super::extension::{ExtensionCall, ExtensionRegistry, ParserSource};
use super::lexer::{Keyword, Token, TokenKind};
use super::like::LikePattern;
use super::value::Value;
use super::CompileError;

const GENERIC_PARSER: &str = "parser";

/// A parsed subtree and its depth
type Parsed = (Expr, usize);

pub struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    extensions: &'a ExtensionRegistry,
    max_like_pattern: usize,
    max_depth: usize,
    /// Open parentheses, NOTs and unary signs being parsed
    nesting: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, extensions: &'a ExtensionRegistry, max_like_pattern: usize) -> Self {
        Self {
            tokens,
            index: 0,
            extensions,
            max_like_pattern,
            max_depth: super::DEFAULT_MAX_DEPTH,
            nesting: 0,
        }
    }

    /// Cap on nesting and tree depth (0 = unlimited)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse a complete selector; trailing tokens are an error
    pub fn parse(mut self) -> Result<Expr, CompileError> {
        if self.check(&TokenKind::Eof) {
            return Err(CompileError::at("empty selector", self.position()));
        }
        let (expr, _) = self.or_expr()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.unexpected("end of selector"));
        }
        Ok(expr)
    }

    fn too_deep(&self, depth: usize) -> bool {
        self.max_depth > 0 && depth > self.max_depth
    }

    fn depth_error(&self) -> CompileError {
        CompileError::at("selector nesting too deep", self.position())
    }

    /// Wrap `expr` whose deepest child has depth `child_depth`
    fn node(&self, expr: Expr, child_depth: usize) -> Result<Parsed, CompileError> {
        let depth = child_depth + 1;
        if self.too_deep(depth) {
            return Err(self.depth_error());
        }
        Ok((expr, depth))
    }

    /// Enter a recursive construct
    fn descend(&mut self) -> Result<(), CompileError> {
        if self.too_deep(self.nesting + 1) {
            return Err(self.depth_error());
        }
        self.nesting += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.nesting -= 1;
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.index)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.index + offset)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.position)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        *self.peek() == TokenKind::Keyword(keyword)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), CompileError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = match self.peek() {
            TokenKind::Eof => "end of selector".to_string(),
            kind => format!("{:?}", kind),
        };
        CompileError::at(format!("expected {}, found {}", expected, found), self.position())
    }

    fn or_expr(&mut self) -> Result<Parsed, CompileError> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword(Keyword::Or) {
            let rhs = self.and_expr()?;
            lhs = self.node(
                logical(LogicalOp::Or, lhs.0, Some(rhs.0)),
                lhs.1.max(rhs.1),
            )?;
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Parsed, CompileError> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword(Keyword::And) {
            let rhs = self.not_expr()?;
            lhs = self.node(
                logical(LogicalOp::And, lhs.0, Some(rhs.0)),
                lhs.1.max(rhs.1),
            )?;
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Parsed, CompileError> {
        if self.eat_keyword(Keyword::Not) {
            self.descend()?;
            let operand = self.not_expr();
            self.ascend();
            let (operand, depth) = operand?;
            return self.node(logical(LogicalOp::Not, operand, None), depth);
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Parsed, CompileError> {
        let (lhs, lhs_depth) = self.additive()?;

        if let Some(op) = comparison_op(self.peek()) {
            self.advance();
            let (rhs, rhs_depth) = self.additive()?;
            let expr = Expr::Comparison {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            return self.node(expr, lhs_depth.max(rhs_depth));
        }

        if self.eat_keyword(Keyword::Is) {
            let negated = self.eat_keyword(Keyword::Not);
            if !self.eat_keyword(Keyword::Null) {
                return Err(self.unexpected("NULL"));
            }
            let expr = Expr::IsNull {
                operand: Box::new(lhs),
                negated,
            };
            return self.node(expr, lhs_depth);
        }

        let negated = self.check_keyword(Keyword::Not)
            && matches!(
                self.peek_at(1),
                TokenKind::Keyword(Keyword::Between | Keyword::In | Keyword::Like)
            );
        if negated {
            self.advance();
        }

        if self.eat_keyword(Keyword::Between) {
            let (low, low_depth) = self.additive()?;
            if !self.eat_keyword(Keyword::And) {
                return Err(self.unexpected("AND"));
            }
            let (high, high_depth) = self.additive()?;
            let expr = Expr::FunctionCall {
                function: Function::Between { negated },
                args: vec![lhs, low, high],
            };
            return self.node(expr, lhs_depth.max(low_depth).max(high_depth));
        }

        if self.eat_keyword(Keyword::In) {
            let expr = self.in_list(lhs, negated)?;
            return self.node(expr, lhs_depth);
        }

        if self.eat_keyword(Keyword::Like) {
            let expr = self.like(lhs, negated)?;
            return self.node(expr, lhs_depth);
        }

        Ok((lhs, lhs_depth))
    }

    fn in_list(&mut self, value: Expr, negated: bool) -> Result<Expr, CompileError> {
        self.expect(&TokenKind::LParen, "'(' after IN")?;
        let mut args = vec![value];
        loop {
            let position = self.position();
            let item = self.additive()?.0.compile();
            if !item.is_literal() {
                return Err(CompileError::at("IN list items must be literals", position));
            }
            args.push(item);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')' after IN list")?;
        Ok(Expr::FunctionCall {
            function: Function::In { negated },
            args,
        })
    }

    fn like(&mut self, value: Expr, negated: bool) -> Result<Expr, CompileError> {
        let position = self.position();
        let TokenKind::Str(pattern) = self.advance() else {
            return Err(CompileError::at("LIKE requires a string pattern", position));
        };

        let escape = if self.eat_keyword(Keyword::Escape) {
            let position = self.position();
            let TokenKind::Str(escape) = self.advance() else {
                return Err(CompileError::at("ESCAPE requires a string", position));
            };
            let mut chars = escape.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => {
                    return Err(CompileError::at(
                        "ESCAPE must be a single character",
                        position,
                    ))
                }
            }
        } else {
            None
        };

        let pattern = LikePattern::new(&pattern, escape, self.max_like_pattern)
            .map_err(|reason| CompileError::at(reason, position))?;
        Ok(Expr::FunctionCall {
            function: Function::Like { pattern, negated },
            args: vec![value],
        })
    }

    fn additive(&mut self) -> Result<Parsed, CompileError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => ArithmeticOp::Add,
                TokenKind::Minus => ArithmeticOp::Subtract,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = self.node(arithmetic(op, lhs.0, rhs.0), lhs.1.max(rhs.1))?;
        }
    }

    fn multiplicative(&mut self) -> Result<Parsed, CompileError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => ArithmeticOp::Multiply,
                TokenKind::Slash => ArithmeticOp::Divide,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = self.node(arithmetic(op, lhs.0, rhs.0), lhs.1.max(rhs.1))?;
        }
    }

    fn unary(&mut self) -> Result<Parsed, CompileError> {
        let negate = match self.peek() {
            TokenKind::Minus => true,
            TokenKind::Plus => false,
            _ => return self.primary(),
        };
        self.advance();
        self.descend()?;
        let operand = self.unary();
        self.ascend();
        let (operand, depth) = operand?;
        if negate {
            self.node(Expr::Negate(Box::new(operand)), depth)
        } else {
            Ok((operand, depth))
        }
    }

    fn primary(&mut self) -> Result<Parsed, CompileError> {
        let position = self.position();
        let expr = match self.advance() {
            TokenKind::Int(i) => Expr::Literal(Value::Int(i)),
            TokenKind::Float(f) => Expr::Literal(Value::Float(f)),
            TokenKind::Str(s) => Expr::Literal(Value::Text(s)),
            TokenKind::Keyword(Keyword::True) => Expr::Literal(Value::Bool(true)),
            TokenKind::Keyword(Keyword::False) => Expr::Literal(Value::Bool(false)),
            TokenKind::Keyword(Keyword::Null) => Expr::Literal(Value::Absent),
            TokenKind::Ident(name) if self.check(&TokenKind::LParen) => {
                self.function_call(&name, position)?
            }
            TokenKind::Ident(name) => Expr::Identifier(name),
            TokenKind::LParen => {
                self.descend()?;
                let inner = self.or_expr();
                self.ascend();
                let inner = inner?;
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            _ => {
                self.index -= 1;
                return Err(self.unexpected("an operand"));
            }
        };
        Ok((expr, 1))
    }

    /// `PARSER('json', 'path')`, `PARSER(field, 'path')` or `json('path')`
    fn function_call(&mut self, name: &str, position: usize) -> Result<Expr, CompileError> {
        self.expect(&TokenKind::LParen, "'('")?;

        let source = if name.eq_ignore_ascii_case(GENERIC_PARSER) {
            let source_position = self.position();
            let source = match self.advance() {
                TokenKind::Str(parser) => match self.extensions.lookup(&parser) {
                    Some(kind) => ParserSource::Named(kind),
                    None => {
                        return Err(CompileError::at(
                            format!("unknown parser extension '{}'", parser),
                            source_position,
                        ))
                    }
                },
                TokenKind::Ident(field) if !self.extensions.is_empty() => ParserSource::Field(field),
                TokenKind::Ident(_) => {
                    return Err(CompileError::at(
                        "no parser extensions are enabled",
                        source_position,
                    ))
                }
                _ => {
                    self.index -= 1;
                    return Err(self.unexpected("parser name"));
                }
            };
            self.expect(&TokenKind::Comma, "','")?;
            source
        } else {
            match self.extensions.lookup(name) {
                Some(kind) => ParserSource::Named(kind),
                None => {
                    return Err(CompileError::at(
                        format!("unknown function '{}'", name),
                        position,
                    ))
                }
            }
        };

        let path_position = self.position();
        let TokenKind::Str(path) = self.advance() else {
            return Err(CompileError::at(
                "parser path must be a string",
                path_position,
            ));
        };
        self.expect(&TokenKind::RParen, "')'")?;

        Ok(Expr::FunctionCall {
            function: Function::Extension(ExtensionCall::new(source, path)),
            args: vec![],
        })
    }
}

fn comparison_op(kind: &TokenKind) -> Option<ComparisonOp> {
    Some(match kind {
        TokenKind::Eq => ComparisonOp::Equal,
        TokenKind::NotEq => ComparisonOp::NotEqual,
        TokenKind::Lt => ComparisonOp::Less,
        TokenKind::LtEq => ComparisonOp::LessOrEqual,
        TokenKind::Gt => ComparisonOp::Greater,
        TokenKind::GtEq => ComparisonOp::GreaterOrEqual,
        _ => return None,
    })
}

fn arithmetic(op: ArithmeticOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Arithmetic {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn logical(op: LogicalOp, lhs: Expr, rhs: Option<Expr>) -> Expr {
    Expr::Logical {
        op,
        lhs: Box::new(lhs),
        rhs: rhs.map(Box::new),
    }
}
