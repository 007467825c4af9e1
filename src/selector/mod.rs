//! Message selector language
//!
//! A selector is a boolean expression evaluated against message fields,
//! e.g. `temperature > 20 AND location LIKE 'lab-%'`. Selectors are parsed,
//! folded and canonicalised once at compile time; evaluation is a pure
//! walk over the compiled tree.
//!
//! Evaluation uses three-valued logic: missing fields and type mismatches
//! produce *unknown*, and only a definite `TRUE` selects a message.

mod ast;
mod cache;
mod extension;
mod lexer;
mod like;
mod ops;
mod parser;
mod value;

#[cfg(test)]
mod tests;

use std::fmt;

pub use ast::{ArithmeticOp, ComparisonOp, Expr, Function, LogicalOp};
pub use cache::SelectorCache;
pub use extension::{ExtensionCall, ExtensionRegistry, ParserKind, ParserSource};
pub use like::LikePattern;
pub use value::Value;

use crate::config::SelectorConfig;
use crate::resolver::IdentifierResolver;
use lexer::Lexer;
use parser::Parser;

/// Default cap on a `LIKE` pattern, in bytes
pub const DEFAULT_MAX_LIKE_PATTERN: usize = 100 * 1024;

/// Default cap on expression nesting and tree depth
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Selector compilation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    reason: String,
    position: Option<usize>,
}

impl CompileError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            position: None,
        }
    }

    pub(crate) fn at(reason: impl Into<String>, position: usize) -> Self {
        Self {
            reason: reason.into(),
            position: Some(position),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Byte offset into the selector text, when known
    pub fn position(&self) -> Option<usize> {
        self.position
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "invalid selector at offset {}: {}", pos, self.reason),
            None => write!(f, "invalid selector: {}", self.reason),
        }
    }
}

impl std::error::Error for CompileError {}

/// Compiles selector text with a fixed set of extensions and limits
#[derive(Debug, Clone)]
pub struct SelectorCompiler {
    extensions: ExtensionRegistry,
    max_like_pattern: usize,
    max_depth: usize,
}

impl SelectorCompiler {
    pub fn new(config: &SelectorConfig) -> Result<Self, CompileError> {
        let extensions = ExtensionRegistry::from_names(&config.extensions)
            .map_err(|name| CompileError::new(format!("unknown parser extension '{}'", name)))?;
        Ok(Self {
            extensions,
            max_like_pattern: config.max_like_pattern,
            max_depth: config.max_depth,
        })
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_max_like_pattern(mut self, max: usize) -> Self {
        self.max_like_pattern = max;
        self
    }

    /// Cap on nesting and tree depth (0 = unlimited)
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Parse, fold and canonicalise `text`
    pub fn compile(&self, text: &str) -> Result<CompiledSelector, CompileError> {
        let tokens = Lexer::new(text).tokenize()?;
        let raw = Parser::new(tokens, &self.extensions, self.max_like_pattern)
            .with_max_depth(self.max_depth)
            .parse()?;
        let root = raw.compile();
        tracing::trace!(selector = %text, canonical = %root, "compiled selector");
        Ok(CompiledSelector { root })
    }
}

impl Default for SelectorCompiler {
    fn default() -> Self {
        Self {
            extensions: ExtensionRegistry::default(),
            max_like_pattern: DEFAULT_MAX_LIKE_PATTERN,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Compile `text` with the default extensions and limits
pub fn compile(text: &str) -> Result<CompiledSelector, CompileError> {
    SelectorCompiler::default().compile(text)
}

/// A compiled selector.
///
/// Equality and hashing are structural over the canonical tree, so
/// `a = 5 + b` and `a = b + 5` are the same selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledSelector {
    root: Expr,
}

impl CompiledSelector {
    /// A selector that always evaluates to `value`
    pub fn constant_of(value: bool) -> Self {
        Self {
            root: Expr::Literal(Value::Bool(value)),
        }
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// The folded result if the selector does not depend on the message
    pub fn constant(&self) -> Option<&Value> {
        self.root.as_literal()
    }

    /// True when the selector selects every message
    pub fn is_always_true(&self) -> bool {
        matches!(self.constant(), Some(Value::Bool(true)))
    }

    /// Raw three-valued result
    pub fn evaluate_value(&self, resolver: &dyn IdentifierResolver) -> Value {
        self.root.evaluate(resolver)
    }

    /// Whether the selector selects the message; unknown does not select
    pub fn evaluate(&self, resolver: &dyn IdentifierResolver) -> bool {
        matches!(self.root.evaluate(resolver), Value::Bool(true))
    }
}

impl fmt::Display for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
