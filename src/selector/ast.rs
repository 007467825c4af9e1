//! Selector expression tree
//!
//! Nodes are immutable once built. `compile()` folds constant sub-trees
//! into literals and orders the operands of symmetric operators (greater
//! operand first, comparisons mirrored), so a compiled tree never holds an
//! operator whose operands are all literals, and selectors differing only
//! in operand order compare and hash equal.

use std::fmt;

use compact_str::CompactString;

use super::extension::ExtensionCall;
use super::like::LikePattern;
use super::ops;
use super::value::Value;
use crate::resolver::IdentifierResolver;

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    fn is_commutative(self) -> bool {
        matches!(self, ArithmeticOp::Add | ArithmeticOp::Multiply)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOp {
    /// The operator that gives the same result with operands swapped
    fn mirror(self) -> Self {
        match self {
            ComparisonOp::Less => ComparisonOp::Greater,
            ComparisonOp::LessOrEqual => ComparisonOp::GreaterOrEqual,
            ComparisonOp::Greater => ComparisonOp::Less,
            ComparisonOp::GreaterOrEqual => ComparisonOp::LessOrEqual,
            op => op,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::Less => "<",
            ComparisonOp::LessOrEqual => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterOrEqual => ">=",
        }
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Built-in functions and predicates with more than two operands
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {
    /// args: `[value, low, high]`
    Between { negated: bool },
    /// args: `[value, item...]`, items are literals
    In { negated: bool },
    /// args: `[value]`
    Like { pattern: LikePattern, negated: bool },
    /// args: `[]`, reads the message payload
    Extension(ExtensionCall),
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Literal(Value),
    Identifier(CompactString),
    Negate(Box<Expr>),
    Arithmetic {
        op: ArithmeticOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Comparison {
        op: ComparisonOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `rhs` is `None` only for `NOT`
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Option<Box<Expr>>,
    },
    FunctionCall {
        function: Function,
        args: Vec<Expr>,
    },
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn identifier(path: &str) -> Self {
        Expr::Identifier(path.into())
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Whether evaluation can only yield a boolean or unknown
    fn is_predicate(&self) -> bool {
        match self {
            Expr::Literal(value) => matches!(value, Value::Bool(_) | Value::Absent),
            Expr::Comparison { .. } | Expr::Logical { .. } | Expr::IsNull { .. } => true,
            Expr::FunctionCall { function, .. } => !matches!(function, Function::Extension(_)),
            Expr::Identifier(_) | Expr::Negate(_) | Expr::Arithmetic { .. } => false,
        }
    }

    /// Fold constants and canonicalise operand order, bottom-up.
    pub fn compile(self) -> Expr {
        match self {
            Expr::Literal(_) | Expr::Identifier(_) => self,

            Expr::Negate(operand) => match operand.compile() {
                Expr::Literal(v) => Expr::Literal(ops::negate(&v)),
                operand => Expr::Negate(Box::new(operand)),
            },

            Expr::Arithmetic { op, lhs, rhs } => {
                let (lhs, rhs) = (lhs.compile(), rhs.compile());
                if let (Expr::Literal(a), Expr::Literal(b)) = (&lhs, &rhs) {
                    return Expr::Literal(ops::arithmetic(op, a, b));
                }
                let (lhs, rhs) = if op.is_commutative() && lhs < rhs {
                    (rhs, lhs)
                } else {
                    (lhs, rhs)
                };
                Expr::Arithmetic {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }

            Expr::Comparison { op, lhs, rhs } => {
                let (lhs, rhs) = (lhs.compile(), rhs.compile());
                if let (Expr::Literal(a), Expr::Literal(b)) = (&lhs, &rhs) {
                    return Expr::Literal(ops::compare(op, a, b));
                }
                let (op, lhs, rhs) = if lhs < rhs {
                    (op.mirror(), rhs, lhs)
                } else {
                    (op, lhs, rhs)
                };
                Expr::Comparison {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }

            Expr::Logical { op, lhs, rhs } => {
                compile_logical(op, lhs.compile(), rhs.map(|r| r.compile()))
            }

            Expr::FunctionCall { function, args } => {
                let args: Vec<Expr> = args.into_iter().map(Expr::compile).collect();
                let foldable = !matches!(function, Function::Extension(_))
                    && args.iter().all(Expr::is_literal);
                if foldable {
                    let values: Vec<Value> = args
                        .iter()
                        .filter_map(|a| a.as_literal().cloned())
                        .collect();
                    return Expr::Literal(apply_function(&function, &values));
                }
                Expr::FunctionCall { function, args }
            }

            Expr::IsNull { operand, negated } => match operand.compile() {
                Expr::Literal(v) => Expr::Literal(Value::Bool(v.is_absent() != negated)),
                operand => Expr::IsNull {
                    operand: Box::new(operand),
                    negated,
                },
            },
        }
    }

    /// Evaluate against a resolver. Both sides of `AND`/`OR` are always evaluated.
    pub fn evaluate(&self, resolver: &dyn IdentifierResolver) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Identifier(path) => resolver.resolve(path),
            Expr::Negate(operand) => ops::negate(&operand.evaluate(resolver)),
            Expr::Arithmetic { op, lhs, rhs } => {
                ops::arithmetic(*op, &lhs.evaluate(resolver), &rhs.evaluate(resolver))
            }
            Expr::Comparison { op, lhs, rhs } => {
                ops::compare(*op, &lhs.evaluate(resolver), &rhs.evaluate(resolver))
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = lhs.evaluate(resolver);
                let rhs = rhs.as_ref().map(|r| r.evaluate(resolver));
                apply_logical(*op, &lhs, rhs.as_ref())
            }
            Expr::FunctionCall { function, args } => {
                if let Function::Extension(call) = function {
                    return call.evaluate(resolver);
                }
                let values: Vec<Value> = args.iter().map(|a| a.evaluate(resolver)).collect();
                apply_function(function, &values)
            }
            Expr::IsNull { operand, negated } => {
                let is_null = ops::is_null(&operand.evaluate(resolver));
                if *negated {
                    ops::not(&is_null)
                } else {
                    is_null
                }
            }
        }
    }
}

fn compile_logical(op: LogicalOp, lhs: Expr, rhs: Option<Expr>) -> Expr {
    let Some(rhs) = rhs else {
        return match lhs {
            Expr::Literal(v) => Expr::Literal(ops::not(&v)),
            lhs => Expr::Logical {
                op,
                lhs: Box::new(lhs),
                rhs: None,
            },
        };
    };

    if let (Expr::Literal(a), Expr::Literal(b)) = (&lhs, &rhs) {
        return Expr::Literal(apply_logical(op, a, Some(b)));
    }

    // One side is a boolean literal: the node either decides, or reduces to
    // the other side when that side can only be a boolean or unknown
    let decided = matches!(op, LogicalOp::Or);
    for (constant, other) in [(&lhs, &rhs), (&rhs, &lhs)] {
        match constant.as_literal().and_then(Value::truth) {
            Some(b) if b == decided => return Expr::Literal(Value::Bool(decided)),
            Some(_) if other.is_predicate() => return other.clone(),
            _ => {}
        }
    }

    let (lhs, rhs) = if lhs < rhs { (rhs, lhs) } else { (lhs, rhs) };
    Expr::Logical {
        op,
        lhs: Box::new(lhs),
        rhs: Some(Box::new(rhs)),
    }
}

fn apply_logical(op: LogicalOp, lhs: &Value, rhs: Option<&Value>) -> Value {
    match (op, rhs) {
        (LogicalOp::And, Some(rhs)) => ops::and(lhs, rhs),
        (LogicalOp::Or, Some(rhs)) => ops::or(lhs, rhs),
        _ => ops::not(lhs),
    }
}

fn apply_function(function: &Function, args: &[Value]) -> Value {
    let Some((value, rest)) = args.split_first() else {
        return Value::Absent;
    };

    let (result, negated) = match function {
        Function::Between { negated } => match rest {
            [low, high] => (ops::between(value, low, high), *negated),
            _ => return Value::Absent,
        },
        Function::In { negated } => (ops::in_list(value, rest), *negated),
        Function::Like { pattern, negated } => {
            let result = match value.render() {
                Some(text) => Value::Bool(pattern.matches(&text)),
                None => Value::Absent,
            };
            (result, *negated)
        }
        Function::Extension(_) => return Value::Absent,
    };

    if negated {
        ops::not(&result)
    } else {
        result
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Identifier(path) => write!(f, "{}", path),
            Expr::Negate(operand) => write!(f, "-({})", operand),
            Expr::Arithmetic { op, lhs, rhs } => write!(f, "({}) {} ({})", lhs, op.as_str(), rhs),
            Expr::Comparison { op, lhs, rhs } => write!(f, "({}) {} ({})", lhs, op.as_str(), rhs),
            Expr::Logical { op, lhs, rhs } => match (op, rhs) {
                (LogicalOp::And, Some(rhs)) => write!(f, "({}) AND ({})", lhs, rhs),
                (LogicalOp::Or, Some(rhs)) => write!(f, "({}) OR ({})", lhs, rhs),
                _ => write!(f, "NOT ({})", lhs),
            },
            Expr::FunctionCall { function, args } => fmt_function(f, function, args),
            Expr::IsNull { operand, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "({}) IS{} NULL", operand, not)
            }
        }
    }
}

fn fmt_function(f: &mut fmt::Formatter<'_>, function: &Function, args: &[Expr]) -> fmt::Result {
    let not = |negated: bool| if negated { "NOT " } else { "" };
    match (function, args) {
        (Function::Between { negated }, [value, low, high]) => write!(
            f,
            "({}) {}BETWEEN ({}) AND ({})",
            value,
            not(*negated),
            low,
            high
        ),
        (Function::In { negated }, [value, items @ ..]) => {
            write!(f, "({}) {}IN (", value, not(*negated))?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, ")")
        }
        (Function::Like { pattern, negated }, [value]) => {
            write!(f, "({}) {}LIKE {}", value, not(*negated), pattern)
        }
        (Function::Extension(call), _) => write!(f, "{}", call),
        _ => write!(f, "<malformed>"),
    }
}
