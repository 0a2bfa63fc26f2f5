//! Unevaluated remote operations and their expression text.

use std::fmt;

use super::Value;
use crate::error::SessionError;

/// Binary operator of an `Operation::Binary` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    NotIn,
    Is,
    IsNot,
}

impl BinaryOp {
    /// Interpreter spelling of the operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "and",
            Self::Or => "or",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operator of an `Operation::Unary` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Pos,
    Neg,
    Invert,
    Not,
    /// `*x`, only meaningful as a call argument.
    Splat,
}

/// An operation over other values that has not been evaluated.
///
/// Rendering walks the operands and never talks to the interpreter.
#[derive(Debug, Clone)]
pub enum Operation {
    Binary {
        op: BinaryOp,
        left: Value,
        right: Value,
    },
    Unary {
        op: UnaryOp,
        operand: Value,
    },
    Attr {
        target: Value,
        name: String,
    },
    Index {
        target: Value,
        key: Value,
    },
    Call {
        target: Value,
        args: Vec<Value>,
    },
}

impl Operation {
    /// Fully parenthesized expression text.
    ///
    /// # Errors
    /// Returns `UseAfterDispose` if an operand is a disposed proxy, or a
    /// conversion error if a resolved operand has no literal form.
    pub fn render(&self) -> Result<String, SessionError> {
        Ok(match self {
            Self::Binary { op, left, right } => {
                format!("({} {op} {})", operand(left)?, operand(right)?)
            }
            Self::Unary {
                op: UnaryOp::Splat,
                operand,
            } => format!("*{}", operand.expression()?),
            Self::Unary {
                op: UnaryOp::Not,
                operand,
            } => format!("(not {})", operand.expression()?),
            Self::Unary { op, operand } => {
                let sign = match op {
                    UnaryOp::Pos => '+',
                    UnaryOp::Neg => '-',
                    _ => '~',
                };
                format!("({sign}{})", self::operand(operand)?)
            }
            Self::Attr { target, name } => format!("{}.{name}", target.target_expression()?),
            Self::Index { target, key } => {
                format!("{}[{}]", target.target_expression()?, key.expression()?)
            }
            Self::Call { target, args } => {
                let args = args
                    .iter()
                    .map(Value::expression)
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{}({})", target.target_expression()?, args.join(", "))
            }
        })
    }

    /// Operand values, in evaluation order.
    pub(crate) fn operands(&self) -> Vec<&Value> {
        match self {
            Self::Binary { left, right, .. } => vec![left, right],
            Self::Unary { operand, .. } => vec![operand],
            Self::Attr { target, .. } => vec![target],
            Self::Index { target, key } => vec![target, key],
            Self::Call { target, args } => std::iter::once(target).chain(args).collect(),
        }
    }
}

/// Expression text of an operand. A negative literal is grouped so that it
/// keeps its sign under `**` and unary operators.
fn operand(value: &Value) -> Result<String, SessionError> {
    let text = value.expression()?;
    if value.is_resolved() && text.starts_with('-') {
        Ok(format!("({text})"))
    } else {
        Ok(text)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<unrenderable>"),
        }
    }
}
