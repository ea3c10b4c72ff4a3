//! Formula AST
//!
//! The grammar is deliberately small: numbers, positional placeholders
//! (`M1..Mn`), scope variables, arithmetic, comparisons, logical operators,
//! the `?:` conditional and a fixed set of built-in functions. Nothing in the
//! tree can name anything outside the scope it is evaluated against.

use serde::{Deserialize, Serialize};

/// Prefix of positional measurement placeholders
pub const PLACEHOLDER_PREFIX: char = 'M';

/// Byte range in the formula source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Functions callable from a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Min,
    Max,
    Abs,
    Round,
    Floor,
    Ceil,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            "abs" => Some(Builtin::Abs),
            "round" => Some(Builtin::Round),
            "floor" => Some(Builtin::Floor),
            "ceil" => Some(Builtin::Ceil),
            _ => None,
        }
    }

    /// Whether `count` arguments is acceptable
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Builtin::Min | Builtin::Max => count >= 1,
            Builtin::Abs | Builtin::Round | Builtin::Floor | Builtin::Ceil => count == 1,
        }
    }

    pub fn arity_label(&self) -> &'static str {
        match self {
            Builtin::Min | Builtin::Max => "at least 1",
            Builtin::Abs | Builtin::Round | Builtin::Floor | Builtin::Ceil => "exactly 1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    /// `M{index}`, 1-based
    Placeholder {
        index: usize,
        span: Span,
    },
    /// Any other bare identifier; only valid if the scope binds it
    Variable {
        name: String,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Pre-order walk over every node
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Number(_) | Expr::Placeholder { .. } | Expr::Variable { .. } => {}
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk(visit);
                then_branch.walk(visit);
                else_branch.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}

/// Render a placeholder name, `M{index}`
pub fn placeholder_name(index: usize) -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, index)
}

/// Parse `M{digits}` into its index; `None` for anything else
///
/// An index too large for `usize` saturates to `usize::MAX`, which no set
/// can reach, so it is still reported as a placeholder out of range.
pub fn parse_placeholder(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(PLACEHOLDER_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placeholder() {
        assert_eq!(parse_placeholder("M1"), Some(1));
        assert_eq!(parse_placeholder("M12"), Some(12));
        assert_eq!(parse_placeholder("M0"), Some(0));
        assert_eq!(parse_placeholder("M"), None);
        assert_eq!(parse_placeholder("m1"), None);
        assert_eq!(parse_placeholder("M1a"), None);
        assert_eq!(parse_placeholder("Max"), None);
        assert_eq!(
            parse_placeholder("M99999999999999999999999"),
            Some(usize::MAX)
        );
    }

    #[test]
    fn test_walk_visits_all_nodes() {
        let expr = Expr::Conditional {
            condition: Box::new(Expr::binary(
                BinaryOp::Gt,
                Expr::Placeholder {
                    index: 1,
                    span: Span::new(0, 2),
                },
                Expr::Number(90.0),
            )),
            then_branch: Box::new(Expr::Number(5.0)),
            else_branch: Box::new(Expr::Number(3.0)),
        };
        let mut count = 0;
        expr.walk(&mut |_| count += 1);
        assert_eq!(count, 6);
    }

    #[test]
    fn test_builtin_arity() {
        assert!(Builtin::Max.accepts(3));
        assert!(!Builtin::Max.accepts(0));
        assert!(!Builtin::Abs.accepts(2));
        assert_eq!(Builtin::from_name("sqrt"), None);
    }
}
