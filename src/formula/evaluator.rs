//! Evaluate a parsed formula against a scope
//!
//! The evaluator is a pure tree walk. Names resolve only through the
//! [`Scope`] handed in; there is no other environment.

use super::ast::{placeholder_name, BinaryOp, Builtin, Expr, UnaryOp};
use super::FormulaError;

/// The only source of values a formula can see
pub trait Scope {
    /// Number of positional placeholders bound, `M1..=Mn`
    fn placeholder_count(&self) -> usize;

    /// Value of `M{index}` (1-based), if supplied
    fn placeholder(&self, index: usize) -> Option<f64>;

    /// Value of a named variable, if this scope binds it
    fn variable(&self, _name: &str) -> Option<f64> {
        None
    }

    fn binds(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }
}

/// Evaluate `expr`; the result is always finite
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<f64, FormulaError> {
    eval(expr, scope)
}

fn eval(expr: &Expr, scope: &dyn Scope) -> Result<f64, FormulaError> {
    let value = match expr {
        Expr::Number(n) => *n,

        Expr::Placeholder { index, span } => match scope.placeholder(*index) {
            Some(v) => v,
            None if *index == 0 || *index > scope.placeholder_count() => {
                return Err(FormulaError::PlaceholderOutOfRange {
                    name: placeholder_name(*index),
                    index: *index,
                    count: scope.placeholder_count(),
                    span: *span,
                })
            }
            None => {
                return Err(FormulaError::UnboundPlaceholder {
                    name: placeholder_name(*index),
                })
            }
        },

        Expr::Variable { name, span } => {
            scope
                .variable(name)
                .ok_or_else(|| FormulaError::UnknownIdentifier {
                    name: name.clone(),
                    span: *span,
                })?
        }

        Expr::Unary { op, operand } => {
            let v = eval(operand, scope)?;
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => flag(!truthy(v)),
            }
        }

        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, scope)?,

        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if truthy(eval(condition, scope)?) {
                eval(then_branch, scope)?
            } else {
                eval(else_branch, scope)?
            }
        }

        Expr::Call {
            function,
            args,
            span,
        } => {
            let builtin =
                Builtin::from_name(function).ok_or_else(|| FormulaError::UnknownFunction {
                    name: function.clone(),
                    span: *span,
                })?;
            if !builtin.accepts(args.len()) {
                return Err(FormulaError::WrongArity {
                    name: function.clone(),
                    expected: builtin.arity_label(),
                    found: args.len(),
                    span: *span,
                });
            }
            let values = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            apply(builtin, &values)
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::NonFiniteResult)
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &dyn Scope,
) -> Result<f64, FormulaError> {
    let l = eval(lhs, scope)?;

    // Logical operators short-circuit
    match op {
        BinaryOp::And if !truthy(l) => return Ok(0.0),
        BinaryOp::Or if truthy(l) => return Ok(1.0),
        _ => {}
    }

    let r = eval(rhs, scope)?;

    Ok(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div | BinaryOp::Rem if r == 0.0 => return Err(FormulaError::DivisionByZero),
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        BinaryOp::Lt => flag(l < r),
        BinaryOp::Le => flag(l <= r),
        BinaryOp::Gt => flag(l > r),
        BinaryOp::Ge => flag(l >= r),
        BinaryOp::Eq => flag(l == r),
        BinaryOp::Ne => flag(l != r),
        BinaryOp::And | BinaryOp::Or => flag(truthy(r)),
    })
}

fn apply(builtin: Builtin, values: &[f64]) -> f64 {
    match builtin {
        Builtin::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Builtin::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Builtin::Abs => values[0].abs(),
        Builtin::Round => values[0].round(),
        Builtin::Floor => values[0].floor(),
        Builtin::Ceil => values[0].ceil(),
    }
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
