//! Formula parser
//!
//! Nom-based recursive descent parser producing [`Expr`]. Precedence, lowest
//! first:
//!
//! ```text
//! conditional     a ? b : c          (right associative)
//! logical or      ||
//! logical and     &&
//! equality        == !=
//! comparison      < <= > >=
//! additive        + - −
//! multiplicative  * × / ÷ %
//! unary           - − !
//! primary         number | (expr) | name(args) | name
//! ```
//!
//! Every production that recurses (a parenthesis, a unary prefix, a `?:`
//! branch, a call argument) goes one level deeper. Past `max_depth` the parse
//! fails with [`FormulaError::TooDeep`] before the stack can grow further.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
    combinator::{all_consuming, cut, map_res, opt, recognize},
    error::{context, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list0},
    sequence::pair,
    IResult,
};

use super::ast::{parse_placeholder, BinaryOp, Expr, Span, UnaryOp};
use super::FormulaError;

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

type Operand = for<'a> fn(&'a str, Frame<'a>) -> ParseResult<'a, Expr>;

const NESTING_LIMIT: &str = "nesting limit";

/// Source being parsed and the nesting depth of the current production
#[derive(Debug, Clone, Copy)]
struct Frame<'a> {
    src: &'a str,
    depth: usize,
    max_depth: usize,
}

impl<'a> Frame<'a> {
    /// One level deeper; a hard failure once past `max_depth`
    fn nested(self, input: &'a str) -> Result<Self, nom::Err<VerboseError<&'a str>>> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(nom::Err::Failure(VerboseError {
                errors: vec![(input, VerboseErrorKind::Context(NESTING_LIMIT))],
            }));
        }
        Ok(Self { depth, ..self })
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a complete formula, nesting at most `max_depth` levels
pub fn parse_formula(source: &str, max_depth: usize) -> Result<Expr, FormulaError> {
    let frame = Frame {
        src: source,
        depth: 0,
        max_depth,
    };
    let result = all_consuming(|i| expression(i, frame))(source);
    match result {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            if too_deep(&e) {
                Err(FormulaError::TooDeep { limit: max_depth })
            } else {
                Err(syntax_error(source, &e))
            }
        }
        Err(nom::Err::Incomplete(_)) => Err(FormulaError::Syntax {
            position: source.len(),
            message: "incomplete formula".to_string(),
        }),
    }
}

fn too_deep(error: &VerboseError<&str>) -> bool {
    error
        .errors
        .iter()
        .any(|(_, kind)| matches!(kind, VerboseErrorKind::Context(ctx) if *ctx == NESTING_LIMIT))
}

fn syntax_error(source: &str, error: &VerboseError<&str>) -> FormulaError {
    let position = error
        .errors
        .first()
        .map(|(rest, _)| offset(source, rest))
        .unwrap_or(0);

    let message = error
        .errors
        .iter()
        .find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(ctx) => Some(format!("expected {}", ctx)),
            _ => None,
        })
        .or_else(|| {
            error.errors.first().map(|(rest, kind)| match kind {
                VerboseErrorKind::Char(c) => format!("expected '{}'", c),
                _ if rest.trim().is_empty() => "unexpected end of formula".to_string(),
                _ => format!("unexpected '{}'", snippet(rest)),
            })
        })
        .unwrap_or_else(|| "invalid formula".to_string());

    FormulaError::Syntax { position, message }
}

fn snippet(rest: &str) -> String {
    rest.trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(12)
        .collect()
}

fn offset(source: &str, rest: &str) -> usize {
    source.len() - rest.len()
}

// ============================================================================
// Expression levels
// ============================================================================

fn expression<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    let (input, _) = multispace0(input)?;
    let (input, expr) = conditional(input, f)?;
    let (input, _) = multispace0(input)?;
    Ok((input, expr))
}

fn conditional<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    let (input, condition) = logical_or(input, f)?;
    let (rest, _) = multispace0(input)?;

    let Ok((rest, _)) = char::<_, VerboseError<&str>>('?')(rest) else {
        return Ok((input, condition));
    };

    let branch = f.nested(rest)?;
    let (rest, then_branch) = cut(|i| expression(i, branch))(rest)?;
    let (rest, _) = cut(context("':' of conditional", char(':')))(rest)?;
    let (rest, else_branch) = cut(|i| expression(i, branch))(rest)?;

    Ok((
        rest,
        Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        },
    ))
}

fn logical_or<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    binary_level(input, f, logical_and, &[("||", BinaryOp::Or)])
}

fn logical_and<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    binary_level(input, f, equality, &[("&&", BinaryOp::And)])
}

fn equality<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    binary_level(
        input,
        f,
        comparison,
        &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
    )
}

fn comparison<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    // Two-character operators first so `<=` is not read as `<`
    binary_level(
        input,
        f,
        additive,
        &[
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
        ],
    )
}

fn additive<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    binary_level(
        input,
        f,
        multiplicative,
        &[
            ("+", BinaryOp::Add),
            ("-", BinaryOp::Sub),
            ("−", BinaryOp::Sub),
        ],
    )
}

fn multiplicative<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    binary_level(
        input,
        f,
        unary,
        &[
            ("*", BinaryOp::Mul),
            ("×", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("÷", BinaryOp::Div),
            ("%", BinaryOp::Rem),
        ],
    )
}

/// Left-associative chain of `operand (op operand)*`, parsed in a loop
fn binary_level<'a>(
    input: &'a str,
    f: Frame<'a>,
    operand: Operand,
    operators: &[(&str, BinaryOp)],
) -> ParseResult<'a, Expr> {
    let (mut input, mut lhs) = operand(input, f)?;

    loop {
        let (rest, _) = multispace0(input)?;
        let Some((symbol, op)) = operators
            .iter()
            .find(|(symbol, _)| rest.starts_with(*symbol))
        else {
            return Ok((input, lhs));
        };

        let (rest, rhs) = cut(|i| operand(i, f))(&rest[symbol.len()..])?;
        lhs = Expr::binary(*op, lhs, rhs);
        input = rest;
    }
}

fn unary<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    let (input, _) = multispace0(input)?;

    let prefix = ['-', '−', '!']
        .into_iter()
        .find(|c| input.starts_with(*c));

    let Some(prefix) = prefix else {
        return primary(input, f);
    };

    let inner = f.nested(input)?;
    let (rest, operand) = cut(|i| unary(i, inner))(&input[prefix.len_utf8()..])?;
    let expr = match (prefix, operand) {
        ('!', operand) => Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        },
        (_, Expr::Number(n)) => Expr::Number(-n),
        (_, operand) => Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        },
    };
    Ok((rest, expr))
}

// ============================================================================
// Primaries
// ============================================================================

fn primary<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    context(
        "operand",
        alt((
            number,
            |i| parenthesized(i, f),
            |i| identifier_or_call(i, f),
        )),
    )(input)
}

fn number(input: &str) -> ParseResult<'_, Expr> {
    map_res(
        recognize(alt((
            recognize(pair(digit1, opt(pair(char('.'), digit1)))),
            recognize(pair(char('.'), digit1)),
        ))),
        |s: &str| s.parse::<f64>().map(Expr::Number),
    )(input)
}

fn parenthesized<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    let (input, _) = char('(')(input)?;
    let inner = f.nested(input)?;
    let (input, expr) = cut(|i| expression(i, inner))(input)?;
    let (input, _) = cut(context("closing parenthesis", char(')')))(input)?;
    Ok((input, expr))
}

fn identifier_or_call<'a>(input: &'a str, f: Frame<'a>) -> ParseResult<'a, Expr> {
    let start = offset(f.src, input);
    let (input, name) = identifier(input)?;
    let name_span = Span::new(start, offset(f.src, input));

    let (after_ws, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<_, VerboseError<&str>>('(')(after_ws) {
        let inner = f.nested(rest)?;
        let (rest, args) = separated_list0(char(','), |i| expression(i, inner))(rest)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, _) = cut(context("closing parenthesis of call", char(')')))(rest)?;
        return Ok((
            rest,
            Expr::Call {
                function: name.to_string(),
                args,
                span: Span::new(start, offset(f.src, rest)),
            },
        ));
    }

    let expr = match parse_placeholder(name) {
        Some(index) => Expr::Placeholder {
            index,
            span: name_span,
        },
        None => Expr::Variable {
            name: name.to_string(),
            span: name_span,
        },
    };
    Ok((input, expr))
}

fn identifier(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

// ============================================================================
// Tests
// ============================================================================
