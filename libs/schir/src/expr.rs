//! Parameter expressions.
//!
//! Expressions use SPICE-style numeric literals, including engineering
//! suffixes (`1k`, `10meg`, `2.5u`), double-quoted strings, identifiers and
//! the four arithmetic operators.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use arcstr::ArcStr;
use indexmap::IndexMap;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while};
use nom::character::complete::{
    alpha1, alphanumeric1, char, digit1, multispace0, none_of, one_of,
};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::multi::{many0, many0_count};
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An expression, used in parameter assignments.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A numeric literal.
    NumericLiteral(Decimal),
    /// A string literal.
    StringLiteral(ArcStr),
    /// A variable/identifier in an expression.
    Var(ArcStr),
    /// Arithmetic negation.
    Neg(Box<Expr>),
    /// A binary operation.
    BinOp {
        /// The operation type.
        op: BinOp,
        /// The left operand.
        left: Box<Expr>,
        /// The right operand.
        right: Box<Expr>,
    },
}

/// Binary operation types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
}

impl BinOp {
    fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

/// The value of an evaluated expression.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// An exact decimal number.
    Number(Decimal),
    /// A string.
    Text(ArcStr),
    /// An expression left for the simulator to evaluate.
    ///
    /// Produced when an expression depends on a parameter that is kept
    /// symbolic so that it can be swept.
    Symbolic(ArcStr),
}

impl Value {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string value, if this is text.
    pub fn as_text(&self) -> Option<&ArcStr> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Text(s) => write!(f, "{s}"),
            Value::Symbolic(s) => write!(f, "{{{s}}}"),
        }
    }
}

/// A set of named values that expressions can refer to.
pub trait Scope {
    /// Looks up the value bound to `name`.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for IndexMap<ArcStr, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// An error parsing an expression string.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("invalid expression `{input}`: {reason}")]
pub struct ParseError {
    /// The text that failed to parse.
    pub input: String,
    /// A description of the problem.
    pub reason: String,
}

/// An error evaluating an expression.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// A variable is not defined in the evaluation scope.
    #[error("`{0}` is not defined")]
    Unresolved(ArcStr),
    /// Division by an exact zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Arithmetic was attempted on a string.
    #[error("cannot apply `{op}` to a string operand")]
    NonNumeric {
        /// The operator.
        op: char,
    },
    /// The result does not fit in a decimal.
    #[error("arithmetic overflow")]
    Overflow,
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expr::parse(s)
    }
}

impl Expr {
    /// Parses an expression string.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        match all_consuming(ws(expr))(input) {
            Ok((_, expr)) => Ok(expr),
            Err(e) => Err(ParseError {
                input: input.to_string(),
                reason: match e {
                    nom::Err::Error(e) | nom::Err::Failure(e) if e.input.is_empty() => {
                        "unexpected end of expression".to_string()
                    }
                    nom::Err::Error(e) | nom::Err::Failure(e) => {
                        format!("unexpected input at `{}`", e.input)
                    }
                    nom::Err::Incomplete(_) => "unexpected end of expression".to_string(),
                },
            }),
        }
    }

    /// Evaluates the expression against a scope of named values.
    pub fn eval(&self, scope: &dyn Scope) -> Result<Value, EvalError> {
        match self {
            Expr::NumericLiteral(n) => Ok(Value::Number(*n)),
            Expr::StringLiteral(s) => Ok(Value::Text(s.clone())),
            Expr::Var(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::Unresolved(name.clone())),
            Expr::Neg(inner) => match inner.eval(scope)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                Value::Symbolic(s) => Ok(Value::Symbolic(format!("-({s})").into())),
                Value::Text(_) => Err(EvalError::NonNumeric { op: '-' }),
            },
            Expr::BinOp { op, left, right } => {
                let left = left.eval(scope)?;
                let right = right.eval(scope)?;
                apply(*op, left, right)
            }
        }
    }

    /// The variables referenced by this expression, in order of appearance.
    pub fn vars(&self) -> Vec<&ArcStr> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a ArcStr>) {
        match self {
            Expr::Var(name) => out.push(name),
            Expr::Neg(inner) => inner.collect_vars(out),
            Expr::BinOp { left, right, .. } => {
                left.collect_vars(out);
                right.collect_vars(out);
            }
            Expr::NumericLiteral(_) | Expr::StringLiteral(_) => {}
        }
    }
}

fn apply(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Text(_), _) | (_, Value::Text(_)) => Err(EvalError::NonNumeric { op: op.symbol() }),
        (Value::Number(l), Value::Number(r)) => {
            let out = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Div => {
                    if r.is_zero() {
                        return Err(EvalError::DivisionByZero);
                    }
                    l.checked_div(r)
                }
            };
            out.map(Value::Number).ok_or(EvalError::Overflow)
        }
        (l, r) => Ok(Value::Symbolic(
            format!("({}{}{})", symbolic_operand(&l), op.symbol(), symbolic_operand(&r)).into(),
        )),
    }
}

fn symbolic_operand(value: &Value) -> String {
    match value {
        Value::Number(n) => n.normalize().to_string(),
        Value::Symbolic(s) | Value::Text(s) => s.to_string(),
    }
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(one_of("+-")), term))(input)?;
    Ok((input, fold(first, rest)))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(one_of("*/")), unary))(input)?;
    Ok((input, fold(first, rest)))
}

fn fold(first: Expr, rest: Vec<(char, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| Expr::BinOp {
        op: match op {
            '+' => BinOp::Add,
            '-' => BinOp::Sub,
            '*' => BinOp::Mul,
            _ => BinOp::Div,
        },
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        ws(atom),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    alt((
        map(number, Expr::NumericLiteral),
        map(string, Expr::StringLiteral),
        map(ident, |s: &str| Expr::Var(ArcStr::from(s))),
        delimited(char('('), ws(expr), char(')')),
        delimited(char('{'), ws(expr), char('}')),
    ))(input)
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn string(input: &str) -> IResult<&str, ArcStr> {
    map(
        delimited(char('"'), recognize(many0_count(none_of("\""))), char('"')),
        ArcStr::from,
    )(input)
}

fn mantissa(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit1)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn suffix(input: &str) -> IResult<&str, Decimal> {
    alt((
        map(tag_no_case("meg"), |_| Decimal::from(1_000_000)),
        map(tag_no_case("mil"), |_| Decimal::new(254, 7)),
        map(tag_no_case("t"), |_| Decimal::from(1_000_000_000_000i64)),
        map(tag_no_case("g"), |_| Decimal::from(1_000_000_000)),
        map(tag_no_case("k"), |_| Decimal::from(1_000)),
        map(tag_no_case("m"), |_| Decimal::new(1, 3)),
        map(tag_no_case("u"), |_| Decimal::new(1, 6)),
        map(tag_no_case("n"), |_| Decimal::new(1, 9)),
        map(tag_no_case("p"), |_| Decimal::new(1, 12)),
        map(tag_no_case("f"), |_| Decimal::new(1, 15)),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Decimal> {
    let (input, value) = map_res(mantissa, parse_decimal)(input)?;
    let (input, scale) = opt(suffix)(input)?;
    // Trailing unit letters (`1kohm`, `10pF`) carry no meaning.
    let (rest, _) = take_while(|c: char| c.is_ascii_alphabetic())(input)?;
    match scale {
        None => Ok((rest, value)),
        Some(scale) => value.checked_mul(scale).map(|v| (rest, v)).ok_or_else(|| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::TooLarge))
        }),
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, rust_decimal::Error> {
    if s.contains(['e', 'E']) {
        Decimal::from_scientific(s)
    } else {
        Decimal::from_str(s)
    }
}
