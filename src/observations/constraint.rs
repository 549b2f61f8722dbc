//! # Row constraints
//!
//! A [`Constraint`] is a row predicate applied to the observation table before partitioning.
//! It is either:
//!
//! * a SQL-like predicate string parsed with `nom`, e.g. `night < 731` or
//!   `filter = 'r' and fiveSigmaDepth > 24.0`, or
//! * a named closure, for predicates the small grammar cannot express.
//!
//! Every constraint carries a canonical **key** used as its label. Parsed constraints with the
//! same key select the same rows. Closures are opaque, so their [`Constraint::group_key`] also
//! carries the closure's identity: only clones of one closure constraint share a partition.
//!
//! Grammar
//! -----------------
//! ```text
//! disjunction := conjunction ("or" conjunction)*
//! conjunction := term ("and" term)*
//! term        := "(" disjunction ")" | identifier op literal
//! op          := "<=" | ">=" | "!=" | "<>" | "==" | "<" | ">" | "="
//! literal     := number | 'text' | "text"
//! ```
//! Keywords are case-insensitive and `and` binds tighter than `or`. Identifiers are resolved
//! through [`ColumnNames`]; the `filter` column only accepts `=`/`!=` against a band name.
//! A comparison on a column absent from a visit is false.
use std::{fmt, sync::Arc};

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, peek, recognize, value},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
    IResult, Parser,
};

use crate::skyslice_errors::SkysliceError;

use super::{
    columns::{ColumnNames, Field},
    Filter, Visit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Parsing
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum RawLiteral<'a> {
    Number(f64),
    Text(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
enum RawExpr<'a> {
    Or(Vec<RawExpr<'a>>),
    And(Vec<RawExpr<'a>>),
    Cmp(&'a str, CmpOp, RawLiteral<'a>),
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn operator(input: &str) -> IResult<&str, CmpOp> {
    alt((
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Ne, tag("<>")),
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
        value(CmpOp::Eq, tag("=")),
    ))
    .parse(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    ))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, RawLiteral<'_>> {
    alt((map(quoted, RawLiteral::Text), map(double, RawLiteral::Number))).parse(input)
}

fn comparison(input: &str) -> IResult<&str, RawExpr<'_>> {
    map(
        (
            identifier,
            delimited(multispace0, operator, multispace0),
            literal,
        ),
        |(name, op, lit)| RawExpr::Cmp(name, op, lit),
    )
    .parse(input)
}

fn term(input: &str) -> IResult<&str, RawExpr<'_>> {
    delimited(
        multispace0,
        alt((
            delimited(char('('), disjunction, preceded(multispace0, char(')'))),
            comparison,
        )),
        multispace0,
    )
    .parse(input)
}

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag_no_case(word), alt((multispace1, peek(tag("(")))))
}

fn conjunction(input: &str) -> IResult<&str, RawExpr<'_>> {
    map(separated_list1(keyword("and"), term), |mut terms| {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            RawExpr::And(terms)
        }
    })
    .parse(input)
}

fn disjunction(input: &str) -> IResult<&str, RawExpr<'_>> {
    map(separated_list1(keyword("or"), conjunction), |mut terms| {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            RawExpr::Or(terms)
        }
    })
    .parse(input)
}

// -------------------------------------------------------------------------------------------------
// Resolved expressions
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Numeric { field: Field, op: CmpOp, value: f64 },
    Band { filter: Filter, negate: bool },
}

impl Expr {
    fn resolve(raw: RawExpr<'_>, columns: &ColumnNames, expr: &str) -> Result<Expr, SkysliceError> {
        let invalid = |reason: String| SkysliceError::InvalidConstraint {
            expr: expr.to_string(),
            reason,
        };

        match raw {
            RawExpr::Or(terms) => Ok(Expr::Or(
                terms
                    .into_iter()
                    .map(|t| Expr::resolve(t, columns, expr))
                    .collect::<Result<_, _>>()?,
            )),
            RawExpr::And(terms) => Ok(Expr::And(
                terms
                    .into_iter()
                    .map(|t| Expr::resolve(t, columns, expr))
                    .collect::<Result<_, _>>()?,
            )),
            RawExpr::Cmp(name, op, lit) => {
                let field = columns.resolve(name)?;
                match (field, lit) {
                    (Field::Filter, RawLiteral::Text(band)) => {
                        let filter = band.parse::<Filter>()?;
                        match op {
                            CmpOp::Eq => Ok(Expr::Band {
                                filter,
                                negate: false,
                            }),
                            CmpOp::Ne => Ok(Expr::Band {
                                filter,
                                negate: true,
                            }),
                            _ => Err(invalid(format!(
                                "operator `{}` is not defined on filter bands",
                                op.symbol()
                            ))),
                        }
                    }
                    (Field::Filter, RawLiteral::Number(_)) => {
                        Err(invalid("filter must be compared to a quoted band name".into()))
                    }
                    (field, RawLiteral::Number(value)) => Ok(Expr::Numeric { field, op, value }),
                    (field, RawLiteral::Text(text)) => Err(invalid(format!(
                        "column `{field}` is numeric but was compared to '{text}'"
                    ))),
                }
            }
        }
    }

    fn eval(&self, visit: &Visit) -> bool {
        match self {
            Expr::Or(terms) => terms.iter().any(|t| t.eval(visit)),
            Expr::And(terms) => terms.iter().all(|t| t.eval(visit)),
            Expr::Numeric { field, op, value } => visit
                .numeric_value(*field)
                .is_some_and(|lhs| op.apply(lhs, *value)),
            Expr::Band { filter, negate } => (visit.filter == *filter) != *negate,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Or(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Expr::And(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    match t {
                        Expr::Or(_) => write!(f, "({t})")?,
                        _ => write!(f, "{t}")?,
                    }
                }
                Ok(())
            }
            Expr::Numeric { field, op, value } => write!(f, "{field} {} {value}", op.symbol()),
            Expr::Band { filter, negate } => {
                let op = if *negate { CmpOp::Ne } else { CmpOp::Eq };
                write!(f, "filter {} '{filter}'", op.symbol())
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Public constraint
// -------------------------------------------------------------------------------------------------

type VisitPredicate = Arc<dyn Fn(&Visit) -> bool + Send + Sync>;

#[derive(Clone)]
enum Predicate {
    Expr(Expr),
    Callable(VisitPredicate),
}

/// Row predicate with a canonical grouping key.
#[derive(Clone)]
pub struct Constraint {
    key: String,
    predicate: Predicate,
}

impl Constraint {
    /// Parse a predicate string, resolving column names through `columns`.
    ///
    /// Arguments
    /// -----------------
    /// * `expr`: the predicate, e.g. `"filter = 'r' and night < 365"`.
    /// * `columns`: column name registry used to resolve identifiers.
    ///
    /// Return
    /// ----------
    /// * The parsed constraint. Its key is the canonical rendering of the expression, so
    ///   `expMJD > 3` and `observationStartMJD>3.0` share a key.
    /// * [`SkysliceError::InvalidConstraint`] on a syntax or type error,
    ///   [`SkysliceError::UnknownColumn`] / [`SkysliceError::UnknownFilter`] on names that do not
    ///   resolve.
    pub fn parse(expr: &str, columns: &ColumnNames) -> Result<Self, SkysliceError> {
        if expr.trim().is_empty() {
            return Err(SkysliceError::InvalidConstraint {
                expr: expr.to_string(),
                reason: "empty expression".into(),
            });
        }

        let (_, raw) = all_consuming(disjunction)
            .parse(expr)
            .map_err(|e| SkysliceError::InvalidConstraint {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        let resolved = Expr::resolve(raw, columns, expr)?;
        Ok(Constraint {
            key: resolved.to_string(),
            predicate: Predicate::Expr(resolved),
        })
    }

    /// Wrap a closure as a constraint. `name` only labels it: two closures with the same name
    /// keep distinct grouping keys.
    pub fn from_fn<F>(name: &str, predicate: F) -> Self
    where
        F: Fn(&Visit) -> bool + Send + Sync + 'static,
    {
        Constraint {
            key: format!("fn:{name}"),
            predicate: Predicate::Callable(Arc::new(predicate)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key under which bundles may share a partition: the canonical key of a parsed
    /// expression, the label plus the closure's address for a closure.
    pub fn group_key(&self) -> String {
        match &self.predicate {
            Predicate::Expr(_) => self.key.clone(),
            Predicate::Callable(f) => format!("{}@{:x}", self.key, Arc::as_ptr(f) as *const () as usize),
        }
    }

    pub fn matches(&self, visit: &Visit) -> bool {
        match &self.predicate {
            Predicate::Expr(expr) => expr.eval(visit),
            Predicate::Callable(f) => f(visit),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint").field("key", &self.key).finish()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
