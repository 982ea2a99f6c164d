//! A deliberately narrow filter-by expression language used by curation
//! rule matching (a rule's `filter_by` template and an action's injected
//! `filter_by`). Grounded on `query/ast.rs`'s `RangeQuery`/`TermQuery`
//! shape, restricted to AND-joined equality/numeric-comparison clauses;
//! OR is rejected outright rather than silently dropped.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alphanumeric1, char, digit1, multispace0};
use nom::combinator::{map, recognize, value};
use nom::multi::{many0_count, separated_list1};
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

use crate::core::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub comparator: Comparator,
    pub value: FilterValue,
}

/// An AND-joined conjunction of clauses; the only boolean structure this
/// subset supports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterExpr {
    pub clauses: Vec<FilterClause>,
}

impl FilterExpr {
    /// Every clause must hold against `lookup(field)` for the expression
    /// to match (empty expression matches everything).
    pub fn matches(&self, lookup: impl Fn(&str) -> Option<FilterValue>) -> bool {
        self.clauses.iter().all(|clause| match lookup(&clause.field) {
            Some(actual) => compare(&actual, clause.comparator, &clause.value),
            None => false,
        })
    }
}

fn compare(actual: &FilterValue, comparator: Comparator, expected: &FilterValue) -> bool {
    match (actual, expected) {
        (FilterValue::Int(a), FilterValue::Int(b)) => match comparator {
            Comparator::Eq => a == b,
            Comparator::Gt => a > b,
            Comparator::Gte => a >= b,
            Comparator::Lt => a < b,
            Comparator::Lte => a <= b,
        },
        (FilterValue::Text(a), FilterValue::Text(b)) => comparator == Comparator::Eq && a == b,
        _ => false,
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alphanumeric1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn comparator(input: &str) -> IResult<&str, Comparator> {
    alt((
        value(Comparator::Gte, tag(":>=")),
        value(Comparator::Lte, tag(":<=")),
        value(Comparator::Gt, tag(":>")),
        value(Comparator::Lt, tag(":<")),
        value(Comparator::Eq, tag(":=")),
    ))(input)
}

fn int_value(input: &str) -> IResult<&str, FilterValue> {
    map(recognize(pair(nom::combinator::opt(char('-')), digit1)), |s: &str| {
        FilterValue::Int(s.parse().unwrap_or_default())
    })(input)
}

fn quoted_text_value(input: &str) -> IResult<&str, FilterValue> {
    map(
        delimited(char('`'), nom::bytes::complete::take_while(|c| c != '`'), char('`')),
        |s: &str| FilterValue::Text(s.to_string()),
    )(input)
}

fn filter_value(input: &str) -> IResult<&str, FilterValue> {
    alt((int_value, quoted_text_value))(input)
}

fn clause(input: &str) -> IResult<&str, FilterClause> {
    let (input, _) = multispace0(input)?;
    let (input, field) = identifier(input)?;
    let (input, comparator) = comparator(input)?;
    let (input, value) = filter_value(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, FilterClause { field: field.to_string(), comparator, value }))
}

fn conjunction(input: &str) -> IResult<&str, Vec<FilterClause>> {
    separated_list1(preceded(multispace0, tag("&&")), clause)(input)
}

/// Parses a filter-by expression. Rejects `||` with a validation error —
/// this subset supports only an AND-joined conjunction of clauses.
pub fn parse(input: &str) -> Result<FilterExpr, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(FilterExpr::default());
    }
    if trimmed.contains("||") {
        return Err(Error::validation("filter_by only supports AND-joined clauses, not ||"));
    }
    let (remainder, clauses) = conjunction(trimmed)
        .map_err(|e| Error::validation(format!("invalid filter_by expression: {e}")))?;
    if !remainder.trim().is_empty() {
        return Err(Error::validation(format!("unexpected trailing input in filter_by: {remainder}")));
    }
    Ok(FilterExpr { clauses })
}
