//! PQL grammar.
//!
//! ```text
//! Statement := Expression ('LIMIT' Int)? ('OFFSET' Int)? ('ORDER' 'BY' '.'Ident)? ('ASC'|'DSC'|'DESC')?
//! Expression := '(' Expression ('AND'|'OR') Expression ')' | '(' '.'Ident Op Value ')'
//! Op := '==' | '!=' | '=~' | '!~'
//! Value := '.'Ident | 'm/' Regexp '/' Flags | String
//! Selection := 'SELECT' Selecting (',' Selecting)* ('WITHIN' Statement)?
//! Selecting := ('RANDOM' | 'COUNT' | 'DISTINCT')* '.'Ident
//! ```
//! Keywords are case-insensitive; attribute names are normalised to camelCase.

use std::collections::HashSet;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{map, recognize, value};
use nom::sequence::pair;
use nom::{IResult, Parser};
use crate::core::error::ParseError;
use crate::core::utils::to_camel_case;
use crate::query::ast::{
    Condition, ConditionKind, Expression, Operand, Operation, Operator, RegexLiteral, Selecting, Selection,
    SortDir, Statement,
};

const REGEX_FLAGS: &str = "imsxU";

/// Error carried through the combinators: where it happened and why.
#[derive(Debug, Clone, PartialEq)]
pub struct PqlError<'a> {
    pub input: &'a str,
    pub message: String,
}

impl<'a> nom::error::ParseError<&'a str> for PqlError<'a> {
    fn from_error_kind(input: &'a str, kind: nom::error::ErrorKind) -> Self {
        PqlError { input, message: format!("unexpected input ({:?})", kind) }
    }

    fn append(_input: &'a str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, O> = IResult<&'a str, O, PqlError<'a>>;

fn fail<'a, O>(input: &'a str, message: impl Into<String>) -> PResult<'a, O> {
    Err(nom::Err::Failure(PqlError { input, message: message.into() }))
}

/// Compiles a PQL statement.
pub fn parse_statement(query: &str) -> Result<Statement, ParseError> {
    finish(query, statement(query))
}

/// Compiles a `SELECT` projection.
pub fn parse_selection(query: &str) -> Result<Selection, ParseError> {
    finish(query, selection(query))
}

fn finish<O>(query: &str, result: PResult<'_, O>) -> Result<O, ParseError> {
    match result {
        Ok((rest, parsed)) => {
            let (rest, _) = ws(rest).map_err(|e| to_parse_error(query, e))?;
            if !rest.is_empty() {
                return Err(ParseError::new(query, column(query, rest), "unexpected trailing input"));
            }
            Ok(parsed)
        }
        Err(e) => Err(to_parse_error(query, e)),
    }
}

fn to_parse_error(query: &str, err: nom::Err<PqlError<'_>>) -> ParseError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => ParseError::new(query, column(query, e.input), e.message),
        nom::Err::Incomplete(_) => ParseError::new(query, query.chars().count() + 1, "unexpected end of query"),
    }
}

/// 1-based character column of `rest` inside `query`.
fn column(query: &str, rest: &str) -> usize {
    let consumed = query.len().saturating_sub(rest.len());
    query.get(..consumed).map(|s| s.chars().count()).unwrap_or(consumed) + 1
}

fn ws(input: &str) -> PResult<'_, &str> {
    multispace0(input)
}

fn symbol(input: &str, c: char) -> PResult<'_, char> {
    char(c)(input)
}

/// Case-insensitive keyword that is not the prefix of a longer word.
fn keyword<'a>(kw: &'static str) -> impl Fn(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let matched: PResult<'a, &'a str> = tag_no_case(kw)(input);
        let (rest, matched) = matched?;
        if rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            return Err(nom::Err::Error(PqlError { input, message: format!("expected {}", kw) }));
        }
        Ok((rest, matched))
    }
}

fn ident(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    ))
    .parse(input)
}

/// `.Ident`, normalised.
fn attribute(input: &str) -> PResult<'_, String> {
    let (rest, _) = match symbol(input, '.') {
        Ok(ok) => ok,
        Err(_) => return fail(input, "expected attribute reference like .Name"),
    };
    match ident(rest) {
        Ok((rest, name)) => Ok((rest, to_camel_case(name))),
        Err(_) => fail(rest, "expected attribute name after '.'"),
    }
}

fn count(input: &str) -> PResult<'_, usize> {
    let digits: PResult<'_, &str> = digit1(input);
    let (rest, digits) = match digits {
        Ok(ok) => ok,
        Err(_) => return fail(input, "expected a non-negative integer"),
    };
    match digits.parse::<usize>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => fail(input, "integer out of range"),
    }
}

fn operator(input: &str) -> PResult<'_, Operator> {
    let parsed: PResult<'_, Operator> = alt((
        value(Operator::Eq, tag("==")),
        value(Operator::Ne, tag("!=")),
        value(Operator::Match, tag("=~")),
        value(Operator::NotMatch, tag("!~")),
    ))
    .parse(input);
    match parsed {
        Ok(ok) => Ok(ok),
        Err(_) => fail(input, "expected one of ==, !=, =~, !~"),
    }
}

fn string_literal(input: &str) -> PResult<'_, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q)) if q == '"' || q == '\'' => q,
        _ => return Err(nom::Err::Error(PqlError { input, message: "expected string".to_string() })),
    };
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&input[i + c.len_utf8()..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, c)) if c == '\\' || c == '"' || c == '\'' => out.push(c),
                Some((j, _)) => return fail(&input[j..], "unknown escape sequence"),
                None => break,
            },
            c => out.push(c),
        }
    }
    fail(input, "unterminated string")
}

fn regex_literal(input: &str) -> PResult<'_, RegexLiteral> {
    let opened: PResult<'_, &str> = tag("m/")(input);
    let (body, _) = opened?;
    let mut pattern = String::new();
    let mut chars = body.char_indices();
    let mut end = None;
    while let Some((i, c)) = chars.next() {
        match c {
            '/' => {
                end = Some(i + 1);
                break;
            }
            '\\' => match chars.next() {
                Some((_, '/')) => pattern.push('/'),
                Some((_, next)) => {
                    pattern.push('\\');
                    pattern.push(next);
                }
                None => pattern.push('\\'),
            },
            c => pattern.push(c),
        }
    }
    let Some(end) = end else {
        return fail(input, "unterminated regular expression");
    };

    let flags: PResult<'_, &str> = take_while(|c: char| c.is_ascii_alphabetic())(&body[end..]);
    let (rest, flags) = flags?;
    if let Some(bad) = flags.chars().find(|c| !REGEX_FLAGS.contains(*c)) {
        return fail(&body[end..], format!("unknown regex flag '{}'", bad));
    }
    let literal = RegexLiteral { pattern, flags: flags.to_string() };
    if let Err(err) = regex::Regex::new(&literal.source()) {
        return fail(input, format!("invalid regular expression: {}", err));
    }
    Ok((rest, literal))
}

fn operand(input: &str) -> PResult<'_, Operand> {
    if input.starts_with('.') {
        return map(attribute, Operand::Reference).parse(input);
    }
    if input.starts_with("m/") {
        return map(regex_literal, Operand::Regex).parse(input);
    }
    match string_literal(input) {
        Ok((rest, text)) => Ok((rest, Operand::Literal(text))),
        Err(nom::Err::Error(_)) => fail(input, "expected .Name, m/regexp/ or a quoted string"),
        Err(e) => Err(e),
    }
}

fn expression(input: &str) -> PResult<'_, Expression> {
    let (rest, _) = match symbol(input, '(') {
        Ok(ok) => ok,
        Err(_) => return fail(input, "expected '('"),
    };
    let (rest, _) = ws(rest)?;

    let (rest, expr) = if rest.starts_with('(') {
        let (rest, left) = expression(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, kind) = match alt((
            value(ConditionKind::And, keyword("AND")),
            value(ConditionKind::Or, keyword("OR")),
        ))
        .parse(rest)
        {
            Ok(ok) => ok,
            Err(_) => return fail(rest, "expected AND or OR"),
        };
        let (rest, _) = ws(rest)?;
        let (rest, right) = expression(rest)?;
        (rest, Expression::Condition(Box::new(Condition { kind, left, right })))
    } else {
        let (rest, left) = attribute(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, op) = operator(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, right) = operand(rest)?;
        (rest, Expression::Operation(Operation { left, op, right }))
    };

    let (rest, _) = ws(rest)?;
    match symbol(rest, ')') {
        Ok((rest, _)) => Ok((rest, expr)),
        Err(_) => fail(rest, "expected ')'"),
    }
}

fn clause<'a, O>(
    input: &'a str,
    kw: &'static str,
    body: impl Fn(&'a str) -> PResult<'a, O>,
) -> PResult<'a, Option<O>> {
    let (after_ws, _) = ws(input)?;
    match keyword(kw)(after_ws) {
        Ok((rest, _)) => {
            let (rest, _) = ws(rest)?;
            let (rest, parsed) = body(rest)?;
            Ok((rest, Some(parsed)))
        }
        Err(_) => Ok((input, None)),
    }
}

fn order_by(input: &str) -> PResult<'_, String> {
    let (rest, _) = match keyword("BY")(input) {
        Ok(ok) => ok,
        Err(_) => return fail(input, "expected BY after ORDER"),
    };
    let (rest, _) = ws(rest)?;
    attribute(rest)
}

fn sort_dir(input: &str) -> PResult<'_, Option<SortDir>> {
    let (after_ws, _) = ws(input)?;
    let parsed = alt((
        value(SortDir::Asc, keyword("ASC")),
        value(SortDir::Desc, keyword("DESC")),
        value(SortDir::Desc, keyword("DSC")),
    ))
    .parse(after_ws);
    match parsed {
        Ok((rest, dir)) => Ok((rest, Some(dir))),
        Err(_) => Ok((input, None)),
    }
}

fn statement(input: &str) -> PResult<'_, Statement> {
    let (rest, _) = ws(input)?;
    let (rest, expression) = expression(rest)?;
    let (rest, limit) = clause(rest, "LIMIT", count)?;
    let (rest, offset) = clause(rest, "OFFSET", count)?;
    let (rest, order_by) = clause(rest, "ORDER", order_by)?;
    let (rest, dir) = sort_dir(rest)?;

    let mut statement = Statement::new(expression);
    statement.limit = limit;
    statement.offset = offset;
    statement.order_by = order_by;
    statement.sort_dir = dir.unwrap_or_default();
    statement.refresh_context_keys();
    Ok((rest, statement))
}

fn selecting(input: &str) -> PResult<'_, Selecting> {
    let mut term = Selecting::plain("");
    let mut rest = input;
    loop {
        let (after_ws, _) = ws(rest)?;
        if let Ok((next, _)) = keyword("RANDOM")(after_ws) {
            term.random = true;
            rest = next;
        } else if let Ok((next, _)) = keyword("COUNT")(after_ws) {
            term.count = true;
            rest = next;
        } else if let Ok((next, _)) = keyword("DISTINCT")(after_ws) {
            term.distinct = true;
            rest = next;
        } else {
            rest = after_ws;
            break;
        }
    }
    let (rest, key) = attribute(rest)?;
    term.key = key;
    Ok((rest, term))
}

fn selection(input: &str) -> PResult<'_, Selection> {
    let (rest, _) = ws(input)?;
    let (rest, _) = match keyword("SELECT")(rest) {
        Ok(ok) => ok,
        Err(_) => return fail(rest, "expected SELECT"),
    };

    let mut terms = Vec::new();
    let mut seen = HashSet::new();
    let mut rest = rest;
    loop {
        let (after_ws, _) = ws(rest)?;
        let (next, term) = selecting(after_ws)?;
        if !seen.insert(term.key.clone()) {
            return fail(after_ws, format!("attribute .{} selected twice", term.key));
        }
        terms.push(term);
        let (after_ws, _) = ws(next)?;
        match symbol(after_ws, ',') {
            Ok((next, _)) => rest = next,
            Err(_) => {
                rest = next;
                break;
            }
        }
    }

    let (rest, within) = clause(rest, "WITHIN", statement)?;
    Ok((rest, Selection { terms, within }))
}
