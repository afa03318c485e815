//! LDAP search filters
//!
//! Supports the subset provisioning relies on: equality `(a=v)`, presence `(a=*)`,
//! substrings `(a=pre*mid*suf)`, and the `&`, `|` and `!` combinators. A single bare
//! item without parentheses (`a=v`) is also accepted.
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, cut, map},
    error::{context, VerboseError},
    multi::many1,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};

use crate::{DirectoryError, Entry};

type Res<T, U> = IResult<T, U, VerboseError<T>>;

/// A parsed search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every sub-filter matches
    And(Vec<Filter>),
    /// Any sub-filter matches
    Or(Vec<Filter>),
    /// The sub-filter does not match
    Not(Box<Filter>),
    /// The attribute has at least one value
    Present(String),
    /// The attribute has the value (ignoring case)
    Equal(String, String),
    /// The attribute has a value matching the wildcard pattern
    Substring {
        /// The attribute to test
        attribute: String,
        /// The pieces between `*` wildcards, including empty leading or trailing pieces
        pieces: Vec<String>,
    },
}

impl Filter {
    /// Parses a filter from its string form
    pub fn parse(text: &str) -> Result<Filter, DirectoryError> {
        let text = text.trim();
        all_consuming(alt((parenthesized, item)))(text)
            .map(|(_, filter)| filter)
            .map_err(|_| DirectoryError::Filter(text.to_owned()))
    }

    /// Tests the filter against an entry
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::Present(attribute) => !entry.values_for(attribute).is_empty(),
            Filter::Equal(attribute, value) => entry
                .values_for(attribute)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Filter::Substring { attribute, pieces } => entry
                .values_for(attribute)
                .iter()
                .any(|v| wildcard_match(&v.to_ascii_lowercase(), pieces)),
        }
    }
}

/// Matches `pieces` (split on `*`) against `value`, all in lower case
fn wildcard_match(value: &str, pieces: &[String]) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return true;
    };
    let Some(mut remainder) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remainder.is_empty();
    };
    for piece in middle {
        match remainder.find(piece.as_str()) {
            Some(index) => remainder = &remainder[index + piece.len()..],
            None => return false,
        }
    }
    remainder.ends_with(last.as_str())
}

fn parenthesized(s: &str) -> Res<&str, Filter> {
    delimited(
        preceded(multispace0, char('(')),
        cut(alt((
            map(preceded(char('&'), cut(many1(parenthesized))), Filter::And),
            map(preceded(char('|'), cut(many1(parenthesized))), Filter::Or),
            map(preceded(char('!'), cut(parenthesized)), |f| {
                Filter::Not(Box::new(f))
            }),
            item,
        ))),
        context("closing ')'", preceded(multispace0, char(')'))),
    )(s)
}

fn item(s: &str) -> Res<&str, Filter> {
    map(
        separated_pair(attribute, char('='), assertion_value),
        |(attribute, value)| {
            let attribute = attribute.to_owned();
            if value == "*" {
                Filter::Present(attribute)
            } else if value.contains('*') {
                Filter::Substring {
                    attribute,
                    pieces: value
                        .split('*')
                        .map(|piece| unescape(piece).to_ascii_lowercase())
                        .collect(),
                }
            } else {
                Filter::Equal(attribute, unescape(value))
            }
        },
    )(s)
}

fn attribute(s: &str) -> Res<&str, &str> {
    context(
        "attribute name",
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == ';' || c == '.'),
    )(s)
}

fn assertion_value(s: &str) -> Res<&str, &str> {
    take_while(|c: char| c != '(' && c != ')')(s)
}

/// Resolves `\XX` hex escapes in an assertion value
fn unescape(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' {
            let hex = value.get(index + 1..index + 3);
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
