//! Parsing of template text into [`Token`]s
//!
//! Placeholders take the form `${NAME}` where the name is made of ASCII letters, digits and
//! underscores. A lone `$` is ordinary text; a `${` that is not a well formed placeholder is an
//! error, since it would otherwise leak into the rendered output unsubstituted.
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    combinator::{all_consuming, cut, map, rest, verify},
    error::{context, VerboseError, VerboseErrorKind},
    multi::many0,
    sequence::{preceded, terminated},
    IResult,
};

use crate::template::{Identifier, Token};

mod error;
pub use error::ParseError;

type Res<T, U> = IResult<T, U, VerboseError<T>>;

/// Parses template text into its sequence of text and placeholder tokens
pub fn parse_tokens(text: &str) -> Result<Vec<Token<'_>>, ParseError<'_>> {
    let (_, tokens) = all_consuming(many0(token))(text).map_err(|e| {
        let e = match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
            nom::Err::Incomplete(_) => unreachable!("complete parsers only"),
        };
        let mut error = None;
        for (span, kind) in e.errors.iter().rev() {
            error = Some(ParseError::new(
                match kind {
                    VerboseErrorKind::Context(context) => format!("Expected {context}"),
                    VerboseErrorKind::Char(c) => format!("Expected '{c}'"),
                    VerboseErrorKind::Nom(p) => {
                        format!("Invalid token while looking for: {p:?}")
                    }
                },
                text,
                span,
                error.map(Box::new),
            ));
        }
        error.unwrap_or_else(|| ParseError::new("Unknown error".into(), text, text, None))
    })?;
    Ok(tokens)
}

fn token(s: &str) -> Res<&str, Token<'_>> {
    alt((map(placeholder, Token::Variable), map(plain_text, Token::Text)))(s)
}

fn placeholder(s: &str) -> Res<&str, Identifier<'_>> {
    preceded(
        tag("${"),
        cut(terminated(
            context("placeholder name", identifier),
            context("closing '}'", tag("}")),
        )),
    )(s)
}

fn identifier(s: &str) -> Res<&str, Identifier<'_>> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        Identifier::new,
    )(s)
}

fn plain_text(s: &str) -> Res<&str, &str> {
    verify(alt((take_until("${"), rest)), |text: &str| !text.is_empty())(s)
}
