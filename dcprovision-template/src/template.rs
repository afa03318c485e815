use std::fmt::Display;

use crate::text::{parse_tokens, ParseError};

/// A named body of text made from one or more [`Token`]s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template<'t> {
    name: &'t str,
    tokens: Vec<Token<'t>>,
}

impl<'t> Template<'t> {
    /// Parses the given text into a template, naming it for use in error messages
    pub fn parse(name: &'t str, text: &'t str) -> Result<Self, ParseError<'t>> {
        Ok(Template {
            name,
            tokens: parse_tokens(text)?,
        })
    }

    /// The name the template was loaded under (usually its file name)
    pub fn name(&self) -> &'t str {
        self.name
    }

    /// Provides access to the slice of tokens that make up this template
    pub fn tokens(&self) -> &[Token<'t>] {
        &self.tokens[..]
    }
}

impl Display for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for token in self.tokens.iter() {
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// Part of a [`Template`]; a constant string, or a placeholder for later substitution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Token<'t> {
    /// A constant string of plain text
    Text(&'t str),
    /// The name of a variable
    Variable(Identifier<'t>),
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Text(s) => f.write_str(s),
            Token::Variable(v) => write!(f, "${{{v}}}"),
        }
    }
}

/// The name given to a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier<'t>(&'t str);

impl<'t> Identifier<'t> {
    /// Creates a new Identifier from the given string
    pub fn new(s: &'t str) -> Self {
        Identifier(s)
    }

    /// Returns a reference to the underlying string
    pub fn value(&self) -> &'t str {
        self.0
    }
}

impl Display for Identifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> From<&'a str> for Identifier<'a> {
    fn from(s: &'a str) -> Self {
        Identifier::new(s)
    }
}
