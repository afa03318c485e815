use std::fmt::Display;

/// Where and why a template failed to parse, possibly wrapping a more specific cause
#[derive(Debug, PartialEq)]
pub struct ParseError<'t> {
    message: String,
    template: &'t str,
    at: &'t str,
    cause: Option<Box<ParseError<'t>>>,
}

impl Display for ParseError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let line_number = self.line_number();
        let line = self.template.lines().nth(line_number - 1);
        writeln!(f, "{} (line {line_number})", self.message)?;
        if let Some(line) = line {
            let column = self.position().saturating_sub(position_in(self.template, line));
            writeln!(f, "  | {line}")?;
            writeln!(f, "  | {:column$}^", "")?;
        }
        match &self.cause {
            Some(cause) => write!(f, "{cause}"),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ParseError<'_> {}

impl<'t> ParseError<'t> {
    /// Constructs an error for the position `at`, which must be a slice of `template`
    pub fn new(
        message: String,
        template: &'t str,
        at: &'t str,
        cause: Option<Box<ParseError<'t>>>,
    ) -> ParseError<'t> {
        ParseError {
            message,
            template,
            at,
            cause,
        }
    }

    /// The line (counted from 1) the error occurred on
    pub fn line_number(&self) -> usize {
        let position = self.position().min(self.template.len());
        1 + self.template[..position].matches('\n').count()
    }

    fn position(&self) -> usize {
        position_in(self.template, self.at)
    }
}

fn position_in(template: &str, part: &str) -> usize {
    (part.as_ptr() as usize).saturating_sub(template.as_ptr() as usize)
}
