use std::fmt;

/// Errors produced when parsing policy text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
    line: usize,
    column: usize,
}

impl ParseError {
    /// Locate `offset` in `source` as a 1-based line and column.
    pub(crate) fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let column = before.chars().rev().take_while(|&c| c != '\n').count() + 1;
        let mut message = message.into();
        if message.is_empty() {
            message = "unexpected input".to_owned();
        }
        Self {
            message,
            line,
            column,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at {}:{}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError::at("owner(1, 2)", 11, "expected `;`");
        assert_eq!(err.to_string(), "parse error at 1:12: expected `;`");
    }

    #[test]
    fn location_counts_lines_and_columns() {
        let source = "owner(1, 2);\nallow(x) if ;";
        let err = ParseError::at(source, source.len() - 1, "expected goal");
        assert_eq!(err.line(), 2);
        assert_eq!(err.column(), 13);
        assert_eq!(err.message(), "expected goal");
    }

    #[test]
    fn empty_message_gets_a_default() {
        let err = ParseError::at("", 0, "");
        assert_eq!(err.message(), "unexpected input");
        assert_eq!((err.line(), err.column()), (1, 1));
    }
}
