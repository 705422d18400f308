/// Error types for message definition parsing
use thiserror::Error;

/// Definition parsing error
#[derive(Error, Debug)]
pub enum ParseError {
    /// Grammar error with location context
    #[error("Parse error at line {line}, column {column}: {excerpt}")]
    Syntax {
        /// Line number where the error occurred
        line: usize,
        /// Column number where the error occurred
        column: usize,
        /// Excerpt of the offending input or expectation summary
        excerpt: String,
    },

    /// Structurally valid input with unsupported or inconsistent content
    #[error("Invalid definition: {reason}")]
    Invalid {
        /// Description of the problem
        reason: String,
    },
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    /// Create an invalid-definition error
    #[must_use]
    pub fn invalid(reason: &str) -> Self {
        ParseError::Invalid {
            reason: reason.to_string(),
        }
    }

    /// Convert a pest error into a located syntax error
    pub(crate) fn from_pest<R: pest::RuleType>(err: &pest::error::Error<R>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos((line, column))
            | pest::error::LineColLocation::Span((line, column), _) => (line, column),
        };
        ParseError::Syntax {
            line,
            column,
            excerpt: err.line().to_string(),
        }
    }
}
