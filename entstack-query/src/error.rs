use entstack_store::StoreError;
use std::fmt;

pub use entstack_types::Span;

/// Errors raised while running a query program
///
/// Every variant aborts the current run. Word-level errors carry the word
/// name and a rendering of the top of the stack at the time of failure.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Component def not found: {0}")]
    DefNotFound(String),

    #[error("Invalid arguments for '{word}': {message} [stack: {stack}]")]
    InvalidArguments {
        word: String,
        message: String,
        stack: String,
    },

    #[error("Stack underflow in '{word}'")]
    StackUnderflow { word: String },

    #[error("Runaway loop: exceeded {limit} iterations")]
    RunawayLoop { limit: usize },

    #[error("Nesting too deep: exceeded {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("No free {0} ids left")]
    IdsExhausted(&'static str),

    #[error("Incompatible types for '{word}': {left} and {right}")]
    IncompatibleTypes {
        word: String,
        left: String,
        right: String,
    },

    #[error("Schema conflict: {uri} is already registered with different content (def {existing})")]
    SchemaConflict { uri: String, existing: u16 },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Lexer error at {span:?}: {message}")]
    Lexer { span: Span, message: String },

    #[error("Unclosed scope opened at {span:?}")]
    UnclosedScope { span: Span },

    #[error("Unexpected close at {span:?}")]
    UnexpectedClose { span: Span },
}

pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Source span, for errors raised while reading program text
    pub fn span(&self) -> Option<Span> {
        match self {
            QueryError::Lexer { span, .. }
            | QueryError::UnclosedScope { span }
            | QueryError::UnexpectedClose { span } => Some(*span),
            _ => None,
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DefNotFound(ident) => QueryError::DefNotFound(ident),
            StoreError::SchemaConflict { uri, existing } => QueryError::SchemaConflict { uri, existing },
            StoreError::BackendUnavailable(message) => QueryError::BackendUnavailable(message),
            StoreError::InvalidComponent { id, message } => QueryError::InvalidArguments {
                word: "+".to_string(),
                message: format!("component {}: {}", id, message),
                stack: String::new(),
            },
            StoreError::IdsExhausted(kind) => QueryError::IdsExhausted(kind),
        }
    }
}

/// Display context for errors that point into program text
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a QueryError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a QueryError) -> Self {
        Self { source, error }
    }

    fn start(&self) -> Option<usize> {
        self.error.span().map(|span| span.start.min(self.source.len()))
    }

    /// The source line containing the error
    pub fn source_line(&self) -> Option<&'a str> {
        let start = self.start()?;
        let line_start = self.source[..start].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        let line_end = self.source[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.source.len());
        Some(&self.source[line_start..line_end])
    }

    /// Line and column numbers (1-indexed)
    pub fn line_col(&self) -> Option<(usize, usize)> {
        let start = self.start()?;
        let line = self.source[..start].matches('\n').count() + 1;
        let line_start = self.source[..start].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        Some((line, start - line_start + 1))
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some((line, col)), Some(source_line), Some(span)) =
            (self.line_col(), self.source_line(), self.error.span())
        else {
            return writeln!(f, "Error: {}", self.error);
        };

        writeln!(f, "Error at line {}, column {}:", line, col)?;
        writeln!(f, "  {}", self.error)?;
        writeln!(f)?;
        writeln!(f, "  {}", source_line)?;
        let col_start = col - 1;
        let width = span.len().min(source_line.len().saturating_sub(col_start)).max(1);
        writeln!(f, "  {}{}", " ".repeat(col_start), "^".repeat(width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_points_at_span() {
        let source = "1 2\n[3 4";
        let err = QueryError::UnclosedScope { span: Span::new(4, 5) };
        let ctx = ErrorContext::new(source, &err);
        assert_eq!(ctx.line_col(), Some((2, 1)));
        assert_eq!(ctx.source_line(), Some("[3 4"));
        assert_eq!(
            ctx.to_string(),
            "Error at line 2, column 1:\n  Unclosed scope opened at Span { start: 4, end: 5 }\n\n  [3 4\n  ^\n"
        );
    }

    #[test]
    fn test_context_without_span() {
        let err = QueryError::RunawayLoop { limit: 10 };
        let ctx = ErrorContext::new("[true] loop", &err);
        assert_eq!(ctx.line_col(), None);
        assert_eq!(ctx.to_string(), "Error: Runaway loop: exceeded 10 iterations\n");
    }

    #[test]
    fn test_store_errors_convert() {
        let err: QueryError = StoreError::DefNotFound("/component/missing".into()).into();
        assert!(matches!(err, QueryError::DefNotFound(ref uri) if uri == "/component/missing"));
    }
}
