use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Interned id of a source file, assigned by the tokenizer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a token in its source file. Lines and columns are 1-based,
/// `offset` is the byte offset from the start of the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Span {
    pub const fn dummy() -> Self {
        Self {
            file: FileId(0),
            line: 0,
            column: 0,
            offset: 0,
        }
    }

    pub fn with_offset(&self, offset: usize) -> Self {
        Self {
            file: self.file,
            line: self.line,
            column: self.column + offset,
            offset: self.offset + offset,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 && self.column == 0 {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// A span resolved against the file table, suitable for error messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.file)
        } else {
            write!(
                f,
                "{}:{}:{} (offset {})",
                self.file, self.line, self.column, self.offset
            )
        }
    }
}

/// Every failure of a compile. None of them are recoverable: the first one
/// aborts the whole stylesheet.
#[derive(Debug, Error)]
pub enum LessError {
    #[error("{location}: {message}")]
    Parse { location: Location, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not valid UTF-8", .path.display())]
    Encoding { path: PathBuf },

    #[error("cyclic import: {}", format_chain(.chain))]
    CyclicImport { chain: Vec<PathBuf> },

    #[error("{location}: {message}")]
    Link { location: Location, message: String },

    #[error("{location}: {message}{}", format_selector(.selector))]
    Eval {
        location: Location,
        selector: Option<String>,
        message: String,
    },

    #[error("{location}: mixin expansion exceeded the maximum depth of {limit}")]
    RecursionLimit { location: Location, limit: usize },

    #[error("invalid options in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("failed to start the compiler thread: {0}")]
    Thread(#[source] io::Error),

    #[error("failed to serialize source map: {0}")]
    SourceMap(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LessError>;

impl LessError {
    /// Attach the selector being printed to an evaluation error that has none.
    pub fn in_selector(self, selector: &str) -> Self {
        match self {
            LessError::Eval {
                location,
                selector: None,
                message,
            } if !selector.is_empty() => LessError::Eval {
                location,
                selector: Some(selector.to_string()),
                message,
            },
            other => other,
        }
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_selector(selector: &Option<String>) -> String {
    selector
        .as_ref()
        .map(|s| format!(" (in `{}`)", s))
        .unwrap_or_default()
}

/// Errors of the pure value evaluators (math, colors, functions). The
/// resolver lifts them into [`LessError::Eval`] with a location.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("incompatible units: {left} {op} {right}")]
    IncompatibleUnits {
        op: char,
        left: String,
        right: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("invalid color `{0}`")]
    InvalidColor(String),

    #[error("{function}() expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("{function}(): {message}")]
    Argument { function: String, message: String },
}

impl ValueError {
    pub fn argument(function: &str, message: impl Into<String>) -> Self {
        ValueError::Argument {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn arity(function: &str, expected: &str, got: usize) -> Self {
        ValueError::Arity {
            function: function.to_string(),
            expected: expected.to_string(),
            got,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_display() {
        let span = Span {
            file: FileId(0),
            line: 3,
            column: 7,
            offset: 40,
        };
        assert_eq!(span.to_string(), "3:7");
        assert_eq!(Span::dummy().to_string(), "<unknown>");
        assert_eq!(span.with_offset(2).column, 9);
        assert_eq!(span.with_offset(2).offset, 42);
    }

    #[test]
    fn eval_error_mentions_selector() {
        let err = LessError::Eval {
            location: Location {
                file: "a.less".into(),
                line: 2,
                column: 5,
                offset: 12,
            },
            selector: None,
            message: "unknown mixin `.m`".into(),
        }
        .in_selector(".btn");
        assert_eq!(
            err.to_string(),
            "a.less:2:5 (offset 12): unknown mixin `.m` (in `.btn`)"
        );
    }

    #[test]
    fn cyclic_import_lists_chain() {
        let err = LessError::CyclicImport {
            chain: vec!["a.less".into(), "b.less".into(), "a.less".into()],
        };
        assert_eq!(err.to_string(), "cyclic import: a.less -> b.less -> a.less");
    }
}
