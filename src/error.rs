use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the lens engine and the field registry.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error{}: {message}", fmt_origin(.path, .line, .col))]
    Parse {
        path: Option<PathBuf>,
        line: Option<usize>,
        col: Option<usize>,
        message: String,
    },

    #[error("{what}: not found")]
    NotFound { what: String },

    #[error("{what}: got {count} matches, expected one")]
    TooManyResults { what: String, count: usize },

    #[error("position {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("unsupported node type for {what}: {kind}")]
    TypeUnsupported { what: String, kind: String },

    #[error("values pointed by field {field:?} are not unique ({values:?})")]
    ValuesNotUnique { field: String, values: Vec<String> },

    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("edit batch already committed")]
    AlreadyCommitted,

    #[error("{what}: {count} candidates match, expected one")]
    Ambiguous { what: String, count: usize },

    #[error("lens {0:?} not defined")]
    UnknownLens(String),

    #[error("{0}")]
    Multi(Errors),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            path: None,
            line: None,
            col: None,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Attach a file path to a parse error that lacks one.
    pub fn with_path(self, p: &std::path::Path) -> Self {
        match self {
            Error::Parse {
                path: None,
                line,
                col,
                message,
            } => Error::Parse {
                path: Some(p.to_path_buf()),
                line,
                col,
                message,
            },
            other => other,
        }
    }

    /// True if this error, or any error inside a `Multi`, is `ValuesNotUnique`.
    ///
    /// Read-only commands use this to downgrade the lint failure to a warning.
    pub fn is_values_not_unique(&self) -> bool {
        match self {
            Error::ValuesNotUnique { .. } => true,
            Error::Multi(errs) => errs.0.iter().any(Error::is_values_not_unique),
            _ => false,
        }
    }
}

fn fmt_origin(path: &Option<PathBuf>, line: &Option<usize>, col: &Option<usize>) -> String {
    let mut s = String::new();
    if let Some(p) = path {
        s.push_str(&format!(" in {}", p.display()));
    }
    if let (Some(l), Some(c)) = (line, col) {
        s.push_str(&format!(" at {l}:{c}"));
    }
    s
}

/// A collection of errors reported together, so that a lint or values run
/// surfaces every problem at once instead of stopping at the first.
#[derive(Debug, Default)]
pub struct Errors(pub Vec<Error>);

impl Errors {
    pub fn new() -> Self {
        Errors(Vec::new())
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse into a single result: ok when empty, the sole error when
    /// there is exactly one, a `Multi` otherwise.
    pub fn into_result(mut self) -> Result<(), Error> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(Error::Multi(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
