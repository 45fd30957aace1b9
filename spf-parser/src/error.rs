use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;

/// The result type used in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("{0}")]
    IO(String),

    #[error(transparent)]
    Validation(#[from] CollectedValidationErrors),

    #[error("Instance with id {0} not found")]
    InstanceNotFound(i64),

    #[error("Duplicate definition for id {0}")]
    DuplicateDefinition(i64),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(format!("{}", error))
    }
}

impl From<Diagnostic> for Error {
    fn from(diagnostic: Diagnostic) -> Self {
        Error::Validation(CollectedValidationErrors {
            errors: vec![diagnostic],
        })
    }
}

/// A single validation finding with its source location data.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Syntax(SyntaxError),
    DuplicateName(DuplicateNameError),
    HeaderField(HeaderFieldError),
    MissingHeader(MissingHeaderError),
}

impl Diagnostic {
    /// Returns the JSON object for this diagnostic as emitted by `--json`.
    pub fn to_json(&self, with_message: bool) -> Value {
        match self {
            Diagnostic::Syntax(e) => e.to_json(with_message),
            Diagnostic::DuplicateName(e) => e.to_json(with_message),
            Diagnostic::HeaderField(e) => e.to_json(with_message),
            Diagnostic::MissingHeader(e) => e.to_json(with_message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Syntax(e) => e.fmt(f),
            Diagnostic::DuplicateName(e) => e.fmt(f),
            Diagnostic::HeaderField(e) => e.fmt(f),
            Diagnostic::MissingHeader(e) => e.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A well-formed token the recognizer did not accept.
    UnexpectedToken,
    /// A character the lexer could not tokenize.
    UnexpectedCharacter,
}

/// A failure of the recognizer, carrying the offending token and the sorted
/// set of terminal names that would have been accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub lineno: u32,
    pub column: u32,
    pub found_type: String,
    pub found_value: String,
    pub expected: Vec<String>,
    /// Text of the source line the error occurred on.
    pub line: String,
}

impl SyntaxError {
    pub fn to_json(&self, with_message: bool) -> Value {
        let mut obj = json!({
            "type": match self.kind {
                SyntaxErrorKind::UnexpectedToken => "unexpected_token",
                SyntaxErrorKind::UnexpectedCharacter => "unexpected_character",
            },
            "lineno": self.lineno,
            "column": self.column,
            "found_type": self.found_type,
            "found_value": self.found_value,
            "expected": self.expected,
            "line": self.line,
        });
        if with_message {
            obj["message"] = Value::String(self.to_string());
        }
        obj
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "On line {} column {}:", self.lineno, self.column)?;
        writeln!(
            f,
            "Unexpected {} ('{}')",
            self.found_type, self.found_value
        )?;
        if !self.expected.is_empty() {
            if let [single] = self.expected.as_slice() {
                writeln!(f, "Expecting {}", single)?;
            } else {
                writeln!(f, "Expecting one of {}", self.expected.join(" "))?;
            }
        }
        writeln!(f, "{:05} | {}", self.lineno, self.line)?;
        write!(f, "        {}^", " ".repeat(self.column as usize - 1))
    }
}

/// Two entity records declared with the same `#id`.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateNameError {
    pub name: i64,
    /// Lines of the first declaration and of the duplicate.
    pub lines: (u32, u32),
    /// Text of the first declaration's source line.
    pub line: String,
}

impl DuplicateNameError {
    pub fn to_json(&self, with_message: bool) -> Value {
        let mut obj = json!({
            "type": "duplicate_name",
            "name": self.name,
            "lineno": self.lines.0,
            "line": self.line,
        });
        if with_message {
            obj["message"] = Value::String(self.to_string());
        }
        obj
    }
}

impl fmt::Display for DuplicateNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "On line {}:", self.lines.0)?;
        writeln!(f, "Duplicate instance name #{}", self.name)?;
        writeln!(f, "{:05} | {}", self.lines.0, self.line)?;
        write!(f, "        {}", "^".repeat(self.line.trim_end().len()))
    }
}

/// Parameter-count mismatch in one of the three HEADER records.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFieldError {
    pub field: String,
    pub found: usize,
    pub expected: usize,
}

impl HeaderFieldError {
    pub fn to_json(&self, with_message: bool) -> Value {
        let mut obj = json!({
            "type": "invalid_header_field",
            "field": self.field,
            "expected_field_count": self.expected,
            "actual_field_count": self.found,
        });
        if with_message {
            obj["message"] = Value::String(self.to_string());
        }
        obj
    }
}

impl fmt::Display for HeaderFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid number of parameters for HEADER field '{}'. Expected {}, found {}.",
            self.field, self.expected, self.found
        )
    }
}

/// The HEADER slice of a header-only parse found no HEADER section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingHeaderError;

impl MissingHeaderError {
    pub fn to_json(&self, with_message: bool) -> Value {
        let mut obj = json!({
            "type": "missing_header_section",
        });
        if with_message {
            obj["message"] = Value::String(self.to_string());
        }
        obj
    }
}

impl fmt::Display for MissingHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No HEADER section found in file.")
    }
}

/// The composite raised at the end of a failed pass, carrying every
/// diagnostic in the order it was collected.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedValidationErrors {
    pub errors: Vec<Diagnostic>,
}

impl CollectedValidationErrors {
    /// Renders the diagnostics as the JSON array emitted by `--json`.
    pub fn to_json(&self, with_message: bool) -> Value {
        Value::Array(
            self.errors
                .iter()
                .map(|e| e.to_json(with_message))
                .collect(),
        )
    }
}

impl fmt::Display for CollectedValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} validation error(s) collected:", self.errors.len())?;
        let rendered: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", rendered.join("\n\n"))
    }
}

impl std::error::Error for CollectedValidationErrors {}

/// Determines whether the first diagnostic aborts the pass or whether all
/// diagnostics are gathered and raised together at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectMode {
    FailFast,
    #[default]
    CollectAll,
}

/// Accumulates validation diagnostics during a single pass.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    mode: CollectMode,
    errors: Vec<Diagnostic>,
}

impl ErrorCollector {
    pub fn new(mode: CollectMode) -> Self {
        ErrorCollector {
            mode,
            errors: Vec::new(),
        }
    }

    /// Records a diagnostic. In fail-fast mode this returns the error
    /// immediately instead.
    pub fn add(&mut self, diagnostic: Diagnostic) -> Result<()> {
        self.errors.push(diagnostic);
        match self.mode {
            CollectMode::FailFast => self.finish(),
            CollectMode::CollectAll => Ok(()),
        }
    }

    /// Turns a fatal diagnostic into the terminating error, together with
    /// everything collected so far.
    pub fn fatal(&mut self, diagnostic: Diagnostic) -> Error {
        self.errors.push(diagnostic);
        Error::Validation(CollectedValidationErrors {
            errors: std::mem::take(&mut self.errors),
        })
    }

    /// Raises the collected diagnostics, if any.
    pub fn finish(&mut self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(CollectedValidationErrors {
                errors: std::mem::take(&mut self.errors),
            }))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
