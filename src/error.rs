use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the bulkedit library.
///
/// Configuration-class errors (`Config`, `InvalidPattern`, `InvalidExpression`,
/// `RuleResolution`) abort a run before any file is touched. The remaining
/// variants are scoped to a single file and are collected by the batch loop.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// No file matched any of the patterns.
    #[error("No files matched {patterns:?}. Check the pattern spelling and the start directory.")]
    NoMatch {
        /// Patterns that were tried
        patterns: Vec<String>,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Invalid file pattern.
    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The invalid pattern
        pattern: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Expression could not be compiled.
    #[error("Cannot compile expression `{expression}` at column {column}: {reason}")]
    InvalidExpression {
        /// Expression source
        expression: String,
        /// 1-based column of the offending token
        column: usize,
        /// Reason why it's invalid
        reason: String,
    },

    /// Function or executable could not be located or loaded.
    #[error("Cannot resolve rule '{reference}': {reason}")]
    RuleResolution {
        /// `module:function` reference or executable path
        reference: String,
        /// Diagnostic for the user
        reason: String,
    },

    /// A rule failed while processing a file.
    #[error("Rule failed on {file}{}: {message}", .line.map(|l| format!(":{l}")).unwrap_or_default())]
    RuleEvaluation {
        /// File being processed
        file: String,
        /// 1-based line number, when the failure is tied to one line
        line: Option<usize>,
        /// Error message
        message: String,
    },

    /// An executable rule exited unsuccessfully.
    #[error("'{program}' failed on {file} ({status}): {stderr}")]
    RuleExecution {
        /// Program that was run
        program: String,
        /// File being processed
        file: String,
        /// Exit status description
        status: String,
        /// Captured diagnostic output
        stderr: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Content could not be decoded with the configured encoding.
    #[error("Cannot decode '{path}' as {encoding}. File may be binary or use another encoding.")]
    Decode {
        /// Path to file with encoding issues
        path: PathBuf,
        /// Encoding that was tried
        encoding: String,
    },

    /// Every target of a batch failed.
    #[error("All {count} file(s) failed")]
    Batch {
        /// Number of errors
        count: usize,
        /// Collection of errors
        errors: Vec<Error>,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid pattern error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates a rule resolution error.
    #[must_use]
    pub fn resolution(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RuleResolution {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Creates a rule evaluation error.
    #[must_use]
    pub fn evaluation(file: impl Into<String>, line: Option<usize>, message: impl Into<String>) -> Self {
        Self::RuleEvaluation {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates an executable failure error.
    #[must_use]
    pub fn execution(
        program: impl Into<String>,
        file: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::RuleExecution {
            program: program.into(),
            file: file.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(path: impl Into<PathBuf>, encoding: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            encoding: encoding.into(),
        }
    }

    /// Creates a no-match error.
    #[must_use]
    pub fn no_match(patterns: &[String]) -> Self {
        Self::NoMatch {
            patterns: patterns.to_vec(),
        }
    }

    /// Combines per-file errors into a batch error.
    #[must_use]
    pub fn batch(errors: Vec<Self>) -> Self {
        let count = errors.len();
        Self::Batch { count, errors }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this error means the run cannot start.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidPattern { .. }
                | Self::InvalidExpression { .. }
                | Self::RuleResolution { .. }
        )
    }

    /// Returns true if this error is scoped to a single file.
    #[must_use]
    pub const fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::RuleEvaluation { .. }
                | Self::RuleExecution { .. }
                | Self::Io { .. }
                | Self::Decode { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config());
        assert!(!err.is_per_file());
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/test.txt", io_err);
        assert!(err.is_io());
        assert!(err.is_per_file());
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn test_evaluation_error_mentions_line() {
        let err = Error::evaluation("notes.txt", Some(7), "type mismatch");
        assert_eq!(err.to_string(), "Rule failed on notes.txt:7: type mismatch");

        let err = Error::evaluation("notes.txt", None, "boom");
        assert_eq!(err.to_string(), "Rule failed on notes.txt: boom");
    }

    #[test]
    fn test_batch_errors() {
        let errors = vec![
            Error::evaluation("a", None, "error 1"),
            Error::evaluation("b", None, "error 2"),
        ];
        let combined = Error::batch(errors);
        assert!(combined.to_string().contains("All 2 file(s) failed"));
    }

    #[test]
    fn test_no_match_lists_patterns() {
        let err = Error::no_match(&["*.rs".to_string()]);
        assert!(err.to_string().contains("*.rs"));
        assert!(!err.is_config());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::resolution("fix:main", "not registered");
        let cloned = err.clone();
        assert!(cloned.is_config());
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
