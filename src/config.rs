use crate::encoding::TextEncoding;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::text::Newline;
use std::path::PathBuf;

/// Configuration for a bulkedit run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// File patterns, or explicit file names when `literal_paths` is set
    pub patterns: Vec<String>,

    /// Treat `patterns` as file names and skip glob resolution
    pub literal_paths: bool,

    /// Directory to search for pattern matches
    pub start_dir: Option<PathBuf>,

    /// Directory levels to descend below the search root (`None` = default for the search)
    pub max_depth: Option<usize>,

    /// Expressions applied to every line, left to right
    pub expressions: Vec<String>,

    /// `module:function` reference resolved against `registry`
    pub function: Option<String>,

    /// External program and its arguments
    pub executable: Option<String>,

    /// Transforms available to function rules
    pub registry: Registry,

    /// Rewrite files in place instead of printing diffs
    pub write: bool,

    /// Encoding used to read and write targets
    pub encoding: TextEncoding,

    /// Terminator for every written line; `None` keeps the original ones
    pub newline: Option<Newline>,

    /// Redirect diffs and status lines to this file
    pub output: Option<PathBuf>,

    /// Status output detail (0 = quiet)
    pub verbosity: u8,

    /// Write a JSON run summary to this file
    pub report: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use bulkedit::Config;
    ///
    /// let config = Config::builder()
    ///     .pattern("*.py")
    ///     .expression("re.sub('failIf', 'assertFalse', line)")
    ///     .build()
    ///     .expect("valid configuration");
    /// assert!(!config.write);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No pattern is given
    /// - No rule source is given, or a function and an executable are both given
    /// - The start directory doesn't exist
    /// - The output or report path is a directory
    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(Error::config("at least one file pattern is required"));
        }

        if let Some(pattern) = self.patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::invalid_pattern(pattern, "Pattern must not be empty"));
        }

        if self.expressions.is_empty() && self.function.is_none() && self.executable.is_none() {
            return Err(Error::config(
                "no rule given: pass an expression, a function, or an executable",
            ));
        }

        if self.expressions.is_empty() && self.function.is_some() && self.executable.is_some() {
            return Err(Error::config(
                "a function and an executable cannot be combined; pick one",
            ));
        }

        if let Some(ref start) = self.start_dir {
            if !start.is_dir() {
                return Err(Error::config(format!(
                    "Start directory does not exist or is not a directory: {}",
                    start.display()
                )));
            }
        }

        for (label, path) in [("output", &self.output), ("report", &self.report)] {
            if let Some(path) = path {
                if path.is_dir() {
                    return Err(Error::config(format!(
                        "{label} path is a directory: {}",
                        path.display()
                    )));
                }
            }
        }

        if self.literal_paths && self.start_dir.is_some() {
            tracing::warn!("start_dir is ignored when explicit file names are given");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            literal_paths: false,
            start_dir: None,
            max_depth: None,
            expressions: Vec::new(),
            function: None,
            executable: None,
            registry: Registry::with_builtins(),
            write: false,
            encoding: TextEncoding::default(),
            newline: None,
            output: None,
            verbosity: 0,
            report: None,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    patterns: Vec<String>,
    literal_paths: bool,
    start_dir: Option<PathBuf>,
    max_depth: Option<usize>,
    expressions: Vec<String>,
    function: Option<String>,
    executable: Option<String>,
    registry: Option<Registry>,
    write: bool,
    encoding: Option<TextEncoding>,
    newline: Option<Newline>,
    output: Option<PathBuf>,
    verbosity: u8,
    report: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Adds a file pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Adds several file patterns.
    #[must_use]
    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Uses explicit file names instead of patterns.
    #[must_use]
    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = files.into_iter().map(Into::into).collect();
        self.literal_paths = true;
        self
    }

    /// Sets the directory to search.
    #[must_use]
    pub fn start_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.start_dir = Some(path.into());
        self
    }

    /// Limits how many directory levels are searched.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Adds an expression.
    #[must_use]
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self
    }

    /// Adds several expressions.
    #[must_use]
    pub fn expressions<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expressions
            .extend(expressions.into_iter().map(Into::into));
        self
    }

    /// Sets the `module:function` reference.
    #[must_use]
    pub fn function(mut self, reference: impl Into<String>) -> Self {
        self.function = Some(reference.into());
        self
    }

    /// Sets the external program.
    #[must_use]
    pub fn executable(mut self, command: impl Into<String>) -> Self {
        self.executable = Some(command.into());
        self
    }

    /// Sets the transform registry. Defaults to [`Registry::with_builtins`].
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enables in-place rewriting.
    #[must_use]
    pub fn write(mut self, enabled: bool) -> Self {
        self.write = enabled;
        self
    }

    /// Sets the text encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Forces one line terminator on output.
    #[must_use]
    pub fn newline(mut self, newline: Newline) -> Self {
        self.newline = Some(newline);
        self
    }

    /// Redirects output to a file.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Sets status verbosity.
    #[must_use]
    pub fn verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Writes a JSON summary to `path` after the run.
    #[must_use]
    pub fn report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            patterns: self.patterns,
            literal_paths: self.literal_paths,
            start_dir: self.start_dir,
            max_depth: self.max_depth,
            expressions: self.expressions,
            function: self.function,
            executable: self.executable,
            registry: self.registry.unwrap_or_else(Registry::with_builtins),
            write: self.write,
            encoding: self.encoding.unwrap_or_default(),
            newline: self.newline,
            output: self.output,
            verbosity: self.verbosity,
            report: self.report,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::builder()
            .pattern("*.txt")
            .expression("line")
            .build()
            .unwrap();

        assert!(!config.write);
        assert_eq!(config.encoding, TextEncoding::Utf8);
        assert!(config.newline.is_none());
        assert!(config.registry.names().contains(&"text:uniq".to_string()));
    }

    #[test]
    fn test_missing_pattern() {
        let result = Config::builder().expression("line").build();
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_empty_pattern() {
        let result = Config::builder().pattern("  ").expression("line").build();
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_missing_rule() {
        let result = Config::builder().pattern("*.txt").build();
        assert!(result.unwrap_err().to_string().contains("no rule given"));
    }

    #[test]
    fn test_function_with_executable() {
        let result = Config::builder()
            .pattern("*.txt")
            .function("text:uniq")
            .executable("sort")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_expression_overrides_other_sources() {
        let config = Config::builder()
            .pattern("*.txt")
            .expression("line")
            .function("text:uniq")
            .executable("sort")
            .build();
        assert!(config.is_ok());
    }

    #[test]
    fn test_invalid_start_dir() {
        let result = Config::builder()
            .pattern("*.txt")
            .expression("line")
            .start_dir("/nonexistent/path/that/should/not/exist")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_output_must_not_be_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::builder()
            .pattern("*.txt")
            .expression("line")
            .output(temp.path())
            .build();
        assert!(result.unwrap_err().to_string().contains("output path is a directory"));
    }

    #[test]
    fn test_files_switch_to_literal_paths() {
        let config = Config::builder()
            .files(["a.txt", "b.txt"])
            .expression("line")
            .build()
            .unwrap();
        assert!(config.literal_paths);
        assert_eq!(config.patterns, vec!["a.txt", "b.txt"]);
    }
}
