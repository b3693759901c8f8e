//! # Fluent API
//!
//! High-level entry points for embedding bulkedit in another program.
//!
//! ## Examples
//!
//! ```no_run
//! use bulkedit::api::{edit_files, Batch};
//!
//! // Preview a change to two files (diffs go to stdout)
//! let changed = edit_files(["a.py", "b.py"], ["re.sub('failIf', 'assertFalse', line)"], false)?;
//!
//! // Search a tree and rewrite in place
//! Batch::patterns(["*.py"])
//!     .start_dir("./tests")
//!     .expression("re.sub('failUnless', 'assertTrue', line)")
//!     .write()
//!     .run()?;
//!
//! // Run a registered transform
//! Batch::files(["notes.txt"])
//!     .function("text:squeeze_blank")
//!     .write()
//!     .run()?;
//! # Ok::<(), bulkedit::Error>(())
//! ```

use crate::{Config, Newline, Pipeline, Registry, Result, RunSummary, TextEncoding};
use std::io::Write;
use std::path::PathBuf;

/// Builder for a single bulkedit run.
#[derive(Debug, Clone)]
#[must_use = "call .run() to execute the batch"]
pub struct Batch {
    inputs: Vec<String>,
    literal: bool,
    start_dir: Option<PathBuf>,
    max_depth: Option<usize>,
    expressions: Vec<String>,
    function: Option<String>,
    executable: Option<String>,
    registry: Option<Registry>,
    write: bool,
    encoding: TextEncoding,
    newline: Option<Newline>,
    output: Option<PathBuf>,
    verbosity: u8,
    report: Option<PathBuf>,
}

impl Batch {
    fn with_inputs<I, S>(inputs: I, literal: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            literal,
            start_dir: None,
            max_depth: None,
            expressions: Vec::new(),
            function: None,
            executable: None,
            registry: None,
            write: false,
            encoding: TextEncoding::default(),
            newline: None,
            output: None,
            verbosity: 0,
            report: None,
        }
    }

    /// Edits exactly these files; no globbing takes place.
    pub fn files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_inputs(files, true)
    }

    /// Edits every file matching these glob patterns.
    pub fn patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_inputs(patterns, false)
    }

    /// Directory to search for pattern matches.
    pub fn start_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.start_dir = Some(path.into());
        self
    }

    /// Directory levels to search below the start directory.
    ///
    /// Default: unbounded with a start directory, `0` otherwise
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Adds an expression applied to every line.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self
    }

    /// Adds several expressions, applied left to right.
    pub fn expressions<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expressions
            .extend(expressions.into_iter().map(Into::into));
        self
    }

    /// Uses a registered `module:function` transform.
    pub fn function(mut self, reference: impl Into<String>) -> Self {
        self.function = Some(reference.into());
        self
    }

    /// Pipes each file through an external program.
    pub fn executable(mut self, command: impl Into<String>) -> Self {
        self.executable = Some(command.into());
        self
    }

    /// Resolves functions against `registry` instead of the built-ins.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Rewrites files in place instead of printing diffs.
    pub fn write(mut self) -> Self {
        self.write = true;
        self
    }

    /// Sets the text encoding.
    ///
    /// Default: `TextEncoding::Utf8`
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Forces a line terminator on output.
    pub fn newline(mut self, newline: Newline) -> Self {
        self.newline = Some(newline);
        self
    }

    /// Redirects diffs and status lines to a file.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Sets status verbosity.
    pub fn verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Writes a JSON summary after the run.
    pub fn report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report = Some(path.into());
        self
    }

    /// Converts the builder into a validated [`Config`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn into_config(self) -> Result<Config> {
        let mut builder = if self.literal {
            Config::builder().files(self.inputs)
        } else {
            Config::builder().patterns(self.inputs)
        };

        if let Some(dir) = self.start_dir {
            builder = builder.start_dir(dir);
        }
        if let Some(depth) = self.max_depth {
            builder = builder.max_depth(depth);
        }
        if let Some(reference) = self.function {
            builder = builder.function(reference);
        }
        if let Some(command) = self.executable {
            builder = builder.executable(command);
        }
        if let Some(registry) = self.registry {
            builder = builder.registry(registry);
        }
        if let Some(newline) = self.newline {
            builder = builder.newline(newline);
        }
        if let Some(path) = self.output {
            builder = builder.output(path);
        }
        if let Some(path) = self.report {
            builder = builder.report(path);
        }

        builder
            .expressions(self.expressions)
            .write(self.write)
            .encoding(self.encoding)
            .verbosity(self.verbosity)
            .build()
    }

    /// Executes the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, nothing matched,
    /// or every target failed.
    pub fn run(self) -> Result<RunSummary> {
        Pipeline::new(self.into_config()?)?.run()
    }

    /// Executes the batch, writing diffs and status lines to `out`.
    ///
    /// # Errors
    ///
    /// See [`Batch::run`].
    pub fn run_with_writer<W: Write>(self, out: W) -> Result<(RunSummary, W)> {
        Pipeline::new(self.into_config()?)?.run_with_writer(out)
    }
}

/// Applies expressions to the given files and returns the paths that changed.
///
/// With `write` off, diffs are printed to stdout and nothing is modified.
///
/// # Errors
///
/// Returns an error if an expression does not compile, `files` is empty,
/// or every file failed.
///
/// # Examples
///
/// ```no_run
/// use bulkedit::api::edit_files;
///
/// let changed = edit_files(["setup.py"], ["line.replace('distutils', 'setuptools')"], true)?;
/// for path in changed {
///     println!("rewrote {}", path.display());
/// }
/// # Ok::<(), bulkedit::Error>(())
/// ```
pub fn edit_files<F, S, E, T>(files: F, expressions: E, write: bool) -> Result<Vec<PathBuf>>
where
    F: IntoIterator<Item = S>,
    S: Into<String>,
    E: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut batch = Batch::files(files).expressions(expressions);
    if write {
        batch = batch.write();
    }
    Ok(batch.run()?.modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Transform;
    use assert_fs::prelude::*;

    #[test]
    fn test_files_builder_rewrites() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.txt");
        file.write_str("What a nice cat!\n").unwrap();

        let (summary, _) = Batch::files([file.path().to_string_lossy()])
            .expression("re.sub('cat', 'horse', line)")
            .write()
            .run_with_writer(Vec::new())
            .unwrap();

        assert_eq!(summary.modified, vec![file.path().to_path_buf()]);
        file.assert("What a nice horse!\n");
    }

    #[test]
    fn test_patterns_builder_respects_depth() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("top.txt").write_str("x\n").unwrap();
        temp.child("nested/deep.txt").write_str("x\n").unwrap();

        let (summary, _) = Batch::patterns(["*.txt"])
            .start_dir(temp.path())
            .max_depth(0)
            .expression("'y'")
            .write()
            .run_with_writer(Vec::new())
            .unwrap();

        assert_eq!(summary.written, 1);
        temp.child("top.txt").assert("y\n");
        temp.child("nested/deep.txt").assert("x\n");
    }

    #[test]
    fn test_custom_registry() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("log.txt");
        file.write_str("keep\nDEBUG one\nkeep too\nDEBUG two\nend\n").unwrap();

        let registry = Registry::new().with(
            "filters",
            "drop_debug",
            Transform::lines_with_name(|lines, _| {
                Ok(lines.iter().filter(|l| !l.contains("DEBUG")).cloned().collect())
            }),
        );

        let (summary, _) = Batch::files([file.path().to_string_lossy()])
            .registry(registry)
            .function("filters:drop_debug")
            .write()
            .run_with_writer(Vec::new())
            .unwrap();

        assert_eq!(summary.changed, 1);
        file.assert("keep\nkeep too\nend\n");
    }

    #[test]
    fn test_edit_files_preview_leaves_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.txt");
        file.write_str("foo\n").unwrap();

        let changed = edit_files(
            [file.path().to_string_lossy().into_owned()],
            ["line.upper()"],
            false,
        )
        .unwrap();

        assert_eq!(changed, vec![file.path().to_path_buf()]);
        file.assert("foo\n");
    }

    #[test]
    fn test_edit_files_requires_files() {
        let err = edit_files(Vec::<String>::new(), ["line"], false).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_into_config_carries_options() {
        let config = Batch::patterns(["*.rs"])
            .expression("line")
            .encoding(TextEncoding::Latin1)
            .newline(Newline::CrLf)
            .verbosity(2)
            .into_config()
            .unwrap();

        assert!(!config.literal_paths);
        assert_eq!(config.encoding, TextEncoding::Latin1);
        assert_eq!(config.newline, Some(Newline::CrLf));
        assert_eq!(config.verbosity, 2);
    }
}
