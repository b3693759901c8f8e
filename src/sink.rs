use crate::{
    config::Config,
    editor::EditResult,
    error::{Error, Result},
};
use similar::TextDiff;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

const DIFF_CONTEXT: usize = 3;

/// Single output stream for one run: diffs in preview mode, status lines in
/// write mode.
///
/// The stream is opened once and flushed by [`OutputSink::finish`].
pub struct OutputSink<W: Write> {
    out: W,
    destination: PathBuf,
    write_mode: bool,
    verbosity: u8,
    emitted: usize,
}

impl OutputSink<Box<dyn Write>> {
    /// Opens the sink described by `config`: the `output` file if set,
    /// otherwise standard output.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the output file cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (out, destination): (Box<dyn Write>, PathBuf) = match &config.output {
            Some(path) => {
                let file = File::create(path).map_err(|e| Error::io(path, e))?;
                debug!("Redirecting output to {}", path.display());
                (Box::new(BufWriter::new(file)), path.clone())
            }
            None => (
                Box::new(BufWriter::new(io::stdout())),
                PathBuf::from("<stdout>"),
            ),
        };
        Ok(Self::new(out, destination, config.write, config.verbosity))
    }
}

impl<W: Write> OutputSink<W> {
    /// Wraps any writer.
    pub fn new(out: W, destination: impl Into<PathBuf>, write_mode: bool, verbosity: u8) -> Self {
        Self {
            out,
            destination: destination.into(),
            write_mode,
            verbosity,
            emitted: 0,
        }
    }

    /// Renders one result.
    ///
    /// Preview mode prints a unified diff when the content changed. Write
    /// mode prints `rewrote <path>`, plus `unchanged <path>` at verbosity 1
    /// and above; standard input has no file to rewrite, so its full
    /// modified content is printed instead.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the destination cannot be written.
    pub fn emit(&mut self, result: &EditResult) -> Result<()> {
        let name = result.display_name();

        let rendered = if !self.write_mode {
            result.changed.then(|| unified_diff(result.original.text(), result.modified.text(), &name))
        } else if result.target.is_stdin() {
            Some(result.modified.text().to_string())
        } else if result.written {
            Some(format!("rewrote {name}\n"))
        } else if self.verbosity >= 1 {
            Some(format!("unchanged {name}\n"))
        } else {
            None
        };

        if let Some(text) = rendered {
            self.out
                .write_all(text.as_bytes())
                .map_err(|e| Error::io(&self.destination, e))?;
            self.emitted += 1;
        }
        Ok(())
    }

    /// Number of results that produced output.
    #[must_use]
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an IO error if flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.out
            .flush()
            .map_err(|e| Error::io(&self.destination, e))?;
        Ok(self.out)
    }
}

/// Unified diff of two texts with `name` in both headers.
#[must_use]
pub fn unified_diff(original: &str, modified: &str, name: &str) -> String {
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(DIFF_CONTEXT)
        .header(name, name)
        .to_string()
}
