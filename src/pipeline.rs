use crate::{
    config::Config,
    editor::FileEditor,
    error::{Error, Result},
    resolver::PatternResolver,
    rule::{LineRule, Rule},
    sink::OutputSink,
    text::FileTarget,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Targets processed without error
    pub processed: usize,

    /// Targets whose content changed (or would change in preview mode)
    pub changed: usize,

    /// Targets left as they were
    pub unchanged: usize,

    /// Files rewritten on disk
    pub written: usize,

    /// Targets that failed
    pub failed: usize,

    /// Paths of changed files, in processing order
    pub modified: Vec<PathBuf>,

    /// One message per failed target
    pub failures: Vec<String>,

    /// Whether files were rewritten in place
    pub write_mode: bool,

    /// Total execution time
    pub duration: Duration,

    #[serde(skip)]
    errors: Vec<Error>,
}

impl RunSummary {
    /// Errors collected from failed targets.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Prints a human-readable summary to stderr.
    pub fn print_summary(&self) {
        let mode = if self.write_mode { "write" } else { "preview" };
        eprintln!("\n╔═══════════════════════════════════════════╗");
        eprintln!("║ bulkedit summary ({mode:<7})                ║");
        eprintln!("╠═══════════════════════════════════════════╣");
        eprintln!("║ Processed:      {:>8}                  ║", self.processed);
        eprintln!("║   - Changed:    {:>8}                  ║", self.changed);
        eprintln!("║   - Unchanged:  {:>8}                  ║", self.unchanged);
        eprintln!("║ Written:        {:>8}                  ║", self.written);
        eprintln!("║ Failed:         {:>8}                  ║", self.failed);
        eprintln!("║ Duration:       {:>8.2}s                 ║", self.duration.as_secs_f64());
        eprintln!("╚═══════════════════════════════════════════╝\n");
    }
}

/// JSON document written by `--report`.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    generated_at: String,
    rule: String,
    encoding: &'static str,
    summary: &'a RunSummary,
}

/// Resolves targets, runs the rule over each one, and renders the results.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    rule: Rule,
}

impl Pipeline {
    /// Creates a pipeline, compiling the rule up front.
    ///
    /// # Errors
    ///
    /// Returns a configuration-class error if the configuration is invalid
    /// or the rule does not compile.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let rule = Rule::compile(
            &config.expressions,
            config.function.as_deref(),
            config.executable.as_deref(),
            &config.registry,
            config.encoding,
        )?;

        Ok(Self { config, rule })
    }

    /// Returns the compiled rule.
    #[must_use]
    pub const fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Runs the batch, writing output to stdout or the configured output file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No target matches
    /// - The output destination cannot be opened or written
    /// - Every target failed ([`Error::Batch`])
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bulkedit::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .pattern("*.py")
    ///     .start_dir("./tests")
    ///     .expression("re.sub('failIf', 'assertFalse', line)")
    ///     .build()?;
    ///
    /// let summary = Pipeline::new(config)?.run()?;
    /// println!("{} file(s) would change", summary.changed);
    /// # Ok(())
    /// # }
    /// ```
    pub fn run(self) -> Result<RunSummary> {
        let targets = self.resolve()?;
        let sink = OutputSink::from_config(&self.config)?;
        self.execute(&targets, sink).map(|(summary, _)| summary)
    }

    /// Runs the batch, writing output to `out` instead of the configured destination.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub fn run_with_writer<W: Write>(self, out: W) -> Result<(RunSummary, W)> {
        let targets = self.resolve()?;
        let sink = OutputSink::new(out, "<writer>", self.config.write, self.config.verbosity);
        self.execute(&targets, sink)
    }

    fn resolve(&self) -> Result<Vec<FileTarget>> {
        let targets = if self.config.literal_paths {
            PatternResolver::literal(&self.config.patterns)?
        } else {
            PatternResolver::from_config(&self.config).resolve(&self.config.patterns)?
        };
        info!("Resolved {} target(s)", targets.len());
        for target in &targets {
            debug!("Target: {}", target);
        }
        Ok(targets)
    }

    #[instrument(skip(self, targets, sink), fields(targets = targets.len(), write = self.config.write))]
    fn execute<W: Write>(
        &self,
        targets: &[FileTarget],
        mut sink: OutputSink<W>,
    ) -> Result<(RunSummary, W)> {
        let start_time = Instant::now();
        let editor = FileEditor::new(&self.rule, &self.config);
        let mut summary = RunSummary {
            write_mode: self.config.write,
            ..RunSummary::default()
        };

        info!("Applying {}", self.rule.describe());

        for target in targets {
            match editor.process(target) {
                Ok(result) => {
                    summary.processed += 1;
                    if result.changed {
                        summary.changed += 1;
                        if let Some(path) = target.path() {
                            summary.modified.push(path.to_path_buf());
                        }
                    } else {
                        summary.unchanged += 1;
                    }
                    if result.written {
                        summary.written += 1;
                    }
                    sink.emit(&result)?;
                }
                Err(e) => {
                    error!("{}", e);
                    summary.failed += 1;
                    summary.failures.push(e.to_string());
                    summary.errors.push(e);
                }
            }
        }

        let out = sink.finish()?;
        summary.duration = start_time.elapsed();

        info!(
            "Processed {} target(s): {} changed, {} unchanged, {} written, {} failed in {:.2?}",
            summary.processed,
            summary.changed,
            summary.unchanged,
            summary.written,
            summary.failed,
            summary.duration
        );

        if let Some(path) = &self.config.report {
            self.write_report(path, &summary)?;
        }

        if summary.processed == 0 && summary.failed > 0 {
            return Err(Error::batch(summary.errors));
        }

        Ok((summary, out))
    }

    fn write_report(&self, path: &Path, summary: &RunSummary) -> Result<()> {
        let report = RunReport {
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            rule: self.rule.describe(),
            encoding: self.config.encoding.name(),
            summary,
        };

        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report).map_err(|e| Error::io(path, e.into()))?;
        writer.flush().map_err(|e| Error::io(path, e))?;

        info!("Wrote report to {}", path.display());
        Ok(())
    }
}
