use anyhow::Context;
use bulkedit::{Config, Newline, Pipeline, TextEncoding};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "bulkedit",
    version,
    author,
    about = "Apply line-oriented rules to many files at once",
    long_about = "Apply line-oriented rules to many files at once.\n\n\
    By default a unified diff of the would-be changes is printed and nothing \
    is modified. Pass --write to rewrite the files in place.\n\n\
    USAGE EXAMPLES:\n  \
      # Preview a substitution in every Python file of the current directory\n  \
      bulkedit -e \"re.sub('failIf', 'assertFalse', line)\" '*.py'\n\n  \
      # Rewrite a whole tree, two levels deep\n  \
      bulkedit -w -s ./tests -m 2 -e \"line.replace('foo', 'bar')\" '*.py'\n\n  \
      # Collapse runs of blank lines with a built-in transform\n  \
      bulkedit -w -f text:squeeze_blank '*.md'\n\n  \
      # Pipe every file through an external program\n  \
      bulkedit -x 'sed s/foo/bar/' '*.txt'\n\n  \
      # Edit standard input\n  \
      cat notes.txt | bulkedit -w -e 'line.upper()' -"
)]
struct Cli {
    /// File patterns to edit, or '-' for standard input
    #[arg(required = true, value_name = "PATTERN")]
    patterns: Vec<String>,

    /// Rewrite matching files in place instead of printing a diff
    #[arg(short, long)]
    write: bool,

    /// Verbose output (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Expression applied to every line (can be used multiple times)
    ///
    /// Bindings: `line`, `lineno`, `filename`. A result of None or False
    /// deletes the line.
    ///
    /// Example: bulkedit -e "re.sub(r'(\d+)px', r'\1em', line)" '*.css'
    #[arg(short, long = "expression", value_name = "EXPR")]
    expressions: Vec<String>,

    /// Registered transform to run on each file
    ///
    /// Built-ins: text:rstrip, text:squeeze_blank, text:uniq, text:sort
    #[arg(short, long, value_name = "MODULE:FUNCTION")]
    function: Option<String>,

    /// External program fed each file on stdin; its stdout replaces the file
    #[arg(short = 'x', long, value_name = "COMMAND")]
    executable: Option<String>,

    /// Directory to search for matching files
    #[arg(short, long = "start", value_name = "PATH")]
    start_dir: Option<PathBuf>,

    /// Directory levels to search below the start directory (negative = unbounded)
    #[arg(short, long, allow_negative_numbers = true, value_name = "N")]
    max_depth: Option<i64>,

    /// Write diffs and status lines to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Encoding used to read and write files
    ///
    /// One of: utf-8, utf-8-sig, latin-1, ascii, utf-16le, utf-16be
    #[arg(long, default_value = "utf-8", value_name = "NAME")]
    encoding: TextEncoding,

    /// Line terminator forced on every written line
    #[arg(long, value_enum)]
    newline: Option<CliNewline>,

    /// Write a JSON summary of the run to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliNewline {
    /// Unix line feed
    Lf,
    /// Windows carriage return + line feed
    Crlf,
    /// Classic Mac carriage return
    Cr,
}

impl From<CliNewline> for Newline {
    fn from(n: CliNewline) -> Self {
        match n {
            CliNewline::Lf => Self::Lf,
            CliNewline::Crlf => Self::CrLf,
            CliNewline::Cr => Self::Cr,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let mut builder = Config::builder()
        .patterns(cli.patterns)
        .expressions(cli.expressions)
        .write(cli.write)
        .encoding(cli.encoding)
        .verbosity(cli.verbose);

    if let Some(reference) = cli.function {
        builder = builder.function(reference);
    }

    if let Some(command) = cli.executable {
        builder = builder.executable(command);
    }

    if let Some(dir) = cli.start_dir {
        builder = builder.start_dir(dir);
    }

    // Negative depth means no limit
    if let Some(depth) = cli.max_depth.and_then(|d| usize::try_from(d).ok()) {
        builder = builder.max_depth(depth);
    }

    if let Some(newline) = cli.newline {
        builder = builder.newline(newline.into());
    }

    if let Some(path) = cli.output {
        builder = builder.output(path);
    }

    if let Some(path) = cli.report {
        builder = builder.report(path);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let summary = Pipeline::new(config)
        .context("Failed to compile rule")?
        .run()
        .context("Edit failed")?;

    if cli.verbose > 0 {
        summary.print_summary();
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let default_level = match verbosity {
        0 => "bulkedit=warn",
        1 => "bulkedit=info",
        2 => "bulkedit=debug",
        _ => "bulkedit=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .init();

    Ok(())
}
