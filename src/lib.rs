//! # bulkedit
//!
//! Apply line-oriented rules to many files at once.
//!
//! ## Features
//!
//! - Glob patterns with bounded-depth directory search
//! - Three rule forms: per-line expressions, registered transforms, and
//!   external programs
//! - Unified diff preview by default, atomic in-place rewrites on request
//! - Line terminators and text encodings preserved across edits
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulkedit::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .pattern("*.py")
//!     .start_dir("./tests")
//!     .expression("re.sub('failIf', 'assertFalse', line)")
//!     .write(true)
//!     .build()?;
//!
//! let summary = Pipeline::new(config)?.run()?;
//! println!("{} file(s) rewritten", summary.written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! A run is a short pipeline:
//! 1. **Resolver**: expands patterns into an ordered, de-duplicated target list
//! 2. **Rule**: compiles expressions, a registered function, or an executable
//! 3. **Editor**: decodes each target, applies the rule, and rewrites atomically
//! 4. **Sink**: prints diffs or status lines to one output stream
//!
//! Rules run caller-supplied logic with the privileges of the current
//! process. Never build a rule from untrusted input.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod editor;
mod encoding;
mod error;
mod executable;
mod pipeline;
mod resolver;
mod sink;
mod text;

pub mod api;
pub mod expr;
pub mod registry;
pub mod rule;

pub use config::{Config, ConfigBuilder};
pub use editor::{EditResult, FileEditor};
pub use encoding::TextEncoding;
pub use error::{Error, Result};
pub use executable::{ExecutableRule, FILE_ENV_VAR};
pub use pipeline::{Pipeline, RunSummary};
pub use registry::{Registry, Transform};
pub use resolver::PatternResolver;
pub use rule::{LineRule, Rule};
pub use sink::{unified_diff, OutputSink};
pub use text::{FileTarget, Newline, SourceText, STDIN_MARKER};

pub use api::edit_files;

/// Runs a complete batch with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid or the rule does not compile
/// - No file matches the patterns
/// - The output destination cannot be written
/// - Every target failed
///
/// # Examples
///
/// ```no_run
/// use bulkedit::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .pattern("*.txt")
///     .expression("line.rstrip()")
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunSummary> {
    Pipeline::new(config)?.run()
}
