//! Executable rules: an external program reads the file on stdin and writes
//! the transformed content on stdout.

use crate::encoding::TextEncoding;
use crate::error::{Error, Result};
use crate::rule::{LineRule, RuleInput, Transformed};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, trace};

/// Environment variable holding the name of the file being processed.
pub const FILE_ENV_VAR: &str = "BULKEDIT_FILE";

/// A resolved external program with its arguments.
#[derive(Debug, Clone)]
pub struct ExecutableRule {
    command: String,
    program: PathBuf,
    args: Vec<String>,
    encoding: TextEncoding,
}

impl ExecutableRule {
    /// Splits `command` on whitespace and locates the program.
    ///
    /// A program containing a path separator must exist; a bare name is
    /// looked up on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleResolution`] if the command is empty or the
    /// program cannot be found.
    pub fn resolve(command: &str, encoding: TextEncoding) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(Error::resolution(command, "executable command is empty"));
        };

        let has_separator = name.contains(std::path::MAIN_SEPARATOR) || name.contains('/');
        let program = which::which(name).map_err(|e| {
            let reason = if has_separator {
                format!("'{name}' does not exist or is not executable ({e})")
            } else {
                format!("'{name}' was not found on PATH ({e})")
            };
            Error::resolution(command, reason)
        })?;

        debug!("Resolved executable '{}' to {}", name, program.display());

        Ok(Self {
            command: command.to_string(),
            program,
            args: parts.map(str::to_string).collect(),
            encoding,
        })
    }

    /// Returns the command as given.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the program over `content` and returns its decoded stdout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleExecution`] if the program cannot start or exits
    /// unsuccessfully, and [`Error::RuleEvaluation`] if the content cannot be
    /// encoded or the output cannot be decoded.
    pub fn run(&self, content: &str, file_name: &str) -> Result<String> {
        let input = self.encoding.encode(content).ok_or_else(|| {
            Error::evaluation(
                file_name,
                None,
                format!("content cannot be encoded as {}", self.encoding),
            )
        })?;

        trace!("Spawning {:?} for {}", self.command, file_name);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(FILE_ENV_VAR, file_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::execution(&self.command, file_name, "failed to start", e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            Error::execution(&self.command, file_name, "failed to start", "stdin was not captured")
        })?;

        // Feed stdin from its own thread so a program that writes before it
        // finishes reading cannot deadlock on a full pipe.
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| Error::execution(&self.command, file_name, "wait failed", e.to_string()))?;

        if !output.status.success() {
            return Err(Error::execution(
                &self.command,
                file_name,
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        match writer.join() {
            Ok(Ok(())) => {}
            // The program may legitimately exit without reading everything.
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(Error::execution(
                    &self.command,
                    file_name,
                    "stdin write failed",
                    e.to_string(),
                ));
            }
            Err(_) => {
                return Err(Error::execution(
                    &self.command,
                    file_name,
                    "stdin write failed",
                    "writer thread panicked",
                ));
            }
        }

        self.encoding.decode(&output.stdout).ok_or_else(|| {
            Error::evaluation(
                file_name,
                None,
                format!("output of '{}' is not valid {}", self.command, self.encoding),
            )
        })
    }
}

impl LineRule for ExecutableRule {
    fn apply(&self, input: &RuleInput<'_>) -> Result<Transformed> {
        self.run(input.source.text(), input.file_name)
            .map(Transformed::Text)
    }

    fn describe(&self) -> String {
        format!("executable `{}`", self.command)
    }
}
