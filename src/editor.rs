//! Per-file read, transform, compare, and write.

use crate::{
    config::Config,
    encoding::TextEncoding,
    error::{Error, Result},
    rule::{LineRule, RuleInput, Transformed},
    text::{FileTarget, Newline, SourceText},
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info, trace};

/// Outcome of running a rule over one target.
#[derive(Debug, Clone)]
pub struct EditResult {
    /// The processed target
    pub target: FileTarget,

    /// Content as read
    pub original: SourceText,

    /// Content after the rule, terminators applied
    pub modified: SourceText,

    /// Whether the modified text differs from the original
    pub changed: bool,

    /// Whether the file on disk was replaced
    pub written: bool,
}

impl EditResult {
    /// Name used in diff headers and status lines.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.target.display_name()
    }
}

/// Applies a compiled rule to targets one at a time.
pub struct FileEditor<'r> {
    rule: &'r dyn LineRule,
    encoding: TextEncoding,
    newline: Option<Newline>,
    write: bool,
}

impl<'r> FileEditor<'r> {
    /// Creates an editor using the encoding, newline, and write settings of `config`.
    #[must_use]
    pub fn new(rule: &'r dyn LineRule, config: &Config) -> Self {
        Self::with_options(rule, config.encoding, config.newline, config.write)
    }

    /// Creates an editor with explicit settings.
    #[must_use]
    pub fn with_options(
        rule: &'r dyn LineRule,
        encoding: TextEncoding,
        newline: Option<Newline>,
        write: bool,
    ) -> Self {
        Self {
            rule,
            encoding,
            newline,
            write,
        }
    }

    /// Processes a target, reading standard input for [`FileTarget::Stdin`].
    ///
    /// # Errors
    ///
    /// Returns a per-file error if the target cannot be read, decoded,
    /// transformed, or written.
    pub fn process(&self, target: &FileTarget) -> Result<EditResult> {
        match target {
            FileTarget::Path(path) => {
                let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
                self.process_bytes(target, &bytes)
            }
            FileTarget::Stdin => self.process_reader(target, io::stdin().lock()),
        }
    }

    /// Processes content supplied by a reader instead of the file system.
    ///
    /// # Errors
    ///
    /// See [`FileEditor::process`].
    pub fn process_reader<R: Read>(&self, target: &FileTarget, mut reader: R) -> Result<EditResult> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(target.display_name(), e))?;
        self.process_bytes(target, &bytes)
    }

    fn process_bytes(&self, target: &FileTarget, bytes: &[u8]) -> Result<EditResult> {
        let name = target.display_name();
        trace!("Processing {} ({} bytes)", name, bytes.len());

        let text = self
            .encoding
            .decode(bytes)
            .ok_or_else(|| Error::decode(&name, self.encoding.name()))?;
        let original = SourceText::parse(text);

        let transformed = self.rule.apply(&RuleInput {
            file_name: &name,
            source: &original,
        })?;

        let rendered = match transformed {
            Transformed::Lines(lines) => original.render(&lines, self.newline),
            Transformed::Text(text) => match self.newline {
                Some(newline) => SourceText::parse(text).with_newline(newline),
                None => text,
            },
        };

        let changed = rendered.as_bytes() != original.text().as_bytes();
        let modified = SourceText::parse(rendered);

        let written = match target.path() {
            Some(path) if self.write && changed => {
                self.write_back(path, modified.text())?;
                info!("Rewrote {}", path.display());
                true
            }
            _ => false,
        };

        debug!("{}: changed = {}", name, changed);

        Ok(EditResult {
            target: target.clone(),
            original,
            modified,
            changed,
            written,
        })
    }

    fn write_back(&self, path: &Path, text: &str) -> Result<()> {
        let bytes = self.encoding.encode(text).ok_or_else(|| {
            Error::io(
                path,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("modified content cannot be encoded as {}", self.encoding),
                ),
            )
        })?;
        atomic_write(path, &bytes)
    }
}

/// Replaces `path` with `content` via a temporary file in the same
/// directory, keeping the original permissions.
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let permissions = fs::metadata(path)
        .map_err(|e| Error::io(path, e))?
        .permissions();

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    temp.write_all(content).map_err(|e| Error::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(temp.path(), e))?;
    fs::set_permissions(temp.path(), permissions).map_err(|e| Error::io(temp.path(), e))?;

    temp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
