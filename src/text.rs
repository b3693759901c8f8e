//! Target descriptors and the line model rules operate on.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Pattern that selects standard input instead of a file.
pub const STDIN_MARKER: &str = "-";

/// A resolved input of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileTarget {
    /// A file on disk
    Path(PathBuf),
    /// Standard input; never rewritten in place
    Stdin,
}

impl FileTarget {
    /// Returns the backing path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Stdin => None,
        }
    }

    /// Returns true for the standard input sentinel.
    #[must_use]
    pub const fn is_stdin(&self) -> bool {
        matches!(self, Self::Stdin)
    }

    /// Name used in diff headers, logs, and the `filename` binding.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Stdin => "<stdin>".to_string(),
        }
    }
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Line terminator convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Newline {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
}

impl Newline {
    /// Returns the terminator text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }

    /// Convention used when a file carries no terminator to copy.
    #[must_use]
    pub const fn platform() -> Self {
        if cfg!(windows) { Self::CrLf } else { Self::Lf }
    }
}

impl FromStr for Newline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" | "unix" | "\\n" => Ok(Self::Lf),
            "crlf" | "dos" | "windows" | "\\r\\n" => Ok(Self::CrLf),
            "cr" | "mac" | "\\r" => Ok(Self::Cr),
            _ => Err(Error::config(format!(
                "Unsupported newline '{s}'. Expected one of: lf, crlf, cr"
            ))),
        }
    }
}

/// Decoded content split into lines, remembering every terminator.
///
/// Lines never contain their terminator. Rendering a line sequence back to
/// text reuses the original terminators wherever the shape of the content
/// allows it, so an identity rule reproduces the input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    text: String,
    lines: Vec<String>,
    endings: Vec<Option<Newline>>,
}

impl SourceText {
    /// Splits text on `\n`, `\r\n`, and lone `\r`.
    #[must_use]
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let bytes = text.as_bytes();
        let mut lines = Vec::new();
        let mut endings = Vec::new();
        let mut start = 0;

        while let Some(offset) = memchr::memchr2(b'\n', b'\r', &bytes[start..]) {
            let at = start + offset;
            let (ending, width) = match bytes[at] {
                b'\r' if bytes.get(at + 1) == Some(&b'\n') => (Newline::CrLf, 2),
                b'\r' => (Newline::Cr, 1),
                _ => (Newline::Lf, 1),
            };
            lines.push(text[start..at].to_string());
            endings.push(Some(ending));
            start = at + width;
        }

        if start < text.len() {
            lines.push(text[start..].to_string());
            endings.push(None);
        }

        Self {
            text,
            lines,
            endings,
        }
    }

    /// Returns the original text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the lines without terminators.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the first terminator found in the text.
    #[must_use]
    pub fn newline(&self) -> Option<Newline> {
        self.endings.iter().flatten().next().copied()
    }

    /// Returns true if the text ends with a terminator.
    #[must_use]
    pub fn has_trailing_newline(&self) -> bool {
        matches!(self.endings.last(), Some(Some(_)))
    }

    /// Renders a transformed line sequence against this original.
    ///
    /// With the same number of lines, each line keeps its own terminator.
    /// Otherwise lines are joined with the first terminator of the original
    /// and the text ends with a terminator iff the original did (an empty
    /// original counts as terminated). `newline` replaces every terminator.
    #[must_use]
    pub fn render(&self, lines: &[String], newline: Option<Newline>) -> String {
        if newline.is_none() && lines == self.lines.as_slice() {
            return self.text.clone();
        }

        let mut out = String::with_capacity(self.text.len());

        if lines.len() == self.lines.len() {
            for (line, ending) in lines.iter().zip(&self.endings) {
                out.push_str(line);
                if let Some(ending) = ending {
                    out.push_str(newline.unwrap_or(*ending).as_str());
                }
            }
            return out;
        }

        let separator = newline
            .or_else(|| self.newline())
            .unwrap_or_else(Newline::platform)
            .as_str();
        let trailing = self.lines.is_empty() || self.has_trailing_newline();

        for (index, line) in lines.iter().enumerate() {
            out.push_str(line);
            if index + 1 < lines.len() || trailing {
                out.push_str(separator);
            }
        }
        out
    }

    /// Returns the text with every terminator replaced by `newline`.
    #[must_use]
    pub fn with_newline(&self, newline: Newline) -> String {
        self.render(&self.lines, Some(newline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| (*l).to_string()).collect()
    }

    #[test]
    fn test_parse_mixed_terminators() {
        let source = SourceText::parse("a\r\nb\nc\rd");
        assert_eq!(source.lines(), owned(&["a", "b", "c", "d"]).as_slice());
        assert_eq!(source.newline(), Some(Newline::CrLf));
        assert!(!source.has_trailing_newline());
    }

    #[test]
    fn test_parse_keeps_blank_lines() {
        let source = SourceText::parse("a\n\n\nb\n");
        assert_eq!(source.lines(), owned(&["a", "", "", "b"]).as_slice());
        assert!(source.has_trailing_newline());
    }

    #[test]
    fn test_identity_render_is_byte_exact() {
        for text in ["", "x", "a\r\nb\nc\r", "\n\n", "no newline\r\nat end"] {
            let source = SourceText::parse(text);
            assert_eq!(source.render(source.lines(), None), text);
        }
    }

    #[test]
    fn test_same_shape_keeps_each_terminator() {
        let source = SourceText::parse("foo\r\nbar\nbaz");
        let rendered = source.render(&owned(&["FOO", "bar", "BAZ"]), None);
        assert_eq!(rendered, "FOO\r\nbar\nBAZ");
    }

    #[test]
    fn test_reshaped_output_uses_first_terminator() {
        let source = SourceText::parse("a\r\nb\r\nc\r\n");
        let rendered = source.render(&owned(&["a", "c"]), None);
        assert_eq!(rendered, "a\r\nc\r\n");

        let source = SourceText::parse("a\nb");
        let rendered = source.render(&owned(&["header", "a", "b"]), None);
        assert_eq!(rendered, "header\na\nb");
    }

    #[test]
    fn test_newline_override() {
        let source = SourceText::parse("a\nb\n");
        assert_eq!(source.with_newline(Newline::CrLf), "a\r\nb\r\n");
        assert_eq!(source.render(&owned(&["a"]), Some(Newline::Cr)), "a\r");
    }

    #[test]
    fn test_empty_original_gets_terminated_output() {
        let source = SourceText::parse("");
        let rendered = source.render(&owned(&["new"]), Some(Newline::Lf));
        assert_eq!(rendered, "new\n");
    }

    #[test]
    fn test_newline_from_str() {
        assert_eq!("CRLF".parse::<Newline>().unwrap(), Newline::CrLf);
        assert_eq!("unix".parse::<Newline>().unwrap(), Newline::Lf);
        assert!("nl".parse::<Newline>().is_err());
    }

    #[test]
    fn test_file_target_names() {
        assert_eq!(FileTarget::Stdin.display_name(), "<stdin>");
        let target = FileTarget::Path(PathBuf::from("src/lib.rs"));
        assert_eq!(target.path(), Some(Path::new("src/lib.rs")));
        assert!(!target.is_stdin());
    }
}
