//! Text encodings used to read targets and write them back.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Character encoding of target files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// UTF-8; a leading byte order mark is kept as part of the first line
    #[default]
    Utf8,
    /// UTF-8 with a byte order mark that is stripped on read and restored on write
    Utf8Sig,
    /// ISO-8859-1
    Latin1,
    /// 7-bit ASCII
    Ascii,
    /// UTF-16, little endian
    Utf16Le,
    /// UTF-16, big endian
    Utf16Be,
}

impl TextEncoding {
    /// Returns the canonical name of this encoding.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Sig => "utf-8-sig",
            Self::Latin1 => "latin-1",
            Self::Ascii => "ascii",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
        }
    }

    /// Decodes raw bytes. Returns `None` when the bytes are not valid in this encoding.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Self::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                String::from_utf8(body.to_vec()).ok()
            }
            Self::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        }
    }

    /// Encodes text. Returns `None` when a character cannot be represented.
    #[must_use]
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            Self::Utf8 => Some(text.as_bytes().to_vec()),
            Self::Utf8Sig => {
                let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
                out.extend_from_slice(UTF8_BOM);
                out.extend_from_slice(text.as_bytes());
                Some(out)
            }
            Self::Latin1 => text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect(),
            Self::Ascii => text.is_ascii().then(|| text.as_bytes().to_vec()),
            Self::Utf16Le => Some(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Self::Utf16Be => Some(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(Self::Utf8Sig),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "utf-16le" | "utf-16-le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf-16-be" => Ok(Self::Utf16Be),
            _ => Err(Error::config(format!(
                "Unsupported encoding '{s}'. Expected one of: utf-8, utf-8-sig, latin-1, ascii, utf-16le, utf-16be"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("UTF8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("iso_8859_1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert_eq!("utf-16le".parse::<TextEncoding>().unwrap(), TextEncoding::Utf16Le);
        assert!("ebcdic".parse::<TextEncoding>().unwrap_err().is_config());
    }

    #[test]
    fn test_utf8_rejects_invalid_bytes() {
        assert_eq!(TextEncoding::Utf8.decode(b"caf\xC3\xA9").as_deref(), Some("café"));
        assert!(TextEncoding::Utf8.decode(b"\xFF\xFE\x00").is_none());
    }

    #[test]
    fn test_utf8_sig_strips_and_restores_bom() {
        let decoded = TextEncoding::Utf8Sig.decode(b"\xEF\xBB\xBFhello").unwrap();
        assert_eq!(decoded, "hello");
        assert_eq!(TextEncoding::Utf8Sig.encode("hello").unwrap(), b"\xEF\xBB\xBFhello");
    }

    #[test]
    fn test_latin1_covers_high_bytes() {
        let decoded = TextEncoding::Latin1.decode(b"caf\xE9").unwrap();
        assert_eq!(decoded, "café");
        assert_eq!(TextEncoding::Latin1.encode("café").unwrap(), b"caf\xE9");
        assert!(TextEncoding::Latin1.encode("€").is_none());
    }

    #[test]
    fn test_ascii_is_strict() {
        assert!(TextEncoding::Ascii.decode(b"caf\xE9").is_none());
        assert!(TextEncoding::Ascii.encode("café").is_none());
    }

    #[test]
    fn test_utf16_odd_length_is_invalid() {
        assert_eq!(TextEncoding::Utf16Le.decode(b"h\0i\0").as_deref(), Some("hi"));
        assert_eq!(TextEncoding::Utf16Be.decode(b"\0h\0i").as_deref(), Some("hi"));
        assert!(TextEncoding::Utf16Le.decode(b"h\0i").is_none());
    }
}
