//! Diagram source normalization
//!
//! Turns raw request bytes into a canonical [`DiagramSource`]. Two sources
//! that differ only in line endings, trailing whitespace or surrounding blank
//! lines normalize to byte-identical text, which keeps fingerprints stable.

use super::error::NormalizationError;
use super::types::{DiagramSource, OutputFormat, SourceEncoding};

/// Default maximum raw source size (1 MiB)
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Validates and canonicalizes raw diagram text
#[derive(Debug, Clone)]
pub struct Normalizer {
    max_source_bytes: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SOURCE_BYTES)
    }
}

impl Normalizer {
    pub fn new(max_source_bytes: usize) -> Self {
        Self { max_source_bytes }
    }

    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    /// Normalize raw bytes for the given output format
    pub fn normalize(
        &self,
        raw: &[u8],
        format: OutputFormat,
    ) -> Result<DiagramSource, NormalizationError> {
        if raw.len() > self.max_source_bytes {
            return Err(NormalizationError::PayloadTooLarge {
                size: raw.len(),
                max: self.max_source_bytes,
            });
        }

        let (decoded, encoding) = decode(raw)?;
        let text = canonicalize(&decoded)?;

        Ok(DiagramSource::new(text, encoding, format))
    }
}

/// Detect the encoding from a BOM and decode to a `String`
fn decode(raw: &[u8]) -> Result<(String, SourceEncoding), NormalizationError> {
    if let Some(rest) = raw.strip_prefix(UTF8_BOM) {
        let text = std::str::from_utf8(rest)
            .map_err(|e| NormalizationError::InvalidEncoding(e.to_string()))?;
        return Ok((text.to_string(), SourceEncoding::Utf8Bom));
    }

    if let Some(rest) = raw.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes).map(|t| (t, SourceEncoding::Utf16Le));
    }

    if let Some(rest) = raw.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes).map(|t| (t, SourceEncoding::Utf16Be));
    }

    let text =
        std::str::from_utf8(raw).map_err(|e| NormalizationError::InvalidEncoding(e.to_string()))?;
    Ok((text.to_string(), SourceEncoding::Utf8))
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> Result<String, NormalizationError> {
    if bytes.len() % 2 != 0 {
        return Err(NormalizationError::InvalidEncoding(
            "odd number of bytes in UTF-16 input".to_string(),
        ));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| read([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&units).map_err(|e| NormalizationError::InvalidEncoding(e.to_string()))
}

/// Canonical whitespace and `@start`/`@end` framing
fn canonicalize(text: &str) -> Result<String, NormalizationError> {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    let body = match (first, last) {
        (Some(first), Some(last)) => &lines[first..=last],
        _ => return Err(NormalizationError::EmptySource),
    };

    let joined = body.join("\n");

    if has_start_directive(body[0]) {
        Ok(joined)
    } else {
        Ok(format!("@startuml\n{}\n@enduml", joined))
    }
}

fn has_start_directive(first_line: &str) -> bool {
    first_line
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("@start"))
}
