//! Diagram value types
//!
//! Format-independent values that flow through the render pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::NormalizationError;

/// Requested output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
    Pdf,
    Txt,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Svg,
        OutputFormat::Png,
        OutputFormat::Pdf,
        OutputFormat::Txt,
    ];

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Png => "image/png",
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Txt => "text/plain; charset=utf-8",
        }
    }

    /// Lowercase name, also used as the PlantUML `-t` flag value
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = NormalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(OutputFormat::Svg),
            "png" => Ok(OutputFormat::Png),
            "pdf" => Ok(OutputFormat::Pdf),
            "txt" => Ok(OutputFormat::Txt),
            _ => Err(NormalizationError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Encoding detected on the raw request bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

/// Normalized diagram source, ready to fingerprint and render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource {
    text: String,
    encoding: SourceEncoding,
    format: OutputFormat,
}

impl DiagramSource {
    pub(crate) fn new(text: String, encoding: SourceEncoding, format: OutputFormat) -> Self {
        Self {
            text,
            encoding,
            format,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// A successfully rendered artifact
///
/// Shared read-only (behind `Arc`) by every requester of the same fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDiagram {
    pub data: Vec<u8>,
    pub content_type: String,
    pub format: OutputFormat,
    pub render_duration: Duration,
    pub rendered_at: DateTime<Utc>,
}

impl RenderedDiagram {
    pub fn new(data: Vec<u8>, format: OutputFormat, render_duration: Duration) -> Self {
        Self {
            data,
            content_type: format.content_type().to_string(),
            format,
            render_duration,
            rendered_at: Utc::now(),
        }
    }

    /// Size used for cache accounting
    pub fn size(&self) -> usize {
        self.data.len() + self.content_type.len()
    }
}
