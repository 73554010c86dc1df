//! Result types returned by a successful conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which external program produced the final PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfBackend {
    /// The Markdown-to-PDF renderer (md-to-pdf by default).
    Primary,
    /// The generic document converter (pandoc by default).
    Fallback,
}

impl fmt::Display for PdfBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfBackend::Primary => f.write_str("primary renderer"),
            PdfBackend::Fallback => f.write_str("fallback converter"),
        }
    }
}

/// One diagram block after its image was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDiagram {
    /// 1-based position among diagram blocks, in document order.
    pub ordinal: usize,
    /// Scratch file holding the block body.
    pub source_path: PathBuf,
    /// Image written by the diagram renderer.
    pub image_path: PathBuf,
    /// `image_path` relative to the working directory, `/`-separated.
    pub reference: String,
}

impl RenderedDiagram {
    /// The Markdown line that replaces the block.
    pub fn image_markdown(&self) -> String {
        format!("![]({})", self.reference)
    }
}

/// Timing and count statistics for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Diagram blocks found (and rendered).
    pub diagram_count: usize,
    /// Wall-clock time spent in the diagram renderer.
    pub render_duration_ms: u64,
    /// Wall-clock time spent producing the PDF, including a failed primary attempt.
    pub pdf_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful conversion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Absolute path of the final PDF; always the requested (or derived) path.
    pub output_path: PathBuf,
    /// Program that produced the PDF.
    pub backend: PdfBackend,
    /// Rewritten document handed to the PDF backends.
    pub intermediate_path: PathBuf,
    /// Rendered diagrams in document order.
    pub diagrams: Vec<RenderedDiagram>,
    pub stats: ConversionStats,
}
