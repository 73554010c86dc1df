//! Document rewriting: swap each diagram block for its image reference.
//!
//! Replacement works on the byte spans recorded during extraction, not on
//! text search, so two byte-identical blocks each get their own image. The
//! text between spans is copied through untouched.

use crate::error::Md2PdfError;
use crate::output::RenderedDiagram;
use crate::pipeline::extract::DiagramBlock;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rebuild `document` with each `(span, replacement)` applied.
///
/// Spans must be sorted, non-overlapping, and lie on `char` boundaries;
/// anything else is a bug in the caller and reported as
/// [`Md2PdfError::Internal`].
pub fn replace_spans(
    document: &str,
    replacements: &[(Range<usize>, String)],
) -> Result<String, Md2PdfError> {
    let extra: usize = replacements.iter().map(|(_, r)| r.len()).sum();
    let mut out = String::with_capacity(document.len() + extra);
    let mut cursor = 0;

    for (span, replacement) in replacements {
        if span.start < cursor || span.end < span.start {
            return Err(Md2PdfError::Internal(format!(
                "replacement span {}..{} overlaps or is out of order",
                span.start, span.end
            )));
        }
        let before = document.get(cursor..span.start).ok_or_else(|| {
            Md2PdfError::Internal(format!("span {}..{} is out of bounds", span.start, span.end))
        })?;
        document.get(span.clone()).ok_or_else(|| {
            Md2PdfError::Internal(format!("span {}..{} is out of bounds", span.start, span.end))
        })?;
        out.push_str(before);
        out.push_str(replacement);
        cursor = span.end;
    }

    out.push_str(&document[cursor..]);
    Ok(out)
}

/// Replace each extracted block with its rendered image line.
///
/// `blocks` and `diagrams` are matched by ordinal.
pub fn rewrite_document(
    document: &str,
    blocks: &[DiagramBlock],
    diagrams: &[RenderedDiagram],
) -> Result<String, Md2PdfError> {
    let replacements = blocks
        .iter()
        .map(|block| {
            diagrams
                .iter()
                .find(|d| d.ordinal == block.ordinal)
                .map(|d| (block.span.clone(), d.image_markdown()))
                .ok_or_else(|| {
                    Md2PdfError::Internal(format!("no rendered image for diagram {}", block.ordinal))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    replace_spans(document, &replacements)
}

/// Persist the intermediate document, overwriting any previous run.
pub async fn write_intermediate(path: &Path, text: &str) -> Result<PathBuf, Md2PdfError> {
    tokio::fs::write(path, text)
        .await
        .map_err(|e| Md2PdfError::ScratchWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Wrote intermediate document: {}", path.display());
    Ok(path.to_path_buf())
}
