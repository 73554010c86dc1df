//! Block extraction: locate fenced diagram blocks in raw Markdown.
//!
//! The scan is line-oriented and only understands fences; it does not build
//! a Markdown AST. Every fenced block is tracked (so a ```` ```mermaid ````
//! line quoted inside a ```` ```text ```` block is left alone), but only
//! blocks whose info string starts with the diagram language are returned.
//!
//! Malformed input is handled leniently: an unterminated fence simply ends
//! the scan, and nothing after it is matched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// Up to three spaces, a run of ≥3 backticks or tildes, then the info string.
static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^( {0,3})(`{3,}|~{3,})(.*)$").unwrap());

/// A closing fence carries nothing but optional trailing whitespace.
static RE_FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*$").unwrap());

/// One fenced diagram block, as found in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// 1-based position among diagram blocks, in document order.
    pub ordinal: usize,
    /// Text strictly between the fence lines, line terminators included.
    pub source: String,
    /// Byte range of the block in the document: from the opening fence's
    /// first character to the end of the closing fence line (terminator
    /// excluded). Indentation before the opening fence is outside the span.
    pub span: Range<usize>,
    /// `document[span]`, fence markers included.
    pub original_token: String,
}

struct OpenFence {
    marker: char,
    len: usize,
    token_start: usize,
    body_start: usize,
    is_diagram: bool,
}

/// Extract every complete diagram block whose info string names `language`.
///
/// Ordinals are assigned in scan order, starting at 1.
pub fn extract_blocks(document: &str, language: &str) -> Vec<DiagramBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<OpenFence> = None;
    let mut offset = 0;

    for raw_line in document.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);

        match open.take() {
            None => open = parse_opening(line, line_start, offset, language),
            Some(fence) => {
                if !closes(line, &fence) {
                    open = Some(fence);
                    continue;
                }
                if fence.is_diagram {
                    let span = fence.token_start..line_start + line.len();
                    let block = DiagramBlock {
                        ordinal: blocks.len() + 1,
                        source: document[fence.body_start..line_start].to_string(),
                        original_token: document[span.clone()].to_string(),
                        span,
                    };
                    debug!(
                        "Found diagram {} at bytes {}..{}",
                        block.ordinal, block.span.start, block.span.end
                    );
                    blocks.push(block);
                }
            }
        }
    }

    if let Some(fence) = open {
        debug!(
            "Unterminated {} fence opened at byte {}; ignoring the rest of the document",
            if fence.is_diagram { "diagram" } else { "code" },
            fence.token_start
        );
    }

    blocks
}

fn parse_opening(
    line: &str,
    line_start: usize,
    next_line_start: usize,
    language: &str,
) -> Option<OpenFence> {
    let caps = RE_FENCE_OPEN.captures(line)?;
    let indent = caps.get(1).map_or(0, |m| m.len());
    let run = caps.get(2)?.as_str();
    let info = caps.get(3).map_or("", |m| m.as_str()).trim();
    let marker = run.chars().next()?;

    // A backtick fence's info string may not itself contain backticks
    // (that is inline code, not a fence).
    if marker == '`' && info.contains('`') {
        return None;
    }

    let is_diagram = info
        .split(|c: char| c.is_whitespace() || c == '{')
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case(language));

    Some(OpenFence {
        marker,
        len: run.len(),
        token_start: line_start + indent,
        body_start: next_line_start,
        is_diagram,
    })
}

fn closes(line: &str, fence: &OpenFence) -> bool {
    RE_FENCE_CLOSE.captures(line).is_some_and(|caps| {
        let run = &caps[1];
        run.starts_with(fence.marker) && run.len() >= fence.len
    })
}
