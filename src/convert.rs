//! Conversion entry points.
//!
//! One request moves through a fixed sequence of stages and never re-enters
//! one:
//!
//! ```text
//! Extracting → Rendering(1..=N) → Rewriting → ProducingPrimary → [ProducingFallback] → Done
//!      └────────────┴──────────────────┴───────────────┴────────────────┴──────────▶ Failed
//! ```
//!
//! Any stage error is terminal. Artifacts written before the failure stay in
//! the working directory for inspection.

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::input::ConversionRequest;
use crate::pipeline::workdir::WorkDir;
use crate::pipeline::{extract, produce, render, rewrite};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Convert one Markdown document to PDF.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` once the PDF exists at `request.output_path()`.
///
/// # Errors
/// - Input missing or unreadable
/// - Scratch directory or scratch files cannot be written
/// - A diagram fails to render (names the block's ordinal)
/// - Both PDF backends fail ([`Md2PdfError::ConversionFailed`])
pub async fn convert(
    request: &ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();
    let input = request.input_path();
    let output_path = request.output_path();
    info!("Starting conversion: {}", input.display());

    // ── Step 1: Read input ───────────────────────────────────────────────
    request.check_input()?;
    let document = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| Md2PdfError::InputRead {
            path: input.to_path_buf(),
            source: e,
        })?;

    // ── Step 2: Extract diagram blocks ───────────────────────────────────
    let blocks = extract::extract_blocks(&document, &config.diagram_language);
    info!(
        "Found {} '{}' block(s)",
        blocks.len(),
        config.diagram_language
    );

    let workdir = WorkDir::for_input(input, &config.work_dir_name);
    workdir.ensure().await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(blocks.len());
    }

    // ── Step 3: Render diagrams ──────────────────────────────────────────
    let render_start = Instant::now();
    let diagrams = render::render_diagrams(&blocks, &workdir, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    if !diagrams.is_empty() {
        info!(
            "Rendered {} diagram(s) in {}ms",
            diagrams.len(),
            render_duration_ms
        );
    }

    // ── Step 4: Rewrite and persist the intermediate document ────────────
    let rewritten = if blocks.is_empty() {
        document
    } else {
        rewrite::rewrite_document(&document, &blocks, &diagrams)?
    };
    let intermediate = workdir.intermediate_for(input);
    rewrite::write_intermediate(&intermediate, &rewritten).await?;

    // ── Step 5: Produce the PDF ──────────────────────────────────────────
    let pdf_start = Instant::now();
    let backend = produce::produce_pdf(&intermediate, output_path, &workdir, config).await?;
    let pdf_duration_ms = pdf_start.elapsed().as_millis() as u64;

    let stats = ConversionStats {
        diagram_count: diagrams.len(),
        render_duration_ms,
        pdf_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete via {}: {} ({}ms total)",
        backend,
        output_path.display(),
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(output_path, backend);
    }

    if config.quiet {
        debug!("Quiet mode: success line suppressed");
    } else {
        println!("PDF written: {}", output_path.display());
    }

    Ok(ConversionOutput {
        output_path: output_path.to_path_buf(),
        backend,
        intermediate_path: intermediate,
        diagrams,
        stats,
    })
}

/// Convert from plain paths and return the written PDF's path.
///
/// `output` defaults to the input with its extension replaced by `pdf`.
/// Both paths must be absolute.
pub async fn convert_file(
    input: impl AsRef<Path>,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> Result<PathBuf, Md2PdfError> {
    let request = ConversionRequest::new(input.as_ref(), output.map(Path::to_path_buf))?;
    convert(&request, config).await.map(|out| out.output_path)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    request: &ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(request, config))
}
