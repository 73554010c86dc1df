//! Diagram rendering: one external-renderer invocation per block.
//!
//! Each block's body is written to `diagram_<n>.mmd` in the working
//! directory and the configured renderer turns it into `diagram_<n>.svg`.
//! The first failure aborts the whole request: no retry, no partial PDF.
//! Artifacts of blocks rendered before the failure stay on disk.
//!
//! Blocks are independent, so with `concurrency > 1` several renders run at
//! once through an ordered buffered stream. Results still come back in
//! document order, and dropping the stream on the first error kills the
//! renders still in flight.

use crate::config::ConversionConfig;
use crate::error::{CommandError, Md2PdfError};
use crate::output::RenderedDiagram;
use crate::pipeline::command;
use crate::pipeline::extract::DiagramBlock;
use crate::pipeline::workdir::WorkDir;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Render every block, in document order, failing fast.
pub async fn render_diagrams(
    blocks: &[DiagramBlock],
    workdir: &WorkDir,
    config: &ConversionConfig,
) -> Result<Vec<RenderedDiagram>, Md2PdfError> {
    let total = blocks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    info!(
        "Rendering {} diagram(s) with '{}' (concurrency {})",
        total, config.diagram_renderer.program, config.concurrency
    );

    // Boxed so the caller's future stays `Send`.
    let jobs: Vec<BoxFuture<'_, Result<RenderedDiagram, Md2PdfError>>> = blocks
        .iter()
        .map(|block| render_diagram(block, total, workdir, config).boxed())
        .collect();

    stream::iter(jobs)
        .buffered(config.concurrency.max(1))
        .try_collect()
        .await
}

/// Render one block to its image.
pub async fn render_diagram(
    block: &DiagramBlock,
    total: usize,
    workdir: &WorkDir,
    config: &ConversionConfig,
) -> Result<RenderedDiagram, Md2PdfError> {
    let ordinal = block.ordinal;
    let source_path = workdir.diagram_source(ordinal);
    let image_path = workdir.diagram_image(ordinal);

    tokio::fs::write(&source_path, &block.source)
        .await
        .map_err(|e| Md2PdfError::ScratchWriteFailed {
            path: source_path.clone(),
            source: e,
        })?;
    command::remove_stale(&image_path)
        .await
        .map_err(|e| Md2PdfError::ScratchWriteFailed {
            path: image_path.clone(),
            source: e,
        })?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_diagram_start(ordinal, total);
    }

    let spec = &config.diagram_renderer;
    let args = spec.render_args(&source_path, Some(&image_path), &config.theme);
    let result: Result<(), CommandError> = async {
        command::run(
            &spec.program,
            &args,
            Some(workdir.root()),
            config.command_timeout_secs,
        )
        .await?;
        command::expect_file(&spec.program, &image_path).await
    }
    .await;

    if let Err(e) = result {
        if let Some(ref cb) = config.progress_callback {
            cb.on_diagram_error(ordinal, total, &e.to_string());
        }
        return Err(Md2PdfError::RenderFailed { ordinal, source: e });
    }

    debug!("Rendered diagram {} → {}", ordinal, image_path.display());
    if let Some(ref cb) = config.progress_callback {
        cb.on_diagram_complete(ordinal, total, &image_path);
    }

    Ok(RenderedDiagram {
        ordinal,
        reference: workdir.relative_reference(&image_path),
        source_path,
        image_path,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::CommandSpec;
    use crate::pipeline::extract::extract_blocks;

    /// Copies the diagram source into the image path.
    fn copying_renderer() -> CommandSpec {
        CommandSpec::new("sh", ["-c", "cp \"$1\" \"$2\"", "sh", "{input}", "{output}"])
    }

    /// Fails on any source containing `FAIL`.
    fn picky_renderer() -> CommandSpec {
        CommandSpec::new(
            "sh",
            [
                "-c",
                "if grep -q FAIL \"$1\"; then echo 'syntax error' >&2; exit 1; fi; cp \"$1\" \"$2\"",
                "sh",
                "{input}",
                "{output}",
            ],
        )
    }

    async fn setup(doc: &str) -> (tempfile::TempDir, WorkDir, Vec<DiagramBlock>) {
        let dir = tempfile::tempdir().unwrap();
        let wd = WorkDir::for_input(&dir.path().join("doc.md"), ".out");
        wd.ensure().await.unwrap();
        (dir, wd, extract_blocks(doc, "mermaid"))
    }

    #[tokio::test]
    async fn renders_each_block_to_its_own_files() {
        let (_dir, wd, blocks) = setup("```mermaid\nA\n```\n```mermaid\nB\n```\n").await;
        let config = ConversionConfig::builder()
            .diagram_renderer(copying_renderer())
            .build()
            .unwrap();

        let rendered = render_diagrams(&blocks, &wd, &config).await.unwrap();
        assert_eq!(rendered.len(), 2);
        for (i, d) in rendered.iter().enumerate() {
            assert_eq!(d.ordinal, i + 1);
            assert!(d.source_path.is_file());
            assert!(d.image_path.is_file());
            assert_eq!(d.reference, format!("diagram_{}.svg", i + 1));
        }
        assert_eq!(std::fs::read_to_string(&rendered[1].image_path).unwrap(), "B\n");
    }

    #[tokio::test]
    async fn failure_names_offending_ordinal() {
        let (_dir, wd, blocks) =
            setup("```mermaid\nA\n```\n```mermaid\nFAIL\n```\n```mermaid\nC\n```\n").await;
        let config = ConversionConfig::builder()
            .diagram_renderer(picky_renderer())
            .build()
            .unwrap();

        let err = render_diagrams(&blocks, &wd, &config).await.unwrap_err();
        match err {
            Md2PdfError::RenderFailed { ordinal, source } => {
                assert_eq!(ordinal, 2);
                assert!(source.to_string().contains("syntax error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Earlier artifacts stay; later blocks were never rendered.
        assert!(wd.diagram_image(1).is_file());
        assert!(!wd.diagram_image(3).exists());
    }

    #[tokio::test]
    async fn zero_exit_without_image_is_a_failure() {
        let (_dir, wd, blocks) = setup("```mermaid\nA\n```\n").await;
        // A stale image from an earlier run must not mask the failure.
        std::fs::write(wd.diagram_image(1), "<svg/>").unwrap();
        let config = ConversionConfig::builder()
            .diagram_renderer(CommandSpec::new("true", Vec::<String>::new()))
            .build()
            .unwrap();

        let err = render_diagrams(&blocks, &wd, &config).await.unwrap_err();
        assert!(matches!(
            err,
            Md2PdfError::RenderFailed {
                ordinal: 1,
                source: CommandError::MissingOutput { .. }
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_rendering_keeps_document_order() {
        let doc: String = (1..=6).map(|i| format!("```mermaid\nD{i}\n```\n")).collect();
        let (_dir, wd, blocks) = setup(&doc).await;
        let config = ConversionConfig::builder()
            .diagram_renderer(copying_renderer())
            .concurrency(4)
            .build()
            .unwrap();

        let rendered = render_diagrams(&blocks, &wd, &config).await.unwrap();
        let ordinals: Vec<_> = rendered.iter().map(|d| d.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn empty_body_renders_empty_source() {
        let (_dir, wd, blocks) = setup("```mermaid\n```\n").await;
        let config = ConversionConfig::builder()
            .diagram_renderer(copying_renderer())
            .build()
            .unwrap();
        let rendered = render_diagrams(&blocks, &wd, &config).await.unwrap();
        assert_eq!(std::fs::read_to_string(&rendered[0].source_path).unwrap(), "");
    }
}
