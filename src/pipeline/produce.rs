//! PDF production: primary renderer, then fallback converter.
//!
//! ```text
//! intermediate.md ──▶ primary (md-to-pdf) ──▶ <stem>.pdf beside it ──▶ atomic copy ──▶ output
//!        │                  │ fails / no file
//!        │                  ▼
//!        └──────────▶ fallback (pandoc) ─────────────────────────────────▶ output
//! ```
//!
//! The primary renderer picks its own output name, so success is judged by
//! the expected file existing, not by the exit status alone. The fallback
//! writes into a staging directory beside the output and its file is renamed
//! over the output only once it exists, so an earlier run's PDF can neither
//! pass for fresh output nor be left half-overwritten. Both backends run with
//! the working directory as their current directory so relative image
//! references resolve.
//!
//! Once the primary renderer has produced its PDF, failing to copy it to the
//! output path is an [`Md2PdfError::OutputWriteFailed`]; the fallback is not
//! tried, since it would have to write to the same place.

use crate::config::{CommandSpec, ConversionConfig};
use crate::error::{CommandError, Md2PdfError};
use crate::output::PdfBackend;
use crate::pipeline::command;
use crate::pipeline::workdir::WorkDir;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Produce `output` from `intermediate`, returning the backend that succeeded.
pub async fn produce_pdf(
    intermediate: &Path,
    output: &Path,
    workdir: &WorkDir,
    config: &ConversionConfig,
) -> Result<PdfBackend, Md2PdfError> {
    notify_start(config, PdfBackend::Primary);
    let primary = match run_primary(intermediate, workdir, config).await {
        Ok(produced) => {
            place_output(&produced, output).await?;
            info!("PDF produced by primary renderer '{}'", config.pdf_renderer.program);
            return Ok(PdfBackend::Primary);
        }
        Err(e) => e,
    };

    warn!("Primary PDF renderer failed, trying fallback: {}", primary);
    notify_error(config, PdfBackend::Primary, &primary);

    notify_start(config, PdfBackend::Fallback);
    match run_fallback(intermediate, output, workdir, config).await {
        Ok(()) => {
            info!(
                "PDF produced by fallback converter '{}'",
                config.fallback_converter.program
            );
            Ok(PdfBackend::Fallback)
        }
        Err(FallbackError::Io(e)) => Err(e),
        Err(FallbackError::Command(fallback)) => {
            notify_error(config, PdfBackend::Fallback, &fallback);
            Err(Md2PdfError::ConversionFailed { primary, fallback })
        }
    }
}

/// Where the primary renderer writes its PDF: `<intermediate stem>.pdf`.
pub fn primary_output_for(intermediate: &Path) -> PathBuf {
    intermediate.with_extension("pdf")
}

async fn run_primary(
    intermediate: &Path,
    workdir: &WorkDir,
    config: &ConversionConfig,
) -> Result<PathBuf, CommandError> {
    let spec = &config.pdf_renderer;
    let expected = primary_output_for(intermediate);

    if let Err(e) = command::remove_stale(&expected).await {
        // Could not clear the old file; a later existence check would be meaningless.
        return Err(CommandError::SpawnFailed {
            program: spec.program.clone(),
            detail: format!("cannot remove stale '{}': {e}", expected.display()),
        });
    }

    invoke(spec, intermediate, &expected, workdir, config).await?;
    command::expect_file(&spec.program, &expected).await?;
    debug!("Primary renderer wrote {}", expected.display());
    Ok(expected)
}

enum FallbackError {
    Io(Md2PdfError),
    Command(CommandError),
}

async fn run_fallback(
    intermediate: &Path,
    output: &Path,
    workdir: &WorkDir,
    config: &ConversionConfig,
) -> Result<(), FallbackError> {
    let spec = &config.fallback_converter;
    ensure_parent(output).await.map_err(FallbackError::Io)?;

    // The converter writes into a fresh staging directory beside the output,
    // keeping the file name so the extension still selects the format.
    let staging = staging_dir(output).map_err(FallbackError::Io)?;
    let staged = staging
        .path()
        .join(output.file_name().unwrap_or_else(|| OsStr::new("output.pdf")));

    invoke(spec, intermediate, &staged, workdir, config)
        .await
        .map_err(FallbackError::Command)?;
    command::expect_file(&spec.program, &staged)
        .await
        .map_err(FallbackError::Command)?;

    tokio::fs::rename(&staged, output)
        .await
        .map_err(|e| {
            FallbackError::Io(Md2PdfError::OutputWriteFailed {
                path: output.to_path_buf(),
                source: e,
            })
        })?;
    debug!("Fallback converter wrote {}", output.display());
    Ok(())
}

fn staging_dir(output: &Path) -> Result<tempfile::TempDir, Md2PdfError> {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new()
        .prefix(".md2pdf-")
        .tempdir_in(dir)
        .map_err(|e| Md2PdfError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })
}

async fn invoke(
    spec: &CommandSpec,
    input: &Path,
    output: &Path,
    workdir: &WorkDir,
    config: &ConversionConfig,
) -> Result<(), CommandError> {
    let args = spec.render_args(input, Some(output), &config.theme);
    command::run(
        &spec.program,
        &args,
        Some(workdir.root()),
        config.command_timeout_secs,
    )
    .await
    .map(|_| ())
}

/// Copy `produced` to `output` atomically: temp file in the destination
/// directory, then rename over the target.
async fn place_output(produced: &Path, output: &Path) -> Result<(), Md2PdfError> {
    ensure_parent(output).await?;

    let from = produced.to_path_buf();
    let to = output.to_path_buf();
    tokio::task::spawn_blocking(move || copy_atomic(&from, &to))
        .await
        .map_err(|e| Md2PdfError::Internal(format!("Copy task panicked: {e}")))?
        .map_err(|e| Md2PdfError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;

    debug!("Copied {} → {}", produced.display(), output.display());
    Ok(())
}

fn copy_atomic(from: &Path, to: &Path) -> std::io::Result<()> {
    let dir = to.parent().unwrap_or_else(|| Path::new("."));
    let mut src = std::fs::File::open(from)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".md2pdf-")
        .suffix(".pdf.tmp")
        .tempfile_in(dir)?;
    std::io::copy(&mut src, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(to).map_err(|e| e.error)?;
    Ok(())
}

async fn ensure_parent(output: &Path) -> Result<(), Md2PdfError> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Md2PdfError::OutputWriteFailed {
                path: output.to_path_buf(),
                source: e,
            })?;
    }
    Ok(())
}

fn notify_start(config: &ConversionConfig, backend: PdfBackend) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_pdf_start(backend);
    }
}

fn notify_error(config: &ConversionConfig, backend: PdfBackend, error: &CommandError) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_pdf_error(backend, &error.to_string());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Writes `<stem>.pdf` beside its input, like md-to-pdf.
    fn sibling_renderer() -> CommandSpec {
        CommandSpec::new(
            "sh",
            ["-c", "printf 'PRIMARY' > \"${1%.md}.pdf\"", "sh", "{input}"],
        )
    }

    /// Writes straight to the output path, like pandoc.
    fn direct_converter() -> CommandSpec {
        CommandSpec::new(
            "sh",
            ["-c", "printf 'FALLBACK' > \"$2\"", "sh", "{input}", "{output}"],
        )
    }

    fn failing() -> CommandSpec {
        CommandSpec::new("sh", ["-c", "echo 'engine missing' >&2; exit 4"])
    }

    async fn setup() -> (tempfile::TempDir, WorkDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let wd = WorkDir::for_input(&dir.path().join("doc.md"), ".out");
        wd.ensure().await.unwrap();
        let intermediate = wd.intermediate_for(&dir.path().join("doc.md"));
        std::fs::write(&intermediate, "# Doc\n").unwrap();
        (dir, wd, intermediate)
    }

    fn config(primary: CommandSpec, fallback: CommandSpec) -> ConversionConfig {
        ConversionConfig::builder()
            .pdf_renderer(primary)
            .fallback_converter(fallback)
            .build()
            .unwrap()
    }

    #[test]
    fn primary_output_sits_beside_intermediate() {
        assert_eq!(
            primary_output_for(Path::new("/d/.out/doc.rendered.md")),
            PathBuf::from("/d/.out/doc.rendered.pdf")
        );
    }

    #[tokio::test]
    async fn primary_success_copies_into_new_directory() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("nested/out/doc.pdf");
        let cfg = config(sibling_renderer(), failing());

        let backend = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap();
        assert_eq!(backend, PdfBackend::Primary);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "PRIMARY");
    }

    #[tokio::test]
    async fn primary_zero_exit_without_file_falls_back() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("doc.pdf");
        let cfg = config(CommandSpec::new("true", Vec::<String>::new()), direct_converter());

        let backend = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap();
        assert_eq!(backend, PdfBackend::Fallback);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "FALLBACK");
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("sub/doc.pdf");
        let cfg = config(failing(), direct_converter());

        let backend = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap();
        assert_eq!(backend, PdfBackend::Fallback);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "FALLBACK");
    }

    #[tokio::test]
    async fn both_failing_is_conversion_failure() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("doc.pdf");
        let cfg = config(failing(), CommandSpec::new("true", Vec::<String>::new()));

        let err = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap_err();
        match err {
            Md2PdfError::ConversionFailed { primary, fallback } => {
                assert!(matches!(primary, CommandError::ExitStatus { code: Some(4), .. }));
                assert!(matches!(fallback, CommandError::MissingOutput { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn stale_primary_output_does_not_mask_failure() {
        let (dir, wd, intermediate) = setup().await;
        std::fs::write(primary_output_for(&intermediate), "OLD").unwrap();
        let output = dir.path().join("doc.pdf");
        let cfg = config(failing(), direct_converter());

        let backend = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap();
        assert_eq!(backend, PdfBackend::Fallback);
        assert!(!primary_output_for(&intermediate).exists());
    }

    #[tokio::test]
    async fn fallback_without_output_does_not_reuse_previous_pdf() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("doc.pdf");
        std::fs::write(&output, "PDF FROM LAST RUN").unwrap();
        let cfg = config(failing(), CommandSpec::new("true", Vec::<String>::new()));

        let err = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            Md2PdfError::ConversionFailed {
                fallback: CommandError::MissingOutput { .. },
                ..
            }
        ));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "PDF FROM LAST RUN");
        assert_no_staging_left(dir.path());
    }

    #[tokio::test]
    async fn failing_fallback_leaves_existing_pdf_intact() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("doc.pdf");
        std::fs::write(&output, "PDF FROM LAST RUN").unwrap();
        let partial = CommandSpec::new(
            "sh",
            ["-c", "printf 'trunc' > \"$2\"; exit 3", "sh", "{input}", "{output}"],
        );
        let cfg = config(failing(), partial);

        let err = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::ConversionFailed { .. }));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "PDF FROM LAST RUN");
        assert_no_staging_left(dir.path());
    }

    #[tokio::test]
    async fn fallback_replaces_previous_pdf() {
        let (dir, wd, intermediate) = setup().await;
        let output = dir.path().join("doc.pdf");
        std::fs::write(&output, "PDF FROM LAST RUN").unwrap();
        let cfg = config(failing(), direct_converter());

        let backend = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap();
        assert_eq!(backend, PdfBackend::Fallback);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "FALLBACK");
        assert_no_staging_left(dir.path());
    }

    #[tokio::test]
    async fn primary_copy_failure_is_an_output_error() {
        let (dir, wd, intermediate) = setup().await;
        // The output's parent is a regular file, so nothing can be placed there.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let output = blocker.join("doc.pdf");
        let cfg = config(sibling_renderer(), direct_converter());

        let err = produce_pdf(&intermediate, &output, &wd, &cfg).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::OutputWriteFailed { .. }));
    }

    fn assert_no_staging_left(dir: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".md2pdf-"))
            .collect();
        assert!(leftovers.is_empty(), "staging left behind: {leftovers:?}");
    }
}
