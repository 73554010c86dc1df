//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, runs one conversion, serves the tool over stdio, or
//! checks the external toolchain.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::pipeline::input::absolutize;
use edgequake_md2pdf::{
    check_tools, convert, ConversionConfig, ConversionProgressCallback, ConversionRequest,
    Md2PdfError, PdfBackend, ProgressCallback, ToolchainConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress: one spinner line plus a log line per diagram and per
/// PDF backend attempt. Diagram events may arrive out of order when
/// rendering concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading Markdown…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_for(&self, ordinal: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&ordinal))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_diagrams: usize) {
        self.bar.set_prefix("Rendering");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_diagrams} diagram(s)"))
        ));
    }

    fn on_diagram_start(&self, ordinal: usize, total: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(ordinal, Instant::now());
        }
        self.bar.set_message(format!("diagram {ordinal}/{total}"));
    }

    fn on_diagram_complete(&self, ordinal: usize, total: usize, image_path: &Path) {
        let name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}  {:<16}  {}",
            green("✓"),
            ordinal,
            total,
            dim(&name),
            self.elapsed_for(ordinal),
        ));
    }

    fn on_diagram_error(&self, ordinal: usize, total: usize, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}  {}  {}",
            red("✗"),
            ordinal,
            total,
            red(first_line),
            self.elapsed_for(ordinal),
        ));
        self.bar.finish_and_clear();
    }

    fn on_pdf_start(&self, backend: PdfBackend) {
        self.bar.set_prefix("Producing");
        self.bar.set_message(format!("PDF via {backend}…"));
    }

    fn on_pdf_error(&self, backend: PdfBackend, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {} failed: {}",
            match backend {
                PdfBackend::Primary => cyan("⚠"),
                PdfBackend::Fallback => red("✗"),
            },
            backend,
            dim(first_line)
        ));
        if backend == PdfBackend::Fallback {
            self.bar.finish_and_clear();
        }
    }

    fn on_conversion_complete(&self, _output_path: &Path, backend: PdfBackend) {
        self.bar.finish_and_clear();
        eprintln!("{} PDF produced by the {}", green("✔"), backend);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert, writing README.pdf beside README.md
  md2pdf README.md

  # Explicit output path (parent directories are created)
  md2pdf docs/design.md build/design.pdf

  # Render four diagrams at once and give up on any tool after 2 minutes
  md2pdf --concurrency 4 --timeout 120 architecture.md

  # Machine-readable result
  md2pdf --json notes.md > result.json

  # Serve the convert_markdown_to_pdf tool over stdio
  md2pdf --serve --idle-timeout 600

  # Is the toolchain installed?
  md2pdf --check-tools

TOOLCHAIN:
  diagram renderer     npx -y @mermaid-js/mermaid-cli -i {input} -o {output} -t {theme}
  primary PDF renderer npx -y md-to-pdf {input}
  fallback converter   pandoc -f gfm -o {output} {input}

  Override any of them with a JSON file passed to --tools:
    { "fallback_converter": { "program": "pandoc",
                              "args": ["--pdf-engine=xelatex", "-o", "{output}", "{input}"] } }

ARTIFACTS:
  Diagram sources, images and the rewritten document are kept in a hidden
  .out/ directory beside the input for inspection.

EXIT STATUS:
  0  PDF written
  1  invalid input, diagram render failure, or any other error
  2  both PDF backends failed
"#;

/// Convert Markdown with Mermaid diagrams to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown with Mermaid diagrams to PDF",
    long_about = "Convert a Markdown document to PDF. Every ```mermaid block is rendered to SVG \
with mermaid-cli and embedded as an image; the PDF is produced with md-to-pdf, falling back to \
pandoc. Can also run as a stdio tool server for agents (--serve).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to convert.
    #[arg(required_unless_present_any = ["serve", "check_tools"])]
    input: Option<PathBuf>,

    /// PDF to write. Default: the input path with a .pdf extension.
    output: Option<PathBuf>,

    /// Serve the convert_markdown_to_pdf tool over stdin/stdout.
    #[arg(long, env = "MD2PDF_SERVE", conflicts_with_all = ["input", "check_tools"])]
    serve: bool,

    /// Stop serving after this many idle seconds (0 = never).
    #[arg(long, env = "MD2PDF_IDLE_TIMEOUT", default_value_t = 0)]
    idle_timeout: u64,

    /// Report whether each configured external program is on PATH, then exit.
    #[arg(long, conflicts_with = "input")]
    check_tools: bool,

    /// JSON file overriding the external programs and their arguments.
    #[arg(long, env = "MD2PDF_TOOLS")]
    tools: Option<PathBuf>,

    /// Diagram theme passed to the renderer.
    #[arg(long, env = "MD2PDF_THEME", default_value = "neutral")]
    theme: String,

    /// Fence info-string tag that marks a diagram block.
    #[arg(long, env = "MD2PDF_LANGUAGE", default_value = "mermaid")]
    language: String,

    /// Name of the scratch directory created beside the input.
    #[arg(long, env = "MD2PDF_WORK_DIR", default_value = ".out")]
    work_dir: String,

    /// Diagrams rendered at once.
    #[arg(short, long, env = "MD2PDF_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..=64))]
    concurrency: u32,

    /// Kill any external program after this many seconds (0 = no limit).
    #[arg(long, env = "MD2PDF_TIMEOUT", default_value_t = 0)]
    timeout: u64,

    /// Print the conversion result (or tool check) as JSON on stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress the success line and all logs except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", red("✘"), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Logs always go to stderr: stdout carries the success line, JSON, or the
/// tool protocol.
fn init_tracing(cli: &Cli) {
    // The spinner gives all the feedback that matters; keep INFO logs out of its way.
    let show_progress = shows_progress(cli);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn shows_progress(cli: &Cli) -> bool {
    !cli.quiet && !cli.no_progress && !cli.json && !cli.serve && !cli.check_tools
}

/// Exit status 2 is reserved for "both PDF backends failed".
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<Md2PdfError>())
        .map_or(1, |e| u8::try_from(e.exit_code()).unwrap_or(1))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.check_tools {
        let config = build_config(&cli, None).await?;
        return report_tools(&config, cli.json);
    }

    if cli.serve {
        let config = build_config(&cli, None).await?;
        return serve(config, cli.idle_timeout).await;
    }

    // ── Resolve paths ────────────────────────────────────────────────────
    let input = cli
        .input
        .as_deref()
        .context("An input Markdown file is required")?;
    let input = absolutize(input).context("Invalid input path")?;
    let output = cli
        .output
        .as_deref()
        .map(absolutize)
        .transpose()
        .context("Invalid output path")?;
    let request = ConversionRequest::new(input, output).context("Invalid request")?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if shows_progress(&cli) {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert(&request, &config)
        .await
        .with_context(|| format!("Failed to convert {}", request.input_path().display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "   {} diagram(s)  {}ms render  {}ms PDF  {}ms total",
            output.stats.diagram_count,
            dim(&output.stats.render_duration_ms.to_string()),
            dim(&output.stats.pdf_duration_ms.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let tools = match cli.tools {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read toolchain file {:?}", path))?;
            ToolchainConfig::from_json(&text)
                .with_context(|| format!("Invalid toolchain file {:?}", path))?
        }
        None => ToolchainConfig::default(),
    };

    let mut builder = ConversionConfig::builder()
        .toolchain(tools)
        .diagram_language(&cli.language)
        .work_dir_name(&cli.work_dir)
        .theme(&cli.theme)
        .concurrency(cli.concurrency as usize)
        .command_timeout_secs(cli.timeout)
        // JSON mode keeps stdout for the JSON document alone.
        .quiet(cli.quiet || cli.json);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn report_tools(config: &ConversionConfig, json: bool) -> Result<ExitCode> {
    let statuses = check_tools(config);
    let missing = statuses.iter().filter(|s| !s.is_available()).count();

    if json {
        let out = serde_json::to_string_pretty(&statuses).context("Failed to serialise tools")?;
        println!("{out}");
    } else {
        for s in &statuses {
            match s.resolved {
                Some(ref path) => println!(
                    "{} {:<20} {:<10} {}",
                    green("✓"),
                    s.role.label(),
                    s.program,
                    dim(&path.display().to_string())
                ),
                None => println!(
                    "{} {:<20} {:<10} {}",
                    red("✗"),
                    s.role.label(),
                    s.program,
                    red("not found on PATH")
                ),
            }
        }
    }

    Ok(if missing == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(feature = "mcp")]
async fn serve(config: ConversionConfig, idle_timeout: u64) -> Result<ExitCode> {
    let idle = (idle_timeout > 0).then(|| Duration::from_secs(idle_timeout));
    let reason = edgequake_md2pdf::server::run_stdio(config, idle)
        .await
        .context("Tool server failed")?;
    tracing::info!(?reason, "Exiting");
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "mcp"))]
async fn serve(_config: ConversionConfig, _idle_timeout: u64) -> Result<ExitCode> {
    anyhow::bail!("md2pdf was built without the `mcp` feature; --serve is unavailable")
}
