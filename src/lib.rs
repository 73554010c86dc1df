//! # edgequake-md2pdf
//!
//! Convert Markdown documents with embedded Mermaid diagrams to PDF.
//!
//! ## Why this crate?
//!
//! Markdown-to-PDF renderers print a ```` ```mermaid ```` block as a code
//! listing. This crate renders every diagram block to an SVG first, swaps the
//! block for an image reference, and only then hands the document to a PDF
//! renderer. All heavy lifting is done by external programs (mermaid-cli,
//! md-to-pdf, pandoc); the crate orchestrates them and reports precisely
//! which step failed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Input    absolute paths, derived output, readable file
//!  ├─ 2. Extract  fenced ```mermaid blocks with their byte spans
//!  ├─ 3. Render   diagram_N.mmd → diagram_N.svg in <dir>/.out/
//!  ├─ 4. Rewrite  block → ![](diagram_N.svg), saved as <stem>.rendered.md
//!  └─ 5. Produce  md-to-pdf, falling back to pandoc → output PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{convert, ConversionConfig, ConversionRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().quiet(true).build()?;
//!     let request = ConversionRequest::new("/docs/design.md", None)?;
//!     let output = convert(&request, &config).await?;
//!     eprintln!(
//!         "{} diagram(s), PDF by the {}: {}",
//!         output.stats.diagram_count,
//!         output.backend,
//!         output.output_path.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `mcp`   | on      | Enables the stdio tool server ([`server`], `md2pdf --serve`) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-md2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Programs
//!
//! | Role | Default | Override |
//! |------|---------|----------|
//! | diagram renderer | `npx -y @mermaid-js/mermaid-cli` | [`ConversionConfigBuilder::diagram_renderer`] |
//! | primary PDF renderer | `npx -y md-to-pdf` | [`ConversionConfigBuilder::pdf_renderer`] |
//! | fallback converter | `pandoc -f gfm` | [`ConversionConfigBuilder::fallback_converter`] |
//!
//! [`check_tools`] reports which of them resolve on `PATH`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "mcp")]
pub mod server;
pub mod session;
pub mod toolchain;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CommandSpec, ConversionConfig, ConversionConfigBuilder, ToolchainConfig};
pub use convert::{convert, convert_file, convert_sync};
pub use error::{CommandError, ErrorKind, Md2PdfError};
pub use output::{ConversionOutput, ConversionStats, PdfBackend, RenderedDiagram};
pub use pipeline::input::ConversionRequest;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{SessionLifecycle, SessionState, ShutdownReason};
pub use toolchain::{check_tools, ToolRole, ToolStatus};
