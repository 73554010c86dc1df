//! Error types for the edgequake-md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`] — **Fatal**: the request cannot produce a PDF (bad path,
//!   a diagram that would not render, both PDF converters failed). Returned
//!   as `Err(Md2PdfError)` from the top-level `convert*` functions.
//!
//! * [`CommandError`] — **One attempt**: a single external program failed.
//!   For the diagram renderer it is wrapped into [`Md2PdfError::RenderFailed`];
//!   for the primary PDF renderer it only triggers the fallback converter, and
//!   surfaces only when the fallback fails too.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md2pdf library.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A request path was relative.
    #[error("{field} must be an absolute path, got '{path}'")]
    NotAbsolute { field: &'static str, path: PathBuf },

    /// Input Markdown file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is a regular file.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input exists but could not be read as UTF-8 text.
    #[error("Failed to read input '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Scratch errors ────────────────────────────────────────────────────
    /// The hidden working directory could not be created.
    #[error("Failed to create working directory '{path}': {source}")]
    WorkDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A diagram source or the intermediate document could not be written.
    #[error("Failed to write scratch file '{path}': {source}")]
    ScratchWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The diagram renderer failed for one block; the request is aborted.
    #[error("Diagram {ordinal} failed to render: {source}")]
    RenderFailed {
        ordinal: usize,
        #[source]
        source: CommandError,
    },

    /// Both the primary renderer and the fallback converter failed.
    #[error(
        "Failed to convert to PDF with both the primary renderer and the fallback converter.\n\
  primary:  {primary}\n  fallback: {fallback}"
    )]
    ConversionFailed {
        primary: CommandError,
        fallback: CommandError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`Md2PdfError`], used at the process and
/// protocol boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any pipeline stage ran; nothing was touched.
    InputValidation,
    /// A diagram could not be rendered.
    Render,
    /// Neither PDF converter produced a file.
    Conversion,
    /// Scratch or output file system failure.
    Io,
    /// Invalid configuration.
    Config,
    Internal,
}

impl Md2PdfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Md2PdfError::NotAbsolute { .. }
            | Md2PdfError::InputNotFound { .. }
            | Md2PdfError::PermissionDenied { .. } => ErrorKind::InputValidation,
            Md2PdfError::RenderFailed { .. } => ErrorKind::Render,
            Md2PdfError::ConversionFailed { .. } => ErrorKind::Conversion,
            Md2PdfError::InputRead { .. }
            | Md2PdfError::WorkDirFailed { .. }
            | Md2PdfError::ScratchWriteFailed { .. }
            | Md2PdfError::OutputWriteFailed { .. } => ErrorKind::Io,
            Md2PdfError::InvalidConfig(_) => ErrorKind::Config,
            Md2PdfError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Process exit status for direct-conversion mode.
    ///
    /// `2` when both PDF converters failed, `1` for everything else.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Conversion => 2,
            _ => 1,
        }
    }
}

/// Failure of a single external-program invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandError {
    /// The program is not installed or not on `PATH`.
    #[error("'{program}' was not found on PATH")]
    NotFound { program: String },

    /// The OS refused to start the program.
    #[error("'{program}' could not be started: {detail}")]
    SpawnFailed { program: String, detail: String },

    /// The program exited unsuccessfully.
    #[error("'{program}' exited with {}: {stderr}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program reported success but did not write its output file.
    #[error("'{program}' did not produce the expected output '{path}'")]
    MissingOutput { program: String, path: PathBuf },

    /// The program ran past the configured timeout and was killed.
    #[error("'{program}' timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },
}

impl CommandError {
    /// Name of the program that failed.
    pub fn program(&self) -> &str {
        match self {
            CommandError::NotFound { program }
            | CommandError::SpawnFailed { program, .. }
            | CommandError::ExitStatus { program, .. }
            | CommandError::MissingOutput { program, .. }
            | CommandError::TimedOut { program, .. } => program,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_failed_names_ordinal() {
        let e = Md2PdfError::RenderFailed {
            ordinal: 3,
            source: CommandError::ExitStatus {
                program: "npx".into(),
                code: Some(1),
                stderr: "Parse error on line 2".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("Diagram 3"), "got: {msg}");
        assert!(msg.contains("Parse error"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Render);
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn conversion_failed_reports_both_attempts() {
        let e = Md2PdfError::ConversionFailed {
            primary: CommandError::NotFound {
                program: "npx".into(),
            },
            fallback: CommandError::NotFound {
                program: "pandoc".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("npx"), "got: {msg}");
        assert!(msg.contains("pandoc"), "got: {msg}");
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn exit_status_display_without_code() {
        let e = CommandError::ExitStatus {
            program: "pandoc".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(e.to_string().contains("a signal"));
        assert_eq!(e.program(), "pandoc");
    }

    #[test]
    fn validation_errors_are_classified() {
        let e = Md2PdfError::NotAbsolute {
            field: "inputPath",
            path: "doc.md".into(),
        };
        assert_eq!(e.kind(), ErrorKind::InputValidation);
        assert!(e.to_string().contains("inputPath"));
    }
}
