//! Input resolution: validate the request paths before any stage runs.
//!
//! Validation happens in two steps so that the cheap, pure check can run
//! before the file system is touched at all:
//!
//! 1. [`ConversionRequest::new`] — both paths absolute, output derived when absent
//! 2. [`ConversionRequest::check_input`] — the input exists, is a file, is readable

use crate::error::Md2PdfError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    input_path: PathBuf,
    output_path: PathBuf,
}

impl ConversionRequest {
    /// Build a request from caller-supplied paths.
    ///
    /// Both paths must be absolute. When `output_path` is `None` it is
    /// derived from the input by replacing its extension with `pdf`.
    /// Does not touch the file system.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: Option<PathBuf>,
    ) -> Result<Self, Md2PdfError> {
        let input_path = input_path.into();
        if !input_path.is_absolute() {
            return Err(Md2PdfError::NotAbsolute {
                field: "inputPath",
                path: input_path,
            });
        }

        let output_path = match output_path {
            Some(p) if !p.is_absolute() => {
                return Err(Md2PdfError::NotAbsolute {
                    field: "outputPath",
                    path: p,
                });
            }
            Some(p) => p,
            None => derive_output_path(&input_path),
        };

        Ok(Self {
            input_path,
            output_path,
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Verify the input is an existing, readable regular file.
    pub fn check_input(&self) -> Result<(), Md2PdfError> {
        let path = &self.input_path;
        if !path.is_file() {
            return Err(Md2PdfError::InputNotFound { path: path.clone() });
        }

        // Check read permission by attempting to open
        match std::fs::File::open(path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(Md2PdfError::PermissionDenied { path: path.clone() });
            }
            Err(_) => {
                return Err(Md2PdfError::InputNotFound { path: path.clone() });
            }
        }

        debug!("Resolved input Markdown: {}", path.display());
        Ok(())
    }
}

/// `/tmp/doc.md` → `/tmp/doc.pdf`; an input without extension gains `.pdf`.
pub fn derive_output_path(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

/// Make a CLI-supplied path absolute against the current directory.
///
/// The path is not required to exist and is not canonicalised.
pub fn absolutize(path: &Path) -> Result<PathBuf, Md2PdfError> {
    std::path::absolute(path)
        .map_err(|e| Md2PdfError::Internal(format!("cannot resolve '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn derives_pdf_beside_input() {
        let req = ConversionRequest::new("/tmp/doc.md", None).unwrap();
        assert_eq!(req.output_path(), Path::new("/tmp/doc.pdf"));
    }

    #[cfg(unix)]
    #[test]
    fn derives_pdf_for_extensionless_input() {
        assert_eq!(
            derive_output_path(Path::new("/notes/README")),
            PathBuf::from("/notes/README.pdf")
        );
    }

    #[cfg(unix)]
    #[test]
    fn keeps_explicit_output() {
        let req =
            ConversionRequest::new("/tmp/doc.md", Some(PathBuf::from("/out/report.pdf"))).unwrap();
        assert_eq!(req.output_path(), Path::new("/out/report.pdf"));
    }

    #[test]
    fn rejects_relative_input() {
        let err = ConversionRequest::new("doc.md", None).unwrap_err();
        assert!(matches!(
            err,
            Md2PdfError::NotAbsolute {
                field: "inputPath",
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_relative_output() {
        let err = ConversionRequest::new("/tmp/doc.md", Some(PathBuf::from("out.pdf"))).unwrap_err();
        assert!(matches!(
            err,
            Md2PdfError::NotAbsolute {
                field: "outputPath",
                ..
            }
        ));
    }

    #[test]
    fn check_input_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let req = ConversionRequest::new(dir.path().join("absent.md"), None).unwrap();
        assert!(matches!(
            req.check_input(),
            Err(Md2PdfError::InputNotFound { .. })
        ));
    }

    #[test]
    fn check_input_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let req = ConversionRequest::new(dir.path().to_path_buf(), None).unwrap();
        assert!(req.check_input().is_err());
    }

    #[test]
    fn check_input_accepts_file() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("doc.md");
        std::fs::write(&md, "# Title\n").unwrap();
        let req = ConversionRequest::new(&md, None).unwrap();
        assert!(req.check_input().is_ok());
        assert_eq!(req.output_path(), dir.path().join("doc.pdf"));
    }

    #[test]
    fn absolutize_relative_path() {
        let p = absolutize(Path::new("some/doc.md")).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("some/doc.md"));
    }
}
