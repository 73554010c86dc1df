//! The hidden scratch directory that holds per-run artifacts.
//!
//! Lives beside the input document, is created lazily, and is never cleaned
//! up. Artifact names derive only from the block ordinal and the input stem,
//! so two requests against different documents never collide, while two
//! concurrent requests against the *same* document share (and race on) the
//! same names.

use crate::error::Md2PdfError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of the per-block diagram source file.
pub const DIAGRAM_SOURCE_EXT: &str = "mmd";
/// Extension of the per-block rendered image.
pub const DIAGRAM_IMAGE_EXT: &str = "svg";
/// Marker inserted between the input stem and `.md` for the intermediate document.
pub const INTERMEDIATE_MARKER: &str = "rendered";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// `<dir of input>/<name>`; nothing is created yet.
    pub fn for_input(input: &Path, name: &str) -> Self {
        let parent = input.parent().unwrap_or_else(|| Path::new("/"));
        Self {
            root: parent.join(name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory (and parents) if absent.
    pub async fn ensure(&self) -> Result<(), Md2PdfError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Md2PdfError::WorkDirFailed {
                path: self.root.clone(),
                source: e,
            })?;
        debug!("Working directory ready: {}", self.root.display());
        Ok(())
    }

    pub fn diagram_source(&self, ordinal: usize) -> PathBuf {
        self.root
            .join(format!("diagram_{ordinal}.{DIAGRAM_SOURCE_EXT}"))
    }

    pub fn diagram_image(&self, ordinal: usize) -> PathBuf {
        self.root
            .join(format!("diagram_{ordinal}.{DIAGRAM_IMAGE_EXT}"))
    }

    /// `<stem>.rendered.md` for the given input document.
    pub fn intermediate_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.root.join(format!("{stem}.{INTERMEDIATE_MARKER}.md"))
    }

    /// `path` relative to this directory, `/`-separated for use in Markdown.
    pub fn relative_reference(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn lives_beside_input() {
        let wd = WorkDir::for_input(Path::new("/docs/guide.md"), ".out");
        assert_eq!(wd.root(), Path::new("/docs/.out"));
        assert_eq!(
            wd.diagram_source(1),
            PathBuf::from("/docs/.out/diagram_1.mmd")
        );
        assert_eq!(
            wd.diagram_image(12),
            PathBuf::from("/docs/.out/diagram_12.svg")
        );
    }

    #[cfg(unix)]
    #[test]
    fn intermediate_uses_input_stem() {
        let wd = WorkDir::for_input(Path::new("/docs/guide.md"), ".out");
        assert_eq!(
            wd.intermediate_for(Path::new("/docs/guide.md")),
            PathBuf::from("/docs/.out/guide.rendered.md")
        );
        assert_eq!(
            wd.intermediate_for(Path::new("/docs/notes.markdown")),
            PathBuf::from("/docs/.out/notes.rendered.md")
        );
    }

    #[test]
    fn reference_is_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let wd = WorkDir::for_input(&dir.path().join("doc.md"), ".out");
        assert_eq!(wd.relative_reference(&wd.diagram_image(3)), "diagram_3.svg");
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let wd = WorkDir::for_input(&dir.path().join("doc.md"), ".out");
        wd.ensure().await.unwrap();
        wd.ensure().await.unwrap();
        assert!(wd.root().is_dir());
    }
}
