//! Locate the configured external programs before a conversion needs them.
//!
//! Nothing here is required for a conversion to run; the pipeline simply
//! spawns each program and reports [`crate::error::CommandError::NotFound`]
//! if it is missing. This is the up-front check behind `md2pdf --check-tools`.

use crate::config::{CommandSpec, ConversionConfig};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The part a program plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRole {
    DiagramRenderer,
    PdfRenderer,
    FallbackConverter,
}

impl ToolRole {
    pub fn label(self) -> &'static str {
        match self {
            ToolRole::DiagramRenderer => "diagram renderer",
            ToolRole::PdfRenderer => "PDF renderer",
            ToolRole::FallbackConverter => "fallback converter",
        }
    }
}

/// Lookup result for one configured program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub role: ToolRole,
    pub program: String,
    /// Absolute path of the executable, or `None` if it was not found.
    pub resolved: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Resolve the three configured programs against `PATH`.
pub fn check_tools(config: &ConversionConfig) -> Vec<ToolStatus> {
    let path = std::env::var_os("PATH");
    [
        (ToolRole::DiagramRenderer, &config.diagram_renderer),
        (ToolRole::PdfRenderer, &config.pdf_renderer),
        (ToolRole::FallbackConverter, &config.fallback_converter),
    ]
    .into_iter()
    .map(|(role, spec)| status_for(role, spec, path.as_ref()))
    .collect()
}

fn status_for(role: ToolRole, spec: &CommandSpec, path: Option<&OsString>) -> ToolStatus {
    let resolved = find_program(&spec.program, path);
    debug!(
        "{} '{}' → {}",
        role.label(),
        spec.program,
        resolved
            .as_deref()
            .map_or_else(|| "not found".to_string(), |p| p.display().to_string())
    );
    ToolStatus {
        role,
        program: spec.program.clone(),
        resolved,
    }
}

/// Find `program` the way a process spawn would.
///
/// A program containing a path separator is checked as given; a bare name
/// is searched in each `PATH` entry.
pub fn find_program(program: &str, path: Option<&OsString>) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 || direct.is_absolute() {
        return candidates(direct).into_iter().find(|p| is_executable(p));
    }

    let path = path?;
    std::env::split_paths(path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir.join(program)))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn candidates(base: &Path) -> Vec<PathBuf> {
    if base.extension().is_some() {
        return vec![base.to_path_buf()];
    }
    ["exe", "cmd", "bat", "com"]
        .iter()
        .map(|ext| base.with_extension(ext))
        .collect()
}

#[cfg(not(windows))]
fn candidates(base: &Path) -> Vec<PathBuf> {
    vec![base.to_path_buf()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
