//! External-program invocation.
//!
//! Every renderer and converter goes through [`run`]: an explicit argument
//! vector (no shell), stdin closed, stdout/stderr captured for diagnostics,
//! and an optional timeout. Children are spawned with `kill_on_drop` so a
//! timed-out or abandoned invocation never outlives its future.

use crate::error::CommandError;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Longest diagnostic tail kept from a failing program's output.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` and wait for it to exit.
///
/// A non-zero exit status is an error; the tail of stderr (or stdout when
/// stderr is empty) is kept in [`CommandError::ExitStatus`].
pub async fn run(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout_secs: Option<u64>,
) -> Result<CommandOutput, CommandError> {
    debug!(program, ?args, "Spawning external program");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|e| spawn_error(program, e))?;

    let waited = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
            .await
            .map_err(|_| CommandError::TimedOut {
                program: program.to_string(),
                secs,
            })?,
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|e| CommandError::SpawnFailed {
        program: program.to_string(),
        detail: e.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::ExitStatus {
            program: program.to_string(),
            code: output.status.code(),
            stderr: diagnostic_tail(&stderr, &stdout),
        });
    }

    debug!(program, "External program finished");
    Ok(CommandOutput { stdout, stderr })
}

/// Succeeds only if `path` is an existing regular file.
pub async fn expect_file(program: &str, path: &Path) -> Result<(), CommandError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(CommandError::MissingOutput {
            program: program.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

/// Delete a stale artifact from a previous run so a missing output is
/// detected rather than masked. A file that is not there is fine.
pub async fn remove_stale(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> CommandError {
    if e.kind() == ErrorKind::NotFound {
        CommandError::NotFound {
            program: program.to_string(),
        }
    } else {
        CommandError::SpawnFailed {
            program: program.to_string(),
            detail: e.to_string(),
        }
    }
}

fn diagnostic_tail(stderr: &str, stdout: &str) -> String {
    let text = match stderr.trim() {
        "" => stdout.trim(),
        s => s,
    };
    let count = text.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect();
    format!("\u{2026}{tail}")
}
