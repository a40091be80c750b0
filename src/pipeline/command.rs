//! Bounded external-process execution.
//!
//! Office and HTML conversion shell out to LibreOffice and headless
//! Chrome. Every invocation goes through [`run`], which enforces a
//! wall-clock timeout, kills the child when it expires, and keeps
//! "binary not installed" ([`DocPipeError::ToolMissing`]) distinct from
//! "binary ran and failed" ([`DocPipeError::ToolFailed`]).

use crate::error::DocPipeError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Locate the first of `candidates` that resolves to an executable file on
/// `PATH`.
pub fn which_first(candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|c| which(c))
}

/// Resolve a program name against `PATH`. Names containing a path
/// separator are checked as given.
pub fn which(program: &str) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
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
    path.is_file() || path.with_extension("exe").is_file()
}

/// Run `program` with `args`, waiting at most `timeout`.
///
/// A non-zero exit becomes [`DocPipeError::ToolFailed`] carrying both
/// streams. On timeout the child is killed and
/// [`DocPipeError::ToolTimeout`] is returned.
pub async fn run<I, S>(program: &Path, args: I, timeout: Duration) -> Result<CommandOutput, DocPipeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DocPipeError::ToolMissing {
            candidates: vec![name.clone()],
            hint: format!("'{name}' could not be executed"),
        },
        _ => DocPipeError::Internal(format!("spawn {name}: {e}")),
    })?;

    // Dropping the `wait_with_output` future on timeout drops the child,
    // and `kill_on_drop` terminates it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| DocPipeError::Internal(format!("wait {name}: {e}")))?,
        Err(_) => {
            warn!("{} exceeded {}s, killed", name, timeout.as_secs());
            return Err(DocPipeError::ToolTimeout {
                program: name,
                secs: timeout.as_secs(),
            });
        }
    };

    let out = CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !output.status.success() {
        return Err(DocPipeError::ToolFailed {
            program: name,
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
        });
    }

    Ok(out)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> PathBuf {
        which("sh").expect("sh on PATH")
    }

    #[test]
    fn which_finds_sh_and_misses_nonsense() {
        assert!(which("sh").is_some());
        assert!(which("definitely-not-a-real-binary-4711").is_none());
        assert_eq!(
            which_first(&["definitely-not-a-real-binary-4711", "sh"]),
            which("sh")
        );
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run(&sh(), ["-c", "printf hello"], Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_tool_failed() {
        let err = run(&sh(), ["-c", "echo oops >&2; exit 3"], Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            DocPipeError::ToolFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("oops"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = run(&sh(), ["-c", "sleep 5"], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, DocPipeError::ToolTimeout { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_tool_missing() {
        let err = run(
            Path::new("/no/such/tool-4711"),
            Vec::<&str>::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocPipeError::ToolMissing { .. }));
    }
}
