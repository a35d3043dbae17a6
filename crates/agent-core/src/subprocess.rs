//! C1 — scoped-subprocess runner (§4.1).
//!
//! `run` forks/execs a helper program, optionally under a wall-clock
//! deadline, and always reaps the child's whole process group before
//! returning so no zombies are left behind.

use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::SubprocessError;

/// How long to wait for the child, per §4.1.
#[derive(Debug, Clone, Copy)]
pub enum Deadline {
    /// Capture stdout, waiting up to this long (`max_wait_s >= 0`).
    Wait(Duration),
    /// Fire-and-forget: double-forked equivalent, no stdout captured,
    /// returns immediately (`max_wait_s == -1`).
    Detach,
}

fn validate_path(path: &Path) -> Result<(), SubprocessError> {
    if !path.is_absolute() {
        return Err(SubprocessError::PathNotAbsolute(path.display().to_string()));
    }
    let meta = std::fs::metadata(path).map_err(SubprocessError::Io)?;
    let executable = meta.permissions().mode() & 0o111 != 0;
    if !executable {
        return Err(SubprocessError::NotExecutable(path.display().to_string()));
    }
    Ok(())
}

/// Kill the child's entire process group. Best-effort: ESRCH (already gone)
/// is not an error worth reporting.
fn kill_group(pid: u32) {
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// Run `path argv...`, logging and returning `None` on any failure — this
/// function never panics and never blocks past the requested deadline.
pub async fn run(tag: &str, path: &str, argv: &[String], deadline: Deadline) -> Option<Vec<u8>> {
    let path_ref = Path::new(path);
    if let Err(err) = validate_path(path_ref) {
        eprintln!("error: run_script[{tag}]: {err}");
        return None;
    }

    let mut cmd = Command::new(path);
    cmd.args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    // New session + process group so the whole subtree can be killed at once.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    match deadline {
        Deadline::Detach => {
            cmd.stdout(Stdio::null());
            match cmd.spawn() {
                Ok(mut child) => {
                    tokio::spawn(async move {
                        let _ = child.wait().await;
                    });
                    None
                }
                Err(err) => {
                    eprintln!("error: run_script[{tag}]: spawn failed: {err}");
                    None
                }
            }
        }
        Deadline::Wait(max_wait) => {
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(err) => {
                    let err = SubprocessError::Spawn(err);
                    eprintln!("error: run_script[{tag}]: {err}");
                    return None;
                }
            };
            let pid = match child.id() {
                Some(pid) => pid,
                None => {
                    eprintln!("error: run_script[{tag}]: child already reaped");
                    return None;
                }
            };

            let mut stdout = child
                .stdout
                .take()
                .expect("stdout was requested as piped");
            let read_fut = async {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            };

            // §4.1: the child's process group is always killed and reaped
            // before returning, on every path — success, read error, and
            // timeout alike — not just on failure.
            match tokio::time::timeout(max_wait, read_fut).await {
                Ok(Ok(buf)) => {
                    kill_group(pid);
                    let _ = child.wait().await;
                    Some(buf)
                }
                Ok(Err(err)) => {
                    let err = SubprocessError::Io(err);
                    eprintln!("error: run_script[{tag}]: {err}");
                    kill_group(pid);
                    let _ = child.wait().await;
                    None
                }
                Err(_elapsed) => {
                    let err = SubprocessError::Timeout(max_wait);
                    eprintln!("error: run_script[{tag}]: {err}");
                    kill_group(pid);
                    let _ = child.wait().await;
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_stdout() {
        let out = run(
            "probe",
            "/bin/echo",
            &["hello".to_string()],
            Deadline::Wait(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(out.unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn relative_path_is_rejected() {
        let out = run(
            "probe",
            "echo",
            &["hello".to_string()],
            Deadline::Wait(Duration::from_secs(5)),
        )
        .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn timeout_kills_and_reaps_child() {
        let start = std::time::Instant::now();
        let out = run(
            "probe",
            "/bin/sleep",
            &["60".to_string()],
            Deadline::Wait(Duration::from_secs(2)),
        )
        .await;
        assert!(out.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
