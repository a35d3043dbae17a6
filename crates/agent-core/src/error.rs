//! Domain error types (§7). Programmer/configuration errors are fatal and
//! surface as panics at the validated boundary, not as `Result`s — see
//! `dispatch`'s precondition checks in `agent-dispatch`.

use thiserror::Error;

/// Failure reasons for the scoped-subprocess runner (C1, §4.1).
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("path is not absolute: {0}")]
    PathNotAbsolute(String),
    #[error("path is not executable: {0}")]
    NotExecutable(String),
    #[error("spawn failed: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("io error while reading child output: {0}")]
    Io(#[source] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}
