use std::io;
use std::path::Path;

use thiserror::Error;

/// Per-unit failure. A unit that fails with either kind stays in its inbox
/// untouched and is picked up again by the next run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("transient i/o failure: {0}")]
    TransientIo(String),
}

impl StageError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::TransientIo(_) => "transient_io",
        }
    }

    pub fn io(action: &str, path: &Path, err: io::Error) -> Self {
        Self::TransientIo(format!("{action} [{}]: {err}", path.display()))
    }
}
