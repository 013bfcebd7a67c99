use std::path::PathBuf;

use thiserror::Error;

use crate::reconcile::Discrepancy;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("failed to decode execution record #{index}: {message}")]
    Decode { index: usize, message: String },

    #[error("no baseline found at {path}; run with --update to record one")]
    NoBaseline { path: PathBuf },

    #[error("corrupt baseline {path} (line {line}): {message}")]
    CorruptState {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("corrupt summary {path} (line {line}): {message}")]
    CorruptSummary {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("{}", render_mismatch(.discrepancies))]
    Mismatch { discrepancies: Vec<Discrepancy> },
}

fn render_mismatch(discrepancies: &[Discrepancy]) -> String {
    let mut message = String::from("Detected difference between the old and new state:");
    for discrepancy in discrepancies {
        message.push('\n');
        message.push_str(&discrepancy.to_string());
    }
    message
}

impl StateError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decode(index: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            index,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn corrupt_state(path: impl Into<PathBuf>, line: u64, message: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn corrupt_summary(
        path: impl Into<PathBuf>,
        line: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::CorruptSummary {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}
