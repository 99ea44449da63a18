//! Synthesis errors
//!
//! Uses thiserror for type-safe error matching rather than opaque anyhow errors.
//! Distinguishes process failures from artifact failures with the offending path
//! preserved. A synthesis command exiting non-zero is not represented here: policy
//! violations fail the command while still producing usable artifacts.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("No cdk.json found at or above {start}")]
    ProjectRootNotFound { start: PathBuf },

    #[error("Failed to start `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Synthesis timeout after {timeout_secs}s in {project_root}")]
    Timeout {
        project_root: PathBuf,
        timeout_secs: u64,
    },

    #[error("Operation {operation_id} was cancelled")]
    Cancelled { operation_id: uuid::Uuid },

    #[error("Failed to read {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ArtifactParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid synthesis configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Synthesis worker is not running")]
    WorkerStopped,
}

pub type SynthResult<T> = std::result::Result<T, SynthError>;
