//! Error types for the variant manager
//!
//! Indexing and switching errors are returned synchronously and never leave
//! partial state behind. Capture errors are contained per queue item and
//! surface as [`CaptureFailure`](crate::capture::CaptureFailure) outcomes
//! instead of aborting the job.

use std::path::PathBuf;

use crate::capture::JobId;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, VariantError>;

/// Main error type exposed to the panel layer
#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    /// Path or selection does not resolve against the current model; rescan
    #[error("not found: {0}")]
    NotFound(String),

    /// Selection not offered by the model (stale UI vs. live graph)
    #[error("invalid selection: {node} has no variant '{variant}' in set '{set}'")]
    InvalidSelection {
        node: String,
        set: String,
        variant: String,
    },

    /// Graph changed concurrently or the host rejected a mutation
    #[error("host mutation failed: {0}")]
    HostMutation(#[from] HostError),

    /// Renderer did not report a frame within the per-item timeout
    #[error("render timed out after {timeout_ms}ms for {selection}")]
    RenderTimeout { selection: String, timeout_ms: u64 },

    /// A capture job is already queued or running for this node
    #[error("a preview job is already running for {node} ({job})")]
    JobAlreadyRunning { node: String, job: JobId },

    /// Job id is not known to the orchestrator
    #[error("unknown preview job {0}")]
    UnknownJob(JobId),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl VariantError {
    /// Whether the caller should rescan before retrying
    pub fn requires_rescan(&self) -> bool {
        matches!(
            self,
            VariantError::NotFound(_)
                | VariantError::InvalidSelection { .. }
                | VariantError::HostMutation(_)
        )
    }
}

/// Failure reported by a [`HostAdapter`](crate::host::HostAdapter)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Handle no longer refers to a live node
    #[error("node handle {0} is no longer valid")]
    StaleHandle(u64),

    /// Path no longer resolves in the live graph
    #[error("{0} no longer exists in the host graph")]
    MissingNode(String),

    /// Host refused the mutation
    #[error("host rejected mutation: {0}")]
    Rejected(String),

    /// Viewport capture failed
    #[error("viewport capture failed: {0}")]
    Capture(String),
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
