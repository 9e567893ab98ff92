//! Capture job bookkeeping

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{validate_transition, CaptureState};
use crate::error::{HostError, VariantError};
use crate::host::NodeHandle;
use crate::model::VariantSelection;
use crate::overrides::OverrideRecord;

/// Identifier handed out for every started preview job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a single queue item produced no thumbnail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureFailure {
    #[error("no frame within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl CaptureFailure {
    /// Lift into the crate error for reporting
    pub fn into_error(self, selection: &VariantSelection) -> VariantError {
        match self {
            CaptureFailure::Timeout { timeout_ms } => VariantError::RenderTimeout {
                selection: selection.to_string(),
                timeout_ms,
            },
            CaptureFailure::Host(e) => VariantError::HostMutation(e),
        }
    }

    /// Preview node operations report crate errors; keep the host cause
    pub(crate) fn from_variant_error(error: VariantError) -> Self {
        match error {
            VariantError::HostMutation(e) => CaptureFailure::Host(e),
            other => CaptureFailure::Host(HostError::Rejected(other.to_string())),
        }
    }
}

/// Result of one queue item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Not reached (yet)
    Pending,
    Captured,
    Failed(CaptureFailure),
}

/// Snapshot of a job for the panel
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub id: JobId,
    pub node: String,
    pub state: CaptureState,
    /// Jobs ahead of this one; 0 for the active job
    pub queue_position: Option<usize>,
    pub cancelled: bool,
    pub finished: bool,
    pub items: Vec<(VariantSelection, ItemOutcome)>,
    /// Preview node the host refused to delete during cleanup
    pub leaked_preview: Option<NodeHandle>,
    pub created_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items that are no longer pending
    pub fn completed(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| *outcome != ItemOutcome::Pending)
            .count()
    }

    pub fn captured(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| *outcome == ItemOutcome::Captured)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ItemOutcome::Failed(_)))
            .count()
    }
}

/// One sequential pass over a node's variants
#[derive(Debug)]
pub struct CaptureJob {
    pub(crate) id: JobId,
    pub(crate) target: String,
    pub(crate) queue: Vec<VariantSelection>,
    pub(crate) outcomes: Vec<ItemOutcome>,
    pub(crate) index: usize,
    pub(crate) state: CaptureState,
    /// The single preview node, reused for every item
    pub(crate) preview: Option<OverrideRecord>,
    /// Selections authored on the target when the job was armed
    pub(crate) snapshot: Vec<VariantSelection>,
    pub(crate) timeout: Duration,
    pub(crate) cancelled: bool,
    pub(crate) wait_started: Option<Instant>,
    pub(crate) next_frame_check: Option<Instant>,
    pub(crate) leaked_preview: Option<NodeHandle>,
    pub(crate) created_at: DateTime<Utc>,
}

impl CaptureJob {
    pub fn new(target: impl Into<String>, queue: Vec<VariantSelection>, timeout: Duration) -> Self {
        let outcomes = vec![ItemOutcome::Pending; queue.len()];
        Self {
            id: JobId::new(),
            target: target.into(),
            queue,
            outcomes,
            index: 0,
            state: CaptureState::Idle,
            preview: None,
            snapshot: Vec::new(),
            timeout,
            cancelled: false,
            wait_started: None,
            next_frame_check: None,
            leaked_preview: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Armed or further along
    pub fn is_started(&self) -> bool {
        self.state != CaptureState::Idle
    }

    pub fn current(&self) -> Option<&VariantSelection> {
        self.queue.get(self.index)
    }

    /// Move to `to`, falling back to cleanup on a transition the table forbids
    pub(crate) fn transition(&mut self, to: CaptureState) {
        match validate_transition(self.state, to) {
            Ok(()) => {
                debug!("Job {}: {:?} -> {:?}", self.id, self.state, to);
                self.state = to;
            }
            Err(e) => {
                error!("Job {}: {}, cleaning up", self.id, e);
                self.state = CaptureState::Cleanup;
            }
        }
    }

    pub(crate) fn record(&mut self, outcome: ItemOutcome) {
        if let Some(slot) = self.outcomes.get_mut(self.index) {
            *slot = outcome;
        }
    }

    pub fn status(&self, queue_position: Option<usize>) -> JobStatus {
        JobStatus {
            id: self.id,
            node: self.target.clone(),
            state: self.state,
            queue_position,
            cancelled: self.cancelled,
            finished: self.state == CaptureState::Idle && queue_position.is_none(),
            items: self
                .queue
                .iter()
                .cloned()
                .zip(self.outcomes.iter().cloned())
                .collect(),
            leaked_preview: self.leaked_preview,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> CaptureJob {
        CaptureJob::new(
            "/table",
            vec![
                VariantSelection::new("/table", "materials", "wood"),
                VariantSelection::new("/table", "materials", "metal"),
            ],
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_illegal_transition_falls_back_to_cleanup() {
        let mut job = job();
        job.transition(CaptureState::Capturing);
        assert_eq!(job.state(), CaptureState::Cleanup);
    }

    #[test]
    fn test_status_counts() {
        let mut job = job();
        job.record(ItemOutcome::Captured);
        job.index = 1;
        job.record(ItemOutcome::Failed(CaptureFailure::Timeout { timeout_ms: 1000 }));

        let status = job.status(Some(0));
        assert_eq!(status.total(), 2);
        assert_eq!(status.completed(), 2);
        assert_eq!(status.captured(), 1);
        assert_eq!(status.failed(), 1);
        assert!(!status.finished);
    }

    #[test]
    fn test_timeout_maps_to_render_timeout() {
        let selection = VariantSelection::new("/table", "materials", "glass");
        let err = CaptureFailure::Timeout { timeout_ms: 5 }.into_error(&selection);
        assert!(matches!(err, VariantError::RenderTimeout { timeout_ms: 5, .. }));
        assert_eq!(err.to_string(), "render timed out after 5ms for /table|materials|glass");
    }
}
