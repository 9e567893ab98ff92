//! Capture job states and the transitions allowed between them

use serde::{Deserialize, Serialize};

/// Lifecycle of one capture job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureState {
    /// Queued, or finished
    Idle,
    /// Snapshot taken, viewport pointed at the target
    Armed,
    /// Authoring the current item through the preview node
    Switching,
    /// Suspended until the renderer reports a frame or the item times out
    WaitingForFrame,
    Capturing,
    /// Moving to the next item
    Advancing,
    /// Re-applying the pre-job selections
    Restoring,
    /// Deleting the preview node
    Cleanup,
    Cancelled,
}

impl CaptureState {
    /// States a job can be cancelled from
    pub fn is_in_flight(self) -> bool {
        !matches!(
            self,
            CaptureState::Idle | CaptureState::Cleanup | CaptureState::Cancelled
        )
    }

    pub fn can_transition_to(self, to: CaptureState) -> bool {
        allowed_transitions(self).contains(&to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal capture transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: CaptureState,
    pub to: CaptureState,
}

pub fn allowed_transitions(from: CaptureState) -> &'static [CaptureState] {
    use CaptureState::*;
    match from {
        Idle => &[Armed],
        // An empty queue goes straight to restoring
        Armed => &[Switching, Restoring, Cancelled],
        // Advancing directly when the host rejects the switch
        Switching => &[WaitingForFrame, Advancing, Cancelled],
        // Advancing directly on timeout
        WaitingForFrame => &[Capturing, Advancing, Cancelled],
        Capturing => &[Advancing, Cancelled],
        Advancing => &[Switching, Restoring, Cancelled],
        Restoring => &[Cleanup, Cancelled],
        Cancelled => &[Cleanup],
        Cleanup => &[Idle],
    }
}

pub fn validate_transition(from: CaptureState, to: CaptureState) -> Result<(), IllegalTransition> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CaptureState::*;

    const ALL: [CaptureState; 9] = [
        Idle,
        Armed,
        Switching,
        WaitingForFrame,
        Capturing,
        Advancing,
        Restoring,
        Cleanup,
        Cancelled,
    ];

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [
            Idle,
            Armed,
            Switching,
            WaitingForFrame,
            Capturing,
            Advancing,
            Switching,
            WaitingForFrame,
            Capturing,
            Advancing,
            Restoring,
            Cleanup,
            Idle,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{:?}", pair);
        }
    }

    #[test]
    fn test_every_in_flight_state_can_cancel() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Cancelled), state.is_in_flight(), "{:?}", state);
        }
    }

    #[test]
    fn test_cleanup_is_only_left_for_idle() {
        assert_eq!(allowed_transitions(Cleanup), &[Idle]);
        assert_eq!(
            validate_transition(Capturing, Switching),
            Err(IllegalTransition { from: Capturing, to: Switching })
        );
        // Every state reaches Cleanup within two steps once cancelled
        for state in ALL.into_iter().filter(|s| s.is_in_flight()) {
            assert!(state.can_transition_to(Cancelled));
        }
        assert!(Cancelled.can_transition_to(Cleanup));
    }
}
