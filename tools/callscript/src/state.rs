use crate::errors::MockError;
use serde::Serialize;
use std::fmt;

/// Phase of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MockState {
    Idle,
    RecordingBegun,
    RecordingCalled,
    RecordingSealed,
    RecordingSealedAwaitingReturn,
    ReplayAwaitingOutput,
    ReplayAwaitingReturn,
}

impl MockState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RecordingBegun => "recording_begun",
            Self::RecordingCalled => "recording_called",
            Self::RecordingSealed => "recording_sealed",
            Self::RecordingSealedAwaitingReturn => "recording_sealed_awaiting_return",
            Self::ReplayAwaitingOutput => "replay_awaiting_output",
            Self::ReplayAwaitingReturn => "replay_awaiting_return",
        }
    }

    /// True while an expectation is open between `begin_expect` and `end_expect`.
    pub fn is_recording_open(self) -> bool {
        matches!(self, Self::RecordingBegun | Self::RecordingCalled)
    }

    /// True after `end_expect` while effects may still be attached.
    pub fn is_sealed(self) -> bool {
        matches!(
            self,
            Self::RecordingSealed | Self::RecordingSealedAwaitingReturn
        )
    }

    pub fn is_replaying(self) -> bool {
        matches!(self, Self::ReplayAwaitingOutput | Self::ReplayAwaitingReturn)
    }
}

impl fmt::Display for MockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edges of the session state machine. `reset` bypasses this table.
pub fn validate_transition(from: MockState, to: MockState) -> Result<(), MockError> {
    use MockState as S;

    let allowed = match from {
        S::Idle => matches!(
            to,
            S::RecordingBegun | S::ReplayAwaitingOutput | S::ReplayAwaitingReturn | S::Idle
        ),
        S::RecordingBegun => matches!(to, S::RecordingCalled),
        S::RecordingCalled => matches!(to, S::RecordingSealed | S::RecordingSealedAwaitingReturn),
        S::RecordingSealed => matches!(to, S::Idle),
        S::RecordingSealedAwaitingReturn => matches!(to, S::Idle),
        S::ReplayAwaitingOutput => matches!(to, S::ReplayAwaitingReturn | S::Idle),
        S::ReplayAwaitingReturn => matches!(to, S::Idle),
    };

    if !allowed {
        return Err(MockError::Internal(format!(
            "illegal transition: {} -> {}",
            from, to
        )));
    }
    Ok(())
}
