use thiserror::Error;

use crate::clip::ClipHandle;

/// Fatal outcome of a load, schedule, fade, parse or build operation.
#[derive(Debug, Error)]
pub enum BeatError {
    #[error("clip load aborted before every clip reported loaded")]
    LoadAborted,

    #[error("operation cancelled")]
    Cancelled,

    #[error("two chart slots map to tick {tick}")]
    ConflictingTick { tick: u32 },

    #[error("chart grid overflows the tick range at measure {measure}")]
    GridOverflow { measure: usize },

    #[error("{clip} is not loaded")]
    ClipNotLoaded { clip: ClipHandle },

    #[error("invalid score: {0}")]
    InvalidScore(String),

    /// Failure reported by the clip storage or transport collaborator.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl BeatError {
    /// Whether the error came from cooperative cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::LoadAborted | Self::Cancelled)
    }
}

/// Recoverable condition that was reported and worked around.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BeatWarning {
    #[error("start time {requested:.6} already elapsed, rescheduled to {corrected:.6}")]
    ScheduleCorrected { requested: f64, corrected: f64 },

    #[error("unterminated group in measure {measure}, rest of the line ignored")]
    UnterminatedGroup { measure: usize },

    #[error("pause requested while already paused")]
    DoublePause,

    #[error("resume requested while not paused")]
    NotPaused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_transparent() {
        let err: BeatError = anyhow::anyhow!("device lost").into();
        assert_eq!(err.to_string(), "device lost");
        assert!(!err.is_cancellation());
    }

    #[test]
    fn cancellation_kinds() {
        assert!(BeatError::LoadAborted.is_cancellation());
        assert!(BeatError::Cancelled.is_cancellation());
        assert!(!BeatError::ConflictingTick { tick: 3 }.is_cancellation());
        assert!(!BeatError::GridOverflow { measure: 6 }.is_cancellation());
    }

    #[test]
    fn warning_messages() {
        let w = BeatWarning::ScheduleCorrected {
            requested: 1.0,
            corrected: 2.5,
        };
        assert!(w.to_string().contains("2.500000"));
        assert_eq!(
            BeatWarning::UnterminatedGroup { measure: 4 }.to_string(),
            "unterminated group in measure 4, rest of the line ignored"
        );
    }
}
