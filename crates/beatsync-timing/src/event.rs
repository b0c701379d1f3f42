use std::sync::Arc;

use beatsync_score::BeatScore;

use crate::tick_info::TickInfo;

/// Notification produced by [`crate::TimingSolver::advance`] and the
/// playback controller. Listeners run synchronously on the update thread.
#[derive(Debug, Clone, PartialEq)]
pub enum BeatEvent {
    /// A new score was handed to the solver; playback begins at `start_time`.
    ScoreArmed {
        score: Arc<BeatScore>,
        start_time: f64,
    },
    BeatCrossed(TickInfo),
    /// The loop section restarted; fires before the first beat of the new pass.
    Looped,
    /// The last tick of the score was crossed.
    EndOfScore,
}
