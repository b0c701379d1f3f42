use serde::{Deserialize, Serialize};

/// Tempo used when a score has no breakpoints at all.
pub const DEFAULT_BPM: f64 = 60.0;

/// A (time, BPM) anchor of the tempo curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmBreakpoint {
    /// Seconds from the start of the score.
    pub time: f64,
    pub bpm: f64,
}

impl BpmBreakpoint {
    pub fn new(time: f64, bpm: f64) -> Self {
        Self { time, bpm }
    }
}

/// Tempo at `time` on a curve sorted ascending by time.
///
/// Linear between the two bracketing breakpoints, clamped to the first BPM
/// before the curve and to the last BPM after it. At a breakpoint's exact
/// time that breakpoint starts the interval, so its BPM is returned as is.
pub fn bpm_at(breakpoints: &[BpmBreakpoint], time: f64) -> f64 {
    match breakpoints {
        [] => DEFAULT_BPM,
        [only] => only.bpm,
        [first, ..] if time <= first.time => first.bpm,
        _ => {
            for pair in breakpoints.windows(2) {
                let (begin, end) = (pair[0], pair[1]);
                if end.time <= time {
                    continue;
                }
                let t = (time - begin.time) / (end.time - begin.time);
                return begin.bpm + (end.bpm - begin.bpm) * t;
            }
            breakpoints[breakpoints.len() - 1].bpm
        }
    }
}
