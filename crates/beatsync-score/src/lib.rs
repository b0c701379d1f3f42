// Beat score data model: BPM curve, baked per-tick timing table, loop metadata

pub mod bake;
pub mod bpm;
pub mod score;

pub use bake::{DEFAULT_BAKE_INTERVAL, MIN_BAKE_INTERVAL};
pub use bpm::{BpmBreakpoint, DEFAULT_BPM, bpm_at};
pub use score::{BeatScore, ScoreBuilder};
