// Clock → tick solver: BPM-aware tick cursor, loop rebasing, pause accounting

pub mod event;
pub mod solver;
pub mod tick_info;

pub use event::BeatEvent;
pub use solver::{NearestTick, SolverPhase, TimingCursor, TimingSolver};
pub use tick_info::TickInfo;
