// Playback orchestration: start/stop transitions, pause accounting, event fan-out

pub mod config;
pub mod controller;
pub mod request;

pub use config::PlaybackConfig;
pub use controller::{PlaybackController, StartDisposition, TransitionKind, TransitionReport};
pub use request::StartRequest;
