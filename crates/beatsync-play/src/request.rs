use std::sync::Arc;

use beatsync_score::BeatScore;
use beatsync_types::ClipHandle;

/// Parameters of one [`crate::PlaybackController::start`] call.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub score: Arc<BeatScore>,
    /// Scheduling-clock start time; `None` starts after the default offset.
    pub start_time: Option<f64>,
    /// Crossfade duration; `None` uses the configured default.
    pub fade_duration: Option<f64>,
    /// Restart even when `score` is already the active one.
    pub force_restart: bool,
    /// Extra clips loaded with the channel and released with it.
    pub load_with: Vec<ClipHandle>,
    /// Extra clips released when this track's channel is unloaded.
    pub unload_with: Vec<ClipHandle>,
}

impl StartRequest {
    pub fn new(score: Arc<BeatScore>) -> Self {
        Self {
            score,
            start_time: None,
            fade_duration: None,
            force_restart: false,
            load_with: Vec::new(),
            unload_with: Vec::new(),
        }
    }

    pub fn at(mut self, start_time: f64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn fade(mut self, duration: f64) -> Self {
        self.fade_duration = Some(duration);
        self
    }

    pub fn force(mut self) -> Self {
        self.force_restart = true;
        self
    }

    pub fn load_with(mut self, clips: impl IntoIterator<Item = ClipHandle>) -> Self {
        self.load_with.extend(clips);
        self
    }

    pub fn unload_with(mut self, clips: impl IntoIterator<Item = ClipHandle>) -> Self {
        self.unload_with.extend(clips);
        self
    }
}
